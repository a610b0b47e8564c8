//! Noise and scratch repair

use crate::color::{to_float, to_rgb8};
use crate::config::RepairKind;
use crate::error::Result;
use crate::filters::bilateral::bilateral_filter;
use crate::filters::morphology::{close_rgb, StructuringElement};
use crate::utils::{ImageValidator, NumericValidator};
use image::{Rgb32FImage, RgbImage};
use tracing::{debug, instrument};

pub const DEFAULT_REPAIR_STRENGTH: f32 = 0.5;

/// Edge-preserving denoise whose window and range sigma grow with `strength`
#[must_use]
pub fn denoise(image: &Rgb32FImage, strength: f32) -> Rgb32FImage {
    if strength <= 0.0 {
        return image.clone();
    }
    let diameter = NumericValidator::odd_kernel(5.0 + 4.0 * strength, 5);
    let sigma_color = 10.0 + 90.0 * strength;
    let sigma_space = 3.0 + 7.0 * strength;
    debug!(diameter, sigma_color, sigma_space, "denoising");
    bilateral_filter(image, diameter, sigma_color, sigma_space)
}

/// Colour closing that fills thin dark defects
#[must_use]
pub fn fill_scratches(image: &Rgb32FImage) -> Rgb32FImage {
    to_float(&close_rgb(&to_rgb8(image), StructuringElement::Cross(1)))
}

/// Repair an image with the chosen mode; `strength` in `[0, 1]` drives denoising
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn repair(image: &RgbImage, kind: RepairKind, strength: f32) -> Result<RgbImage> {
    ImageValidator::validate_rgb(image)?;
    let strength = NumericValidator::validate_unit(strength, "repair strength")?;
    let source = to_float(image);
    let repaired = match kind {
        RepairKind::Noise => denoise(&source, strength),
        RepairKind::Scratch => fill_scratches(&source),
        RepairKind::Auto => fill_scratches(&denoise(&source, strength * 0.5)),
    };
    Ok(to_rgb8(&repaired))
}
