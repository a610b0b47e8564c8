//! Tone filter presets and global colour adjustment

use crate::blend::mix;
use crate::color::{clamp_float, clamp_triple, hsv_to_rgb, luma, map_pixels, rgb_to_hsv, to_float, to_rgb8};
use crate::config::{ColorAdjustments, FilterKind};
use crate::error::Result;
use crate::filters::enhance;
use crate::utils::{ImageValidator, NumericValidator};
use image::{Rgb32FImage, RgbImage};
use tracing::{debug, instrument};

/// Fully filtered version of `image` for a preset, clipped to the 8-bit range
#[must_use]
pub fn filtered(image: &Rgb32FImage, kind: FilterKind) -> Rgb32FImage {
    match kind {
        FilterKind::Vintage => {
            let faded = enhance::color(image, 0.7);
            map_pixels(&faded, |p| clamp_triple([p[0] * 1.1, p[1] * 1.05, p[2]]))
        },
        FilterKind::BlackWhite => map_pixels(image, |p| {
            let l = luma(p[0], p[1], p[2]);
            [l, l, l]
        }),
        FilterKind::Sepia => map_pixels(image, |[r, g, b]| {
            clamp_triple([
                0.393 * r + 0.769 * g + 0.189 * b,
                0.349 * r + 0.686 * g + 0.168 * b,
                0.272 * r + 0.534 * g + 0.131 * b,
            ])
        }),
        FilterKind::Cool => map_pixels(image, |p| clamp_triple([p[0], p[1], p[2] * 1.2])),
        FilterKind::Warm => map_pixels(image, |p| clamp_triple([p[0] * 1.15, p[1] * 1.05, p[2]])),
    }
}

/// Apply a preset, mixed with the source by `intensity` in `[0, 1]`
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn apply_filter(image: &RgbImage, kind: FilterKind, intensity: f32) -> Result<RgbImage> {
    ImageValidator::validate_rgb(image)?;
    let intensity = NumericValidator::validate_unit(intensity, "filter intensity")?;
    if intensity == 0.0 {
        return Ok(image.clone());
    }
    let source = to_float(image);
    let result = mix(&source, &filtered(&source, kind), intensity);
    Ok(to_rgb8(&result))
}

/// Rotate hue by `degrees`
#[must_use]
pub fn shift_hue(image: &Rgb32FImage, degrees: f32) -> Rgb32FImage {
    map_pixels(image, |p| {
        let [h, s, v] = rgb_to_hsv(clamp_triple(p));
        hsv_to_rgb([(h + degrees).rem_euclid(360.0), s, v])
    })
}

/// `255 * (v / 255)^gamma` per channel
#[must_use]
pub fn apply_gamma(image: &Rgb32FImage, gamma: f32) -> Rgb32FImage {
    map_pixels(image, |p| {
        let [r, g, b] = clamp_triple(p);
        [
            (r / 255.0).powf(gamma) * 255.0,
            (g / 255.0).powf(gamma) * 255.0,
            (b / 255.0).powf(gamma) * 255.0,
        ]
    })
}

/// Brightness, contrast, saturation, hue and gamma in that order; neutral
/// settings are skipped
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn adjust_color(image: &RgbImage, adjustments: &ColorAdjustments) -> Result<RgbImage> {
    ImageValidator::validate_rgb(image)?;
    adjustments.validate()?;
    if adjustments.is_identity() {
        return Ok(image.clone());
    }

    let mut work = to_float(image);
    if adjustments.brightness != 0.0 {
        work = enhance::brightness(&work, 1.0 + adjustments.brightness);
    }
    if adjustments.contrast != 0.0 {
        work = enhance::contrast(&clamp_float(&work), 1.0 + adjustments.contrast);
    }
    if adjustments.saturation != 0.0 {
        work = enhance::color(&clamp_float(&work), 1.0 + adjustments.saturation);
    }
    if adjustments.hue != 0.0 {
        work = shift_hue(&work, adjustments.hue);
    }
    if (adjustments.gamma - 1.0).abs() > f32::EPSILON {
        work = apply_gamma(&work, adjustments.gamma);
    }
    debug!(?adjustments, "colour adjusted");
    Ok(to_rgb8(&work))
}
