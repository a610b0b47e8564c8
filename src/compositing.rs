//! Background removal, replacement and blur

use crate::config::BackgroundColor;
use crate::error::{RetouchError, Result};
use crate::filters::gaussian::sigma_for_kernel;
use crate::mask::Mask;
use crate::segmentation::SegmentationCascade;
use crate::types::SegmentationTier;
use crate::utils::{ImageValidator, NumericValidator};
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use tracing::{debug, instrument};

/// Accepted range for the background blur radius in pixels
pub const BLUR_RADIUS_RANGE: (u32, u32) = (1, 50);
pub const DEFAULT_BLUR_RADIUS: u32 = 15;

/// Cut the subject out: RGB untouched, alpha from the segmentation mask
#[instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn remove_background(image: &RgbImage, cascade: &SegmentationCascade) -> Result<(RgbaImage, SegmentationTier)> {
    let result = cascade.segment(image)?;
    Ok((apply_alpha(image, &result.mask)?, result.tier))
}

/// Composite the subject over a flat colour
#[instrument(skip_all, fields(width = image.width(), height = image.height(), color = %color))]
pub fn replace_background(
    image: &RgbImage,
    color: BackgroundColor,
    cascade: &SegmentationCascade,
) -> Result<(RgbImage, SegmentationTier)> {
    let result = cascade.segment(image)?;
    Ok((composite_over(image, &result.mask, color)?, result.tier))
}

/// Attach a mask as the alpha channel
pub fn apply_alpha(image: &RgbImage, mask: &Mask) -> Result<RgbaImage> {
    check_mask(image, mask)?;
    let alpha = mask.to_gray();
    Ok(RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        Rgba([r, g, b, alpha.get_pixel(x, y).0[0]])
    }))
}

/// `subject * m + fill * (1 - m)`, rounded once per channel
pub fn composite_over(image: &RgbImage, mask: &Mask, color: BackgroundColor) -> Result<RgbImage> {
    check_mask(image, mask)?;
    let fill = color.0 .0;
    Ok(RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let m = mask.get(x, y);
        let src = image.get_pixel(x, y).0;
        let mut out = [0u8; 3];
        for c in 0..3 {
            let v = f32::from(src[c]) * m + f32::from(fill[c]) * (1.0 - m);
            out[c] = crate::color::clamp_u8(v);
        }
        Rgb(out)
    }))
}

/// Gaussian blur over the whole frame with a `2r+1` kernel
///
/// No segmentation is involved, so the subject is blurred along with the
/// background.
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn blur_background(image: &RgbImage, radius: u32) -> Result<RgbImage> {
    ImageValidator::validate_rgb(image)?;
    let radius = NumericValidator::validate_range(radius, BLUR_RADIUS_RANGE.0, BLUR_RADIUS_RANGE.1, "blur radius")?;
    let ksize = (2 * radius + 1) as usize;
    let sigma = sigma_for_kernel(ksize);
    debug!(radius, sigma, "blurring whole frame");
    Ok(imageproc::filter::gaussian_blur_f32(image, sigma))
}

fn check_mask(image: &RgbImage, mask: &Mask) -> Result<()> {
    ImageValidator::validate_rgb(image)?;
    if mask.dimensions() != image.dimensions() {
        let (mw, mh) = mask.dimensions();
        return Err(RetouchError::processing_stage(
            "composite",
            format!(
                "mask is {mw}x{mh} but image is {}x{}",
                image.width(),
                image.height()
            ),
        ));
    }
    Ok(())
}
