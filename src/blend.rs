//! Masked compositing of processed regions back into a frame

use crate::mask::Mask;
use crate::types::Region;
use image::{imageops, Rgb32FImage};

/// Copy out the pixels under `region`
#[must_use]
pub fn extract(image: &Rgb32FImage, region: Region) -> Rgb32FImage {
    imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image()
}

/// Blend a processed patch into `base` at `region`.
///
/// `processed` and `mask` are patch-local and must match the region size;
/// the effective weight is `mask * strength`. Pixels outside the region are
/// never touched.
pub fn blend_into(base: &mut Rgb32FImage, processed: &Rgb32FImage, mask: &Mask, region: Region, strength: f32) {
    let strength = strength.clamp(0.0, 1.0);
    if strength <= 0.0 || region.is_empty() {
        return;
    }
    let (bw, bh) = base.dimensions();
    let w = region.width.min(processed.width()).min(mask.width());
    let h = region.height.min(processed.height()).min(mask.height());
    for y in 0..h {
        let by = region.y + y;
        if by >= bh {
            break;
        }
        for x in 0..w {
            let bx = region.x + x;
            if bx >= bw {
                break;
            }
            let weight = mask.get(x, y) * strength;
            if weight <= 0.0 {
                continue;
            }
            let src = processed.get_pixel(x, y).0;
            let dst = base.get_pixel_mut(bx, by);
            for c in 0..3 {
                dst.0[c] += (src[c] - dst.0[c]) * weight;
            }
        }
    }
}

/// Blend a full-frame result over `base` with a whole-frame mask
#[must_use]
pub fn blend_full(base: &Rgb32FImage, processed: &Rgb32FImage, mask: &Mask, strength: f32) -> Rgb32FImage {
    let mut out = base.clone();
    let (w, h) = base.dimensions();
    blend_into(&mut out, processed, mask, Region::full(w, h), strength);
    out
}

/// Uniform linear mix `a * (1 - alpha) + b * alpha`
#[must_use]
pub fn mix(a: &Rgb32FImage, b: &Rgb32FImage, alpha: f32) -> Rgb32FImage {
    let (w, h) = a.dimensions();
    blend_full(a, b, &Mask::whole(w, h), alpha)
}
