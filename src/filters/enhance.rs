//! Point and small-kernel enhancement operators
//!
//! The factor-based operators interpolate between a degenerate image and the
//! input: a factor of 1.0 returns the input, 0.0 returns the degenerate image
//! and values above 1.0 extrapolate.

use super::gaussian::{gaussian_blur, kernel_for_sigma};
use crate::color::{luma, map_pixels};
use image::{Rgb, Rgb32FImage};

#[inline]
fn lerp(degenerate: f32, value: f32, factor: f32) -> f32 {
    degenerate + factor * (value - degenerate)
}

/// Mean luma of the whole image
#[must_use]
pub fn mean_luma(image: &Rgb32FImage) -> f32 {
    let n = image.width() as f64 * image.height() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let sum: f64 = image
        .pixels()
        .map(|p| f64::from(luma(p.0[0], p.0[1], p.0[2])))
        .sum();
    (sum / n) as f32
}

/// Contrast around the mean luma
#[must_use]
pub fn contrast(image: &Rgb32FImage, factor: f32) -> Rgb32FImage {
    let mean = mean_luma(image).round();
    map_pixels(image, |p| {
        [
            lerp(mean, p[0], factor),
            lerp(mean, p[1], factor),
            lerp(mean, p[2], factor),
        ]
    })
}

/// Brightness, degenerate image is black
#[must_use]
pub fn brightness(image: &Rgb32FImage, factor: f32) -> Rgb32FImage {
    map_pixels(image, |p| [p[0] * factor, p[1] * factor, p[2] * factor])
}

/// Colour balance, degenerate image is the grey-scale version
#[must_use]
pub fn color(image: &Rgb32FImage, factor: f32) -> Rgb32FImage {
    map_pixels(image, |p| {
        let g = luma(p[0], p[1], p[2]);
        [lerp(g, p[0], factor), lerp(g, p[1], factor), lerp(g, p[2], factor)]
    })
}

/// Sharpness, degenerate image is a 3x3 smoothed copy with untouched borders
#[must_use]
pub fn sharpness(image: &Rgb32FImage, factor: f32) -> Rgb32FImage {
    let smooth = smooth3x3(image);
    let mut out = image.clone();
    for (dst, (src, sm)) in out.pixels_mut().zip(image.pixels().zip(smooth.pixels())) {
        for c in 0..3 {
            dst.0[c] = lerp(sm.0[c], src.0[c], factor);
        }
    }
    out
}

/// 3x3 smoothing kernel with a centre weight of 5, total weight 13
fn smooth3x3(image: &Rgb32FImage) -> Rgb32FImage {
    let (w, h) = image.dimensions();
    let mut out = image.clone();
    if w < 3 || h < 3 {
        return out;
    }
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let mut acc = [0.0f32; 3];
            for dy in 0..3 {
                for dx in 0..3 {
                    let p = image.get_pixel(x + dx - 1, y + dy - 1).0;
                    let k = if dx == 1 && dy == 1 { 5.0 } else { 1.0 };
                    for c in 0..3 {
                        acc[c] += p[c] * k;
                    }
                }
            }
            out.put_pixel(x, y, Rgb([acc[0] / 13.0, acc[1] / 13.0, acc[2] / 13.0]));
        }
    }
    out
}

/// Unsharp mask: `src + amount * (src - blur)` where the difference reaches `threshold`
#[must_use]
pub fn unsharp_mask(image: &Rgb32FImage, sigma: f32, amount: f32, threshold: f32) -> Rgb32FImage {
    let blurred = gaussian_blur(image, kernel_for_sigma(sigma), sigma);
    let mut out = image.clone();
    for (dst, (src, bl)) in out.pixels_mut().zip(image.pixels().zip(blurred.pixels())) {
        for c in 0..3 {
            let diff = src.0[c] - bl.0[c];
            if diff.abs() >= threshold {
                dst.0[c] = src.0[c] + amount * diff;
            }
        }
    }
    out
}

/// `a * alpha + b * beta + gamma`, per channel
#[must_use]
pub fn add_weighted(a: &Rgb32FImage, alpha: f32, b: &Rgb32FImage, beta: f32, gamma: f32) -> Rgb32FImage {
    let mut out = a.clone();
    for (dst, (pa, pb)) in out.pixels_mut().zip(a.pixels().zip(b.pixels())) {
        for c in 0..3 {
            dst.0[c] = pa.0[c] * alpha + pb.0[c] * beta + gamma;
        }
    }
    out
}
