//! Colour-space conversions and float buffer helpers
//!
//! Intermediate buffers are [`Rgb32FImage`]s holding channel values on the
//! 0-255 scale. Values may leave that range between stages; they are rounded
//! and clamped exactly once, in [`to_rgb8`].
//!
//! Conventions:
//! - HSV: hue in degrees `[0, 360)`, saturation `[0, 1]`, value `[0, 255]`
//! - LAB: CIE L*a*b* under D65, L* in `[0, 100]`

use image::{GrayImage, Luma, Rgb, Rgb32FImage, RgbImage};

const D65_X: f32 = 0.950_456;
const D65_Z: f32 = 1.088_754;
const LAB_EPSILON: f32 = 216.0 / 24_389.0;
const LAB_KAPPA: f32 = 24_389.0 / 27.0;

/// Rec. 601 luma of an RGB triple
#[inline]
#[must_use]
pub fn luma(r: f32, g: f32, b: f32) -> f32 {
    0.299 * r + 0.587 * g + 0.114 * b
}

/// Widen an 8-bit image to float
#[must_use]
pub fn to_float(image: &RgbImage) -> Rgb32FImage {
    let (w, h) = image.dimensions();
    Rgb32FImage::from_fn(w, h, |x, y| {
        let p = image.get_pixel(x, y).0;
        Rgb([f32::from(p[0]), f32::from(p[1]), f32::from(p[2])])
    })
}

/// Round and clamp a float image back to 8-bit
#[must_use]
pub fn to_rgb8(image: &Rgb32FImage) -> RgbImage {
    let (w, h) = image.dimensions();
    RgbImage::from_fn(w, h, |x, y| {
        let p = image.get_pixel(x, y).0;
        Rgb([clamp_u8(p[0]), clamp_u8(p[1]), clamp_u8(p[2])])
    })
}

#[inline]
#[must_use]
pub fn clamp_u8(v: f32) -> u8 {
    if v.is_nan() {
        0
    } else {
        v.round().clamp(0.0, 255.0) as u8
    }
}

/// Single-channel luminance copy for detection
#[must_use]
pub fn to_gray(image: &RgbImage) -> GrayImage {
    let (w, h) = image.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let p = image.get_pixel(x, y).0;
        Luma([clamp_u8(luma(
            f32::from(p[0]),
            f32::from(p[1]),
            f32::from(p[2]),
        ))])
    })
}

/// Clamp every channel of a float image to the 0-255 range, keeping floats
#[must_use]
pub fn clamp_float(image: &Rgb32FImage) -> Rgb32FImage {
    let mut out = image.clone();
    for p in out.pixels_mut() {
        for c in &mut p.0 {
            *c = c.clamp(0.0, 255.0);
        }
    }
    out
}

/// RGB (0-255) to HSV
#[must_use]
pub fn rgb_to_hsv(rgb: [f32; 3]) -> [f32; 3] {
    let [r, g, b] = rgb;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta <= f32::EPSILON {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let saturation = if max <= f32::EPSILON { 0.0 } else { delta / max };
    [hue.rem_euclid(360.0), saturation, max]
}

/// HSV to RGB (0-255)
#[must_use]
pub fn hsv_to_rgb(hsv: [f32; 3]) -> [f32; 3] {
    let [h, s, v] = hsv;
    if s <= 0.0 {
        return [v, v, v];
    }
    let h = if h.is_nan() { 0.0 } else { h.rem_euclid(360.0) } / 60.0;
    let sector = h.floor();
    let f = h - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match sector as u32 {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}

#[inline]
fn srgb_to_linear(c: f32) -> f32 {
    let c = (c / 255.0).clamp(0.0, 1.0);
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

#[inline]
fn linear_to_srgb(c: f32) -> f32 {
    let c = c.clamp(0.0, 1.0);
    let s = if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    s * 255.0
}

#[inline]
fn lab_f(t: f32) -> f32 {
    if t > LAB_EPSILON {
        t.cbrt()
    } else {
        (LAB_KAPPA * t + 16.0) / 116.0
    }
}

#[inline]
fn lab_f_inv(t: f32) -> f32 {
    let t3 = t * t * t;
    if t3 > LAB_EPSILON {
        t3
    } else {
        (116.0 * t - 16.0) / LAB_KAPPA
    }
}

/// sRGB (0-255) to CIE L*a*b*
#[must_use]
pub fn rgb_to_lab(rgb: [f32; 3]) -> [f32; 3] {
    let r = srgb_to_linear(rgb[0]);
    let g = srgb_to_linear(rgb[1]);
    let b = srgb_to_linear(rgb[2]);

    let x = (0.412_456_4 * r + 0.357_576_1 * g + 0.180_437_5 * b) / D65_X;
    let y = 0.212_672_9 * r + 0.715_152_2 * g + 0.072_175 * b;
    let z = (0.019_333_9 * r + 0.119_192 * g + 0.950_304_1 * b) / D65_Z;

    let fx = lab_f(x);
    let fy = lab_f(y);
    let fz = lab_f(z);
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

/// CIE L*a*b* to sRGB (0-255), clamped into the sRGB gamut
#[must_use]
pub fn lab_to_rgb(lab: [f32; 3]) -> [f32; 3] {
    let fy = (lab[0] + 16.0) / 116.0;
    let fx = fy + lab[1] / 500.0;
    let fz = fy - lab[2] / 200.0;

    let x = lab_f_inv(fx) * D65_X;
    let y = lab_f_inv(fy);
    let z = lab_f_inv(fz) * D65_Z;

    let r = 3.240_454_2 * x - 1.537_138_5 * y - 0.498_531_4 * z;
    let g = -0.969_266 * x + 1.876_010_8 * y + 0.041_556 * z;
    let b = 0.055_643_4 * x - 0.204_025_9 * y + 1.057_225_2 * z;
    [linear_to_srgb(r), linear_to_srgb(g), linear_to_srgb(b)]
}

/// Apply a per-pixel triple mapping to a float image
#[must_use]
pub fn map_pixels<F>(image: &Rgb32FImage, f: F) -> Rgb32FImage
where
    F: Fn([f32; 3]) -> [f32; 3],
{
    let (w, h) = image.dimensions();
    let mut out = Rgb32FImage::new(w, h);
    for (dst, src) in out.pixels_mut().zip(image.pixels()) {
        *dst = Rgb(f(src.0));
    }
    out
}

/// Whole-image RGB to LAB (channels hold L, a, b)
#[must_use]
pub fn image_to_lab(image: &Rgb32FImage) -> Rgb32FImage {
    map_pixels(image, rgb_to_lab)
}

/// Whole-image LAB back to RGB
#[must_use]
pub fn image_from_lab(lab: &Rgb32FImage) -> Rgb32FImage {
    map_pixels(lab, lab_to_rgb)
}

/// Scale saturation in HSV space by `factor`
#[must_use]
pub fn scale_saturation(image: &Rgb32FImage, factor: f32) -> Rgb32FImage {
    map_pixels(image, |p| {
        let [h, s, v] = rgb_to_hsv(clamp_triple(p));
        hsv_to_rgb([h, (s * factor).clamp(0.0, 1.0), v])
    })
}

#[inline]
#[must_use]
pub fn clamp_triple(p: [f32; 3]) -> [f32; 3] {
    [
        p[0].clamp(0.0, 255.0),
        p[1].clamp(0.0, 255.0),
        p[2].clamp(0.0, 255.0),
    ]
}

/// Mean and population variance of Rec. 601 luma over the whole frame
#[must_use]
pub fn luma_statistics(image: &RgbImage) -> (f64, f64) {
    let n = f64::from(image.width()) * f64::from(image.height());
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let lumas: Vec<f64> = image
        .pixels()
        .map(|p| f64::from(luma(f32::from(p[0]), f32::from(p[1]), f32::from(p[2]))))
        .collect();
    let mean = lumas.iter().sum::<f64>() / n;
    let variance = lumas.iter().map(|l| (l - mean) * (l - mean)).sum::<f64>() / n;
    (mean, variance)
}
