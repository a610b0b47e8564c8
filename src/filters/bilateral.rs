//! Edge-aware bilateral filter

use super::reflect101;
use image::{Rgb, Rgb32FImage};

/// Bilateral filter with a circular window of diameter `diameter`
///
/// Colour distance is the sum of absolute channel differences, looked up in a
/// table quantized to whole units.
#[must_use]
pub fn bilateral_filter(
    image: &Rgb32FImage,
    diameter: u32,
    sigma_color: f32,
    sigma_space: f32,
) -> Rgb32FImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }
    let sigma_color = if sigma_color <= 0.0 { 1.0 } else { sigma_color };
    let sigma_space = if sigma_space <= 0.0 { 1.0 } else { sigma_space };
    let radius = (diameter / 2).max(1) as i64;

    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let space_coeff = -0.5 / (sigma_space * sigma_space);

    let mut offsets = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let r2 = (dx * dx + dy * dy) as f32;
            if r2 <= (radius * radius) as f32 {
                offsets.push((dx, dy, (r2 * space_coeff).exp()));
            }
        }
    }

    let color_lut: Vec<f32> = (0..=3 * 256)
        .map(|d| {
            let d = d as f32;
            (d * d * color_coeff).exp()
        })
        .collect();
    let lut_max = color_lut.len() - 1;

    Rgb32FImage::from_fn(w, h, |x, y| {
        let center = image.get_pixel(x, y).0;
        let mut acc = [0.0f32; 3];
        let mut weight_sum = 0.0f32;
        for &(dx, dy, spatial) in &offsets {
            let sx = reflect101(i64::from(x) + dx, w as usize) as u32;
            let sy = reflect101(i64::from(y) + dy, h as usize) as u32;
            let p = image.get_pixel(sx, sy).0;
            let dist = (p[0] - center[0]).abs() + (p[1] - center[1]).abs() + (p[2] - center[2]).abs();
            let idx = (dist.round() as usize).min(lut_max);
            let wgt = spatial * color_lut[idx];
            acc[0] += p[0] * wgt;
            acc[1] += p[1] * wgt;
            acc[2] += p[2] * wgt;
            weight_sum += wgt;
        }
        Rgb([acc[0] / weight_sum, acc[1] / weight_sum, acc[2] / weight_sum])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_image_unchanged() {
        let img = Rgb32FImage::from_pixel(7, 5, Rgb([120.0, 80.0, 40.0]));
        let out = bilateral_filter(&img, 9, 75.0, 75.0);
        let first = out.get_pixel(0, 0).0;
        for p in out.pixels() {
            assert_eq!(p.0, first);
        }
        assert!((first[0] - 120.0).abs() < 1e-3);
    }

    #[test]
    fn test_preserves_strong_edge() {
        let img = Rgb32FImage::from_fn(10, 4, |x, _| {
            if x < 5 {
                Rgb([10.0, 10.0, 10.0])
            } else {
                Rgb([240.0, 240.0, 240.0])
            }
        });
        let out = bilateral_filter(&img, 5, 20.0, 20.0);
        assert!(out.get_pixel(4, 2).0[0] < 20.0);
        assert!(out.get_pixel(5, 2).0[0] > 230.0);
    }

    #[test]
    fn test_smooths_small_noise() {
        let img = Rgb32FImage::from_fn(9, 9, |x, y| {
            let v = if (x + y) % 2 == 0 { 100.0 } else { 110.0 };
            Rgb([v, v, v])
        });
        let out = bilateral_filter(&img, 5, 75.0, 75.0);
        let v = out.get_pixel(4, 4).0[0];
        assert!(v > 101.0 && v < 109.0, "{v}");
    }
}
