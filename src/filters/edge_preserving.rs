//! Domain-transform recursive filter for edge-preserving smoothing
//!
//! The image is warped along each axis by the accumulated colour gradient and
//! then smoothed with a first-order recursive filter, alternating horizontal
//! and vertical passes with a shrinking sigma.

use image::{Rgb, Rgb32FImage};

const ITERATIONS: u32 = 3;

/// Smooth flat areas while keeping edges.
///
/// `sigma_space` is in pixels, `sigma_range` is relative to a unit colour
/// range (values are divided by 255 internally).
#[must_use]
pub fn edge_preserving_filter(image: &Rgb32FImage, sigma_space: f32, sigma_range: f32) -> Rgb32FImage {
    let (w, h) = image.dimensions();
    let (wu, hu) = (w as usize, h as usize);
    if wu == 0 || hu == 0 || sigma_space <= 0.0 || sigma_range <= 0.0 {
        return image.clone();
    }

    let ratio = sigma_space / sigma_range;
    let src: Vec<[f32; 3]> = image.pixels().map(|p| p.0).collect();

    // Derivatives of the transformed domain, from the unfiltered image
    let mut dx = vec![1.0f32; wu * hu];
    let mut dy = vec![1.0f32; wu * hu];
    for y in 0..hu {
        for x in 0..wu {
            let i = y * wu + x;
            if x > 0 {
                dx[i] = 1.0 + ratio * channel_distance(&src[i], &src[i - 1]) / 255.0;
            }
            if y > 0 {
                dy[i] = 1.0 + ratio * channel_distance(&src[i], &src[i - wu]) / 255.0;
            }
        }
    }

    let mut buf = src;
    let n = ITERATIONS as f32;
    for i in 0..ITERATIONS {
        let sigma_h = sigma_space * 3f32.sqrt() * 2f32.powf(n - (i as f32 + 1.0))
            / (4f32.powf(n) - 1.0).sqrt();
        let a = (-(2f32.sqrt()) / sigma_h).exp();

        for y in 0..hu {
            recursive_pass(&mut buf, &dx, a, y * wu, 1, wu);
        }
        for x in 0..wu {
            recursive_pass(&mut buf, &dy, a, x, wu, hu);
        }
    }

    let mut out = Rgb32FImage::new(w, h);
    for (dst, v) in out.pixels_mut().zip(buf) {
        *dst = Rgb(v);
    }
    out
}

#[inline]
fn channel_distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    (a[0] - b[0]).abs() + (a[1] - b[1]).abs() + (a[2] - b[2]).abs()
}

/// Causal then anti-causal pass over one line of `len` samples
fn recursive_pass(buf: &mut [[f32; 3]], d: &[f32], a: f32, start: usize, stride: usize, len: usize) {
    for k in 1..len {
        let i = start + k * stride;
        let prev = buf[i - stride];
        let v = a.powf(d[i]);
        for c in 0..3 {
            buf[i][c] += v * (prev[c] - buf[i][c]);
        }
    }
    for k in (0..len.saturating_sub(1)).rev() {
        let i = start + k * stride;
        let next = buf[i + stride];
        let v = a.powf(d[i + stride]);
        for c in 0..3 {
            buf[i][c] += v * (next[c] - buf[i][c]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_image_exact() {
        let img = Rgb32FImage::from_pixel(12, 9, Rgb([200.0, 150.0, 130.0]));
        let out = edge_preserving_filter(&img, 50.0, 0.2);
        for p in out.pixels() {
            assert_eq!(p.0, [200.0, 150.0, 130.0]);
        }
    }

    #[test]
    fn test_keeps_hard_edge_and_smooths_ramp() {
        let img = Rgb32FImage::from_fn(20, 6, |x, y| {
            let base = if x < 10 { 20.0 } else { 230.0 };
            let noise = if (x + y) % 2 == 0 { 4.0 } else { -4.0 };
            Rgb([base + noise; 3])
        });
        let out = edge_preserving_filter(&img, 50.0, 0.2);
        let left = out.get_pixel(3, 3).0[0];
        let right = out.get_pixel(16, 3).0[0];
        assert!((left - 20.0).abs() < 4.0, "{left}");
        assert!((right - 230.0).abs() < 4.0, "{right}");
        // Noise amplitude shrinks
        let a = out.get_pixel(3, 3).0[0];
        let b = out.get_pixel(4, 3).0[0];
        assert!((a - b).abs() < 8.0);
    }

    #[test]
    fn test_zero_sigma_is_identity() {
        let img = Rgb32FImage::from_fn(4, 4, |x, _| Rgb([x as f32 * 10.0; 3]));
        let out = edge_preserving_filter(&img, 0.0, 0.2);
        assert_eq!(out, img);
    }
}
