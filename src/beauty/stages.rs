//! Retouching passes used by the beauty pipeline
//!
//! Each pass reads the working buffer and returns a new one. The `*_faces`
//! variants work inside detected regions through feathered masks, the
//! `*_whole` variants are the degraded mode used when no face was found.

use crate::blend::{blend_into, extract, mix};
use crate::color::{
    clamp_float, clamp_triple, hsv_to_rgb, image_from_lab, image_to_lab, lab_to_rgb, map_pixels,
    rgb_to_hsv, scale_saturation,
};
use crate::filters::enhance::{add_weighted, brightness, color, contrast, sharpness};
use crate::filters::gaussian::gaussian_blur;
use crate::filters::clahe::equalize;
use crate::filters::{bilateral_filter, edge_preserving_filter};
use crate::mask::Mask;
use crate::types::{FaceRegion, Region};
use crate::utils::NumericValidator;
use image::{Rgb, Rgb32FImage};

/// Scale between CIE L* (0-100) and the 8-bit lightness plane CLAHE works on
const L_TO_8BIT: f32 = 255.0 / 100.0;

fn bilateral_params(s: f32, sigma_base: f32) -> (u32, f32) {
    let diameter = ((15.0 * s) as u32).max(5);
    let sigma = (sigma_base * s).trunc().max(40.0);
    (diameter, sigma)
}

/// Layered smoothing of each face and its neck area
pub fn smooth_faces(image: &Rgb32FImage, faces: &[FaceRegion], s: f32) -> Rgb32FImage {
    let bounds = image.dimensions();
    let mut out = image.clone();
    for face in faces {
        let Some(area) = face.face.expand_ratio(0.3, 0.15, 1.6, 1.3, bounds) else {
            continue;
        };
        let patch = extract(&out, area);
        let (diameter, sigma) = bilateral_params(s, 100.0);
        let smooth1 = bilateral_filter(&patch, diameter, sigma, sigma);
        let smooth2 = edge_preserving_filter(&smooth1, 50.0, 0.2);
        let kernel = NumericValidator::odd_kernel(7.0 * s, 3) as usize;
        let smooth3 = gaussian_blur(&smooth2, kernel, 0.0);

        let (pw, ph) = (area.width, area.height);
        let feather = NumericValidator::odd_kernel((pw.min(ph) / 4).min(51) as f32, 3);
        let mask = Mask::ellipse(pw, ph, (pw / 10, ph / 10), feather);

        blend_into(&mut out, &smooth1, &mask, area, 0.25 * s);
        blend_into(&mut out, &smooth2, &mask, area, 0.15 * s);
        blend_into(&mut out, &smooth3, &mask, area, 0.10 * s);
    }
    out
}

/// Whole-frame smoothing when no face was found
pub fn smooth_whole(image: &Rgb32FImage, s: f32) -> Rgb32FImage {
    let (diameter, sigma) = bilateral_params(s, 120.0);
    let smooth1 = bilateral_filter(image, diameter, sigma, sigma);
    let kernel = NumericValidator::odd_kernel(7.0 * s, 3) as usize;
    let smooth2 = gaussian_blur(&smooth1, kernel, 0.0);
    let smooth3 = edge_preserving_filter(&smooth2, 50.0, 0.4);

    let result = mix(image, &smooth1, 0.6 * s);
    let result = mix(&result, &smooth2, 0.4 * s);
    mix(&result, &smooth3, 0.3 * s)
}

/// Lightness plane on the 8-bit scale, plus the LAB image it came from
fn lightness_plane(image: &Rgb32FImage) -> (Rgb32FImage, Vec<f32>) {
    let lab = image_to_lab(image);
    let plane = lab.pixels().map(|p| p.0[0] * L_TO_8BIT).collect();
    (lab, plane)
}

fn equalized_lift(plane: &[f32], width: u32, height: u32, clip: f32, lift: f32) -> Vec<f32> {
    equalize(plane, width as usize, height as usize, clip, (8, 8))
        .into_iter()
        .map(|v| (v + lift).min(255.0))
        .collect()
}

/// Brighten skin inside each face while damping the lift over eyes and mouths
pub fn whiten_faces(image: &Rgb32FImage, faces: &[FaceRegion], s: f32) -> Rgb32FImage {
    let (w, h) = image.dimensions();
    let (lab, mut plane) = lightness_plane(image);
    let lifted = equalized_lift(&plane, w, h, 3.0, (50.0 * s).trunc());

    let mut touched = vec![false; plane.len()];
    for face in faces {
        let face_mask = Mask::rectangle(w, h, face.face, 15);
        let mut protection = Mask::whole(w, h);
        for eye in &face.eyes {
            let (cx, cy) = eye.center();
            let axes = ((eye.width / 2 + 5) as i32, (eye.height / 2 + 5) as i32);
            protection.paint_ellipse((cx as i32, cy as i32), axes, 0.3);
        }
        for mouth in &face.mouths {
            let (cx, cy) = mouth.center();
            let axes = ((mouth.width / 2 + 3) as i32, (mouth.height / 2 + 3) as i32);
            protection.paint_ellipse((cx as i32, cy as i32), axes, 0.4);
        }
        let combined = face_mask.multiply(&protection).scale(s);
        for (i, m) in combined.as_raw().iter().enumerate() {
            if *m > 0.0 {
                plane[i] += (lifted[i] - plane[i]) * m;
                touched[i] = true;
            }
        }
    }

    let mut out = image.clone();
    for (i, (dst, src)) in out.pixels_mut().zip(lab.pixels()).enumerate() {
        if touched[i] {
            *dst = Rgb(lab_to_rgb([plane[i] / L_TO_8BIT, src.0[1], src.0[2]]));
        }
    }
    out
}

/// Whole-frame whitening when no face was found
pub fn whiten_whole(image: &Rgb32FImage, s: f32) -> Rgb32FImage {
    let (w, h) = image.dimensions();
    let (mut lab, plane) = lightness_plane(image);
    let lifted = equalized_lift(&plane, w, h, 2.0, (40.0 * s).trunc());
    for (p, l) in lab.pixels_mut().zip(lifted) {
        p.0[0] = l / L_TO_8BIT;
    }
    let brightened = scale_saturation(&image_from_lab(&lab), 0.95);
    mix(image, &brightened, 0.85 * s)
}

/// PIL-style enhancer chain, clamped between steps
fn enhance_chain(patch: &Rgb32FImage, contrast_f: f32, sharp_f: f32, bright_f: f32) -> Rgb32FImage {
    let out = clamp_float(&contrast(patch, contrast_f));
    let out = clamp_float(&sharpness(&out, sharp_f));
    clamp_float(&brightness(&out, bright_f))
}

/// Contrast, sharpness, brightness and colour boost inside each eye
pub fn enhance_eyes(image: &Rgb32FImage, eyes: &[Region], s: f32) -> Rgb32FImage {
    let bounds = image.dimensions();
    let mut out = image.clone();
    for eye in eyes {
        let Some(area) = eye.expand(10, bounds) else {
            continue;
        };
        let patch = extract(&out, area);
        let enhanced = enhance_chain(&patch, 1.0 + 0.8 * s, 1.0 + 0.9 * s, 1.0 + 0.3 * s);
        let enhanced = clamp_float(&color(&enhanced, 1.0 + 0.4 * s));
        let mask = Mask::ellipse(area.width, area.height, (5, 3), 15);
        blend_into(&mut out, &enhanced, &mask, area, 0.8);
    }
    out
}

/// Whole-frame eye enhancement when no face was found
pub fn enhance_eyes_whole(image: &Rgb32FImage, s: f32) -> Rgb32FImage {
    let enhanced = enhance_chain(image, 1.0 + 0.5 * s, 1.0 + 0.6 * s, 1.0 + 0.2 * s);
    let enhanced = scale_saturation(&enhanced, 1.0 + 0.3 * s);
    mix(image, &enhanced, 0.75 * s)
}

/// Move `hue` toward pure red by at most `amount` degrees
fn pull_toward_red(hue: f32, amount: f32) -> f32 {
    if hue < 180.0 {
        (hue - amount).max(0.0)
    } else {
        (hue + amount).min(360.0).rem_euclid(360.0)
    }
}

/// Saturation, value and hue adjustment inside each mouth
pub fn enhance_lips(image: &Rgb32FImage, mouths: &[Region], s: f32) -> Rgb32FImage {
    let bounds = image.dimensions();
    let mut out = image.clone();
    for mouth in mouths {
        let Some(area) = mouth.expand(8, bounds) else {
            continue;
        };
        let patch = extract(&out, area);
        let enhanced = map_pixels(&patch, |p| {
            let [hue, sat, val] = rgb_to_hsv(clamp_triple(p));
            hsv_to_rgb([
                pull_toward_red(hue, 10.0 * s),
                (sat * (1.0 + 0.5 * s)).min(1.0),
                (val + 20.0 * s).min(255.0),
            ])
        });
        let mask = Mask::ellipse(area.width, area.height, (3, 2), 11);
        blend_into(&mut out, &enhanced, &mask, area, 0.7);
    }
    out
}

/// Whether an HSV triple is close enough to red to count as lip colour
fn is_reddish(hsv: [f32; 3]) -> bool {
    let [hue, sat, val] = hsv;
    (hue <= 20.0 || hue >= 340.0) && sat >= 50.0 / 255.0 && val >= 50.0
}

/// Whole-frame lip enhancement: boost red hues only
pub fn enhance_lips_whole(image: &Rgb32FImage, s: f32) -> Rgb32FImage {
    let boosted = map_pixels(image, |p| {
        let hsv = rgb_to_hsv(clamp_triple(p));
        if !is_reddish(hsv) {
            return p;
        }
        let [hue, sat, val] = hsv;
        hsv_to_rgb([
            hue,
            (sat * (1.0 + 0.6 * s)).min(1.0),
            (val * (1.0 + 0.3 * s)).min(255.0),
        ])
    });
    let enhanced = clamp_float(&contrast(&boosted, 1.0 + 0.25 * s));
    mix(image, &enhanced, 0.7 * s)
}

/// Fixed warm nudge of the chroma channels and slight desaturation
pub fn color_harmony(image: &Rgb32FImage) -> Rgb32FImage {
    let mut lab = image_to_lab(image);
    for p in lab.pixels_mut() {
        p.0[1] *= 0.98;
        p.0[2] *= 1.02;
    }
    scale_saturation(&image_from_lab(&lab), 0.96)
}

/// Unsharp mask, bilateral denoise, then a fixed blend back
pub fn detail_enhance(image: &Rgb32FImage) -> Rgb32FImage {
    let blurred = gaussian_blur(image, 13, 2.0);
    let sharpened = clamp_float(&add_weighted(image, 1.5, &blurred, -0.5, 0.0));
    let denoised = bilateral_filter(&sharpened, 9, 75.0, 75.0);
    add_weighted(image, 0.7, &denoised, 0.3, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::luma;

    fn portrait() -> Rgb32FImage {
        Rgb32FImage::from_fn(80, 80, |x, y| {
            let noise = if (x * 7 + y * 3) % 5 == 0 { 12.0 } else { 0.0 };
            Rgb([200.0 + noise, 160.0 + noise, 140.0])
        })
    }

    fn face() -> FaceRegion {
        let mut f = FaceRegion::new(Region::new(20, 20, 40, 40));
        f.eyes.push(Region::new(28, 30, 8, 6));
        f.mouths.push(Region::new(32, 48, 16, 6));
        f
    }

    fn mean_luma(img: &Rgb32FImage, region: Region) -> f32 {
        let mut sum = 0.0;
        for y in region.y..region.bottom() {
            for x in region.x..region.right() {
                let p = img.get_pixel(x, y).0;
                sum += luma(p[0], p[1], p[2]);
            }
        }
        sum / region.area() as f32
    }

    #[test]
    fn test_smoothing_reduces_noise_inside_face_only() {
        let img = portrait();
        let out = smooth_faces(&img, &[face()], 0.8);
        // Corner far from the expanded face area is untouched
        assert_eq!(out.get_pixel(0, 79).0, img.get_pixel(0, 79).0);
        let var = |im: &Rgb32FImage| {
            let vals: Vec<f32> = (30..50).map(|x| im.get_pixel(x, 40).0[0]).collect();
            let m = vals.iter().sum::<f32>() / vals.len() as f32;
            vals.iter().map(|v| (v - m) * (v - m)).sum::<f32>()
        };
        assert!(var(&out) < var(&img));
    }

    #[test]
    fn test_whitening_brightens_face() {
        let img = portrait();
        let out = whiten_faces(&img, &[face()], 0.7);
        let r = Region::new(40, 24, 12, 4);
        assert!(mean_luma(&out, r) > mean_luma(&img, r));
        assert_eq!(out.get_pixel(2, 2).0, img.get_pixel(2, 2).0);
    }

    #[test]
    fn test_eye_protection_damps_lift() {
        let img = Rgb32FImage::from_pixel(80, 80, Rgb([150.0, 120.0, 110.0]));
        let out = whiten_faces(&img, &[face()], 1.0);
        let eye = face().eyes[0];
        let (ex, ey) = eye.center();
        let cheek = out.get_pixel(50, 40).0;
        let eye_px = out.get_pixel(ex, ey).0;
        assert!(luma(cheek[0], cheek[1], cheek[2]) > luma(eye_px[0], eye_px[1], eye_px[2]));
    }

    #[test]
    fn test_lips_pulled_toward_red() {
        let img = Rgb32FImage::from_pixel(60, 60, Rgb([180.0, 90.0, 110.0]));
        let mouth = Region::new(20, 20, 20, 12);
        let out = enhance_lips(&img, &[mouth], 1.0);
        let (cx, cy) = mouth.center();
        let before = rgb_to_hsv(img.get_pixel(cx, cy).0);
        let after = rgb_to_hsv(out.get_pixel(cx, cy).0);
        assert!(after[1] > before[1]);
        assert!(after[0] > before[0] || after[0] < 5.0);
        assert_eq!(out.get_pixel(0, 0).0, img.get_pixel(0, 0).0);
    }

    #[test]
    fn test_pull_toward_red() {
        assert_eq!(pull_toward_red(5.0, 10.0), 0.0);
        assert!((pull_toward_red(350.0, 5.0) - 355.0).abs() < 1e-4);
        assert_eq!(pull_toward_red(355.0, 10.0), 0.0);
    }

    #[test]
    fn test_eye_enhancement_stays_local() {
        let img = portrait();
        let eye = Region::new(30, 30, 10, 6);
        let out = enhance_eyes(&img, &[eye], 0.9);
        assert_eq!(out.get_pixel(5, 5).0, img.get_pixel(5, 5).0);
        assert_eq!(out.get_pixel(79, 79).0, img.get_pixel(79, 79).0);
    }

    #[test]
    fn test_whole_image_passes_keep_uniform_images_uniform() {
        let img = Rgb32FImage::from_pixel(40, 30, Rgb([255.0, 0.0, 0.0]));
        for out in [
            smooth_whole(&img, 0.6),
            whiten_whole(&img, 0.5),
            enhance_eyes_whole(&img, 0.5),
            enhance_lips_whole(&img, 0.5),
            color_harmony(&img),
            detail_enhance(&img),
        ] {
            let first = out.get_pixel(0, 0).0;
            assert!(out.pixels().all(|p| p.0 == first));
        }
    }

    #[test]
    fn test_reddish_selection() {
        assert!(is_reddish(rgb_to_hsv([200.0, 40.0, 50.0])));
        assert!(!is_reddish(rgb_to_hsv([40.0, 200.0, 50.0])));
        assert!(!is_reddish(rgb_to_hsv([30.0, 10.0, 10.0])));
    }
}
