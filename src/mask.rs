//! Soft masks with weights in `[0, 1]`
//!
//! A [`Mask`] is a single float plane. It is used for feathered blending of
//! retouched regions and as the output of every segmentation tier.

use crate::filters::gaussian::gaussian_blur_plane;
use crate::filters::morphology::{close_gray, StructuringElement};
use crate::types::Region;
use image::{imageops, GrayImage, ImageBuffer, Luma};
use imageproc::drawing::draw_filled_ellipse_mut;

/// Backing buffer of a mask
pub type MaskBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Per-pixel weight plane, every value clamped to `[0, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct Mask(MaskBuffer);

impl Mask {
    /// All-zero mask
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self(MaskBuffer::new(width, height))
    }

    #[must_use]
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self(MaskBuffer::from_pixel(width, height, Luma([value.clamp(0.0, 1.0)])))
    }

    /// Mask covering the whole frame with weight 1
    #[must_use]
    pub fn whole(width: u32, height: u32) -> Self {
        Self::filled(width, height, 1.0)
    }

    /// Wrap a buffer, clamping values into range
    #[must_use]
    pub fn from_buffer(mut buffer: MaskBuffer) -> Self {
        for p in buffer.pixels_mut() {
            p.0[0] = if p.0[0].is_nan() { 0.0 } else { p.0[0].clamp(0.0, 1.0) };
        }
        Self(buffer)
    }

    #[must_use]
    pub fn from_fn<F>(width: u32, height: u32, f: F) -> Self
    where
        F: Fn(u32, u32) -> f32,
    {
        Self::from_buffer(MaskBuffer::from_fn(width, height, |x, y| Luma([f(x, y)])))
    }

    /// Scale an 8-bit plane down to weights
    #[must_use]
    pub fn from_gray(gray: &GrayImage) -> Self {
        let (w, h) = gray.dimensions();
        Self(MaskBuffer::from_fn(w, h, |x, y| {
            Luma([f32::from(gray.get_pixel(x, y).0[0]) / 255.0])
        }))
    }

    /// Quantize to an 8-bit plane
    #[must_use]
    pub fn to_gray(&self) -> GrayImage {
        let (w, h) = self.dimensions();
        GrayImage::from_fn(w, h, |x, y| Luma([(self.get(x, y) * 255.0).round() as u8]))
    }

    /// Elliptical mask inset by `margin` and feathered with a Gaussian of
    /// kernel size `feather`
    #[must_use]
    pub fn ellipse(width: u32, height: u32, margin: (u32, u32), feather: u32) -> Self {
        let mut mask = Self::new(width, height);
        let center = ((width / 2) as i32, (height / 2) as i32);
        let axes = (
            (width / 2).saturating_sub(margin.0) as i32,
            (height / 2).saturating_sub(margin.1) as i32,
        );
        mask.paint_ellipse(center, axes, 1.0);
        if feather > 1 {
            mask.gaussian_blur(feather as usize, 0.0)
        } else {
            mask
        }
    }

    /// Rectangle of ones at `rect`, feathered like [`Mask::ellipse`]
    #[must_use]
    pub fn rectangle(width: u32, height: u32, rect: Region, feather: u32) -> Self {
        let mut mask = Self::new(width, height);
        for y in rect.y..rect.bottom().min(height) {
            for x in rect.x..rect.right().min(width) {
                mask.0.put_pixel(x, y, Luma([1.0]));
            }
        }
        if feather > 1 {
            mask.gaussian_blur(feather as usize, 0.0)
        } else {
            mask
        }
    }

    /// Draw a filled ellipse; axes of zero leave the mask untouched
    pub fn paint_ellipse(&mut self, center: (i32, i32), axes: (i32, i32), value: f32) {
        if axes.0 <= 0 || axes.1 <= 0 {
            return;
        }
        draw_filled_ellipse_mut(&mut self.0, center, axes.0, axes.1, Luma([value.clamp(0.0, 1.0)]));
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    #[inline]
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.0.get_pixel(x, y).0[0]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        self.0.put_pixel(x, y, Luma([value.clamp(0.0, 1.0)]));
    }

    #[must_use]
    pub fn as_raw(&self) -> &[f32] {
        self.0.as_raw()
    }

    #[must_use]
    pub fn buffer(&self) -> &MaskBuffer {
        &self.0
    }

    /// Mean weight, 0 for an empty mask
    #[must_use]
    pub fn mean(&self) -> f32 {
        let raw = self.as_raw();
        if raw.is_empty() {
            return 0.0;
        }
        raw.iter().sum::<f32>() / raw.len() as f32
    }

    /// Fraction of pixels with weight above `threshold`
    #[must_use]
    pub fn coverage(&self, threshold: f32) -> f32 {
        let raw = self.as_raw();
        if raw.is_empty() {
            return 0.0;
        }
        raw.iter().filter(|v| **v > threshold).count() as f32 / raw.len() as f32
    }

    #[must_use]
    pub fn invert(&self) -> Self {
        let mut out = self.0.clone();
        for p in out.pixels_mut() {
            p.0[0] = 1.0 - p.0[0];
        }
        Self(out)
    }

    /// Multiply every weight by `factor`, clamped
    #[must_use]
    pub fn scale(&self, factor: f32) -> Self {
        let mut out = self.0.clone();
        for p in out.pixels_mut() {
            p.0[0] = (p.0[0] * factor).clamp(0.0, 1.0);
        }
        Self(out)
    }

    /// Element-wise product with a mask of the same size
    #[must_use]
    pub fn multiply(&self, other: &Self) -> Self {
        let mut out = self.0.clone();
        for (p, q) in out.pixels_mut().zip(other.0.pixels()) {
            p.0[0] *= q.0[0];
        }
        Self(out)
    }

    #[must_use]
    pub fn gaussian_blur(&self, ksize: usize, sigma: f32) -> Self {
        let (w, h) = self.dimensions();
        let plane = gaussian_blur_plane(self.as_raw(), w as usize, h as usize, ksize, sigma);
        Self::from_raw_clamped(w, h, plane)
    }

    /// Grey-scale closing at 8-bit precision
    #[must_use]
    pub fn close(&self, element: StructuringElement) -> Self {
        Self::from_gray(&close_gray(&self.to_gray(), element))
    }

    /// Bilinear resample to a new size
    #[must_use]
    pub fn resize(&self, width: u32, height: u32) -> Self {
        if self.dimensions() == (width, height) {
            return self.clone();
        }
        Self::from_buffer(imageops::resize(&self.0, width, height, imageops::FilterType::Triangle))
    }

    /// Copy out the part of the mask under `region`
    #[must_use]
    pub fn crop(&self, region: Region) -> Self {
        Self(imageops::crop_imm(&self.0, region.x, region.y, region.width, region.height).to_image())
    }

    fn from_raw_clamped(width: u32, height: u32, plane: Vec<f32>) -> Self {
        match MaskBuffer::from_raw(width, height, plane) {
            Some(buffer) => Self::from_buffer(buffer),
            None => Self::new(width, height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_clamped() {
        let m = Mask::from_fn(3, 1, |x, _| x as f32 - 0.5);
        assert_eq!(m.as_raw(), &[0.0, 0.5, 1.0]);
        let nan = Mask::from_fn(1, 1, |_, _| f32::NAN);
        assert_eq!(nan.get(0, 0), 0.0);
    }

    #[test]
    fn test_ellipse_mask_shape() {
        let m = Mask::ellipse(40, 30, (5, 3), 15);
        assert!(m.get(20, 15) > 0.95);
        assert!(m.get(0, 0) < 0.05);
        assert!(m.as_raw().iter().all(|v| (0.0..=1.0).contains(v)));
        // Feathering gives intermediate weights near the rim
        assert!(m.as_raw().iter().any(|v| *v > 0.1 && *v < 0.9));
    }

    #[test]
    fn test_degenerate_ellipse_is_empty() {
        let m = Mask::ellipse(6, 4, (5, 3), 1);
        assert_eq!(m.mean(), 0.0);
    }

    #[test]
    fn test_invert_and_multiply() {
        let m = Mask::filled(2, 2, 0.25);
        assert!((m.invert().get(1, 1) - 0.75).abs() < 1e-6);
        let p = m.multiply(&Mask::filled(2, 2, 0.5));
        assert!((p.get(0, 0) - 0.125).abs() < 1e-6);
    }

    #[test]
    fn test_gray_round_trip() {
        let m = Mask::from_fn(4, 1, |x, _| x as f32 / 3.0);
        let g = m.to_gray();
        assert_eq!(g.get_pixel(3, 0).0[0], 255);
        let back = Mask::from_gray(&g);
        assert!((back.get(1, 0) - m.get(1, 0)).abs() < 1.0 / 255.0);
    }

    #[test]
    fn test_resize_and_crop() {
        let m = Mask::whole(8, 8);
        let r = m.resize(16, 4);
        assert_eq!(r.dimensions(), (16, 4));
        assert!(r.as_raw().iter().all(|v| (*v - 1.0).abs() < 1e-5));
        let c = m.crop(Region::new(2, 2, 3, 4));
        assert_eq!(c.dimensions(), (3, 4));
    }

    #[test]
    fn test_rectangle_mask() {
        let m = Mask::rectangle(10, 10, Region::new(2, 2, 4, 4), 1);
        assert_eq!(m.get(3, 3), 1.0);
        assert_eq!(m.get(7, 7), 0.0);
        assert!((m.scale(0.5).get(3, 3) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_coverage() {
        let m = Mask::from_fn(4, 1, |x, _| if x < 1 { 1.0 } else { 0.0 });
        assert!((m.coverage(0.5) - 0.25).abs() < 1e-6);
    }
}
