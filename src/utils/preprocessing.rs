//! Model input preparation and output decoding for the neural segmentation tier

use crate::error::{RetouchError, Result};
use crate::mask::{Mask, MaskBuffer};
use image::{imageops, Luma, RgbImage};
use ndarray::Array4;

/// Square input size and per-channel normalization for a segmentation model
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationConfig {
    pub target_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl NormalizationConfig {
    /// ImageNet statistics at the given square size
    #[must_use]
    pub fn imagenet(target_size: u32) -> Self {
        Self {
            target_size,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self::imagenet(320)
    }
}

/// Converts images to model tensors and model tensors back to masks
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Stretch the image to the model's square size and normalize into an NCHW tensor
    pub fn to_tensor(image: &RgbImage, config: &NormalizationConfig) -> Result<Array4<f32>> {
        let size = config.target_size;
        if size == 0 {
            return Err(RetouchError::invalid_config("Model input size must be positive"));
        }
        if config.std.iter().any(|s| *s <= 0.0) {
            return Err(RetouchError::invalid_config(
                "Normalization std must be positive",
            ));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(RetouchError::invalid_input("Cannot build a tensor from an empty image"));
        }

        let resized = imageops::resize(image, size, size, imageops::FilterType::Lanczos3);
        let side = size as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, side, side));

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor dimensions match the resized canvas
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] =
                    (f32::from(pixel[c]) / 255.0 - config.mean[c]) / config.std[c];
            }
        }
        Ok(tensor)
    }

    /// Min-max normalize the first output plane and resize it to `width` x `height`
    ///
    /// `values` is a row-major `[.., H, W]` output; only the first plane is read.
    pub fn plane_to_mask(
        values: &[f32],
        plane_width: usize,
        plane_height: usize,
        width: u32,
        height: u32,
    ) -> Result<Mask> {
        let len = plane_width * plane_height;
        if len == 0 || values.len() < len {
            return Err(RetouchError::model(format!(
                "Model output has {} values, expected at least {}x{}",
                values.len(),
                plane_width,
                plane_height
            )));
        }
        let plane = &values[..len];
        if plane.iter().any(|v| !v.is_finite()) {
            return Err(RetouchError::model("Model output contains non-finite values"));
        }

        let (min, max) = plane
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let range = max - min;
        let normalized: Vec<f32> = if range > f32::EPSILON {
            plane.iter().map(|v| (v - min) / range).collect()
        } else {
            // A flat prediction carries no separation
            vec![min.clamp(0.0, 1.0); len]
        };

        let buffer = MaskBuffer::from_raw(plane_width as u32, plane_height as u32, normalized)
            .ok_or_else(|| RetouchError::internal("Mask buffer size mismatch"))?;
        let mask = Mask::from_buffer(buffer);
        if mask.dimensions() == (width, height) {
            return Ok(mask);
        }
        let resized = imageops::resize(mask.buffer(), width, height, imageops::FilterType::Lanczos3);
        Ok(Mask::from_buffer(resized))
    }

    /// Alpha channel of a cutout as a mask
    #[must_use]
    pub fn alpha_to_mask(cutout: &image::RgbaImage) -> Mask {
        let (w, h) = cutout.dimensions();
        Mask::from_buffer(MaskBuffer::from_fn(w, h, |x, y| {
            Luma([f32::from(cutout.get_pixel(x, y).0[3]) / 255.0])
        }))
    }
}
