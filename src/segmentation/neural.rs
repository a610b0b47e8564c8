//! Neural segmentation tier
//!
//! The model itself is an opaque collaborator behind [`NeuralSegmenter`].
//! Whatever it returns is turned into a foreground mask here.

use super::SegmentationStrategy;
use crate::color::luma;
use crate::error::{RetouchError, Result};
use crate::mask::Mask;
use crate::types::SegmentationTier;
use crate::utils::ImagePreprocessor;
use image::{imageops, RgbImage, RgbaImage};
use std::sync::Arc;

/// Luminance above which an opaque model output counts as foreground
pub const OPAQUE_FOREGROUND_THRESHOLD: f32 = 10.0;

/// What a segmentation model hands back
#[derive(Debug, Clone)]
pub enum SegmenterOutput {
    /// Per-pixel foreground probability
    Probability(Mask),
    /// Cut-out subject whose alpha channel is the foreground
    Cutout(RgbaImage),
    /// Subject on a black background without alpha
    Opaque(RgbImage),
}

/// Opaque foreground segmentation model
pub trait NeuralSegmenter: Send + Sync {
    fn segment(&self, image: &RgbImage) -> Result<SegmenterOutput>;

    fn name(&self) -> &'static str {
        "neural-segmenter"
    }
}

/// First cascade tier: delegates to an injected model
#[derive(Clone, Default)]
pub struct NeuralTier {
    segmenter: Option<Arc<dyn NeuralSegmenter>>,
}

impl NeuralTier {
    #[must_use]
    pub fn new(segmenter: Option<Arc<dyn NeuralSegmenter>>) -> Self {
        Self { segmenter }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.segmenter.is_some()
    }
}

impl std::fmt::Debug for NeuralTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeuralTier")
            .field("segmenter", &self.segmenter.as_ref().map(|s| s.name()))
            .finish()
    }
}

impl SegmentationStrategy for NeuralTier {
    fn tier(&self) -> SegmentationTier {
        SegmentationTier::Neural
    }

    fn try_run(&self, image: &RgbImage) -> Result<Mask> {
        let Some(segmenter) = &self.segmenter else {
            return Err(RetouchError::tier(
                SegmentationTier::Neural,
                "no segmentation model configured",
            ));
        };
        let (w, h) = image.dimensions();
        let output = segmenter
            .segment(image)
            .map_err(|e| RetouchError::tier(SegmentationTier::Neural, e.to_string()))?;
        output_to_mask(output, w, h)
    }
}

/// Convert a model output into a mask of the given size
pub fn output_to_mask(output: SegmenterOutput, width: u32, height: u32) -> Result<Mask> {
    let mask = match output {
        SegmenterOutput::Probability(mask) => mask,
        SegmenterOutput::Cutout(cutout) => ImagePreprocessor::alpha_to_mask(&cutout),
        SegmenterOutput::Opaque(rgb) => {
            let (w, h) = rgb.dimensions();
            Mask::from_fn(w, h, |x, y| {
                let p = rgb.get_pixel(x, y).0;
                let l = luma(f32::from(p[0]), f32::from(p[1]), f32::from(p[2]));
                if l.round() > OPAQUE_FOREGROUND_THRESHOLD {
                    1.0
                } else {
                    0.0
                }
            })
        },
    };

    if mask.width() == 0 || mask.height() == 0 {
        return Err(RetouchError::tier(
            SegmentationTier::Neural,
            "model returned an empty mask",
        ));
    }
    if mask.dimensions() == (width, height) {
        Ok(mask)
    } else {
        Ok(Mask::from_buffer(imageops::resize(
            mask.buffer(),
            width,
            height,
            imageops::FilterType::Triangle,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockNeuralSegmenter;
    use image::{Rgb, Rgba};

    #[test]
    fn test_without_model_is_unavailable() {
        let tier = NeuralTier::default();
        assert!(!tier.is_available());
        let err = tier.try_run(&RgbImage::new(4, 4)).unwrap_err();
        assert!(err.is_tier_failure());
    }

    #[test]
    fn test_opaque_output_thresholded() {
        let mut rgb = RgbImage::from_pixel(3, 1, Rgb([0, 0, 0]));
        rgb.put_pixel(1, 0, Rgb([11, 11, 11]));
        rgb.put_pixel(2, 0, Rgb([10, 10, 10]));
        let mask = output_to_mask(SegmenterOutput::Opaque(rgb), 3, 1).unwrap();
        assert_eq!(mask.as_raw(), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_cutout_alpha_carried_through() {
        let cutout = RgbaImage::from_pixel(2, 2, Rgba([5, 5, 5, 51]));
        let mask = output_to_mask(SegmenterOutput::Cutout(cutout), 2, 2).unwrap();
        assert!((mask.get(1, 1) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_output_resized_to_input() {
        let mask = output_to_mask(SegmenterOutput::Probability(Mask::whole(8, 8)), 20, 12).unwrap();
        assert_eq!(mask.dimensions(), (20, 12));
    }

    #[test]
    fn test_model_failure_becomes_tier_failure() {
        let tier = NeuralTier::new(Some(Arc::new(MockNeuralSegmenter::failing())));
        let err = tier.try_run(&RgbImage::new(8, 8)).unwrap_err();
        assert!(err.is_tier_failure());
    }
}
