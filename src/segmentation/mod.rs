//! Foreground segmentation cascade
//!
//! Strategies are tried in order of decreasing sophistication until one
//! produces a mask:
//!
//! 1. [`NeuralTier`]: injected model
//! 2. [`GraphCutTier`]: rectangle-seeded GrabCut
//! 3. [`GeometricTier`]: centred ellipse
//!
//! Whichever tier wins, its mask goes through the same post-processing.

pub mod geometric;
pub mod graph_cut;
pub mod maxflow;
pub mod neural;

pub use geometric::GeometricTier;
pub use graph_cut::GraphCutTier;
pub use neural::{NeuralSegmenter, NeuralTier, SegmenterOutput};

use crate::config::SegmentationConfig;
use crate::error::{RetouchError, Result};
use crate::filters::morphology::StructuringElement;
use crate::mask::Mask;
use crate::types::{SegmentationResult, SegmentationTier};
use crate::utils::ImageValidator;
use image::RgbImage;
use log::warn;
use std::sync::Arc;
use tracing::{info, instrument};

/// One way of producing a foreground mask
pub trait SegmentationStrategy: Send + Sync {
    fn tier(&self) -> SegmentationTier;

    /// Mask the size of `image`, or a tier failure
    fn try_run(&self, image: &RgbImage) -> Result<Mask>;
}

/// Ordered chain of strategies; the first success wins
pub struct SegmentationCascade {
    strategies: Vec<Box<dyn SegmentationStrategy>>,
}

impl std::fmt::Debug for SegmentationCascade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationCascade")
            .field("tiers", &self.tiers())
            .finish()
    }
}

impl SegmentationCascade {
    #[must_use]
    pub fn new(strategies: Vec<Box<dyn SegmentationStrategy>>) -> Self {
        Self { strategies }
    }

    /// Neural, graph-cut and geometric tiers
    #[must_use]
    pub fn standard(segmenter: Option<Arc<dyn NeuralSegmenter>>, config: &SegmentationConfig) -> Self {
        Self::new(vec![
            Box::new(NeuralTier::new(segmenter)),
            Box::new(GraphCutTier::from_config(config)),
            Box::new(GeometricTier),
        ])
    }

    #[must_use]
    pub fn tiers(&self) -> Vec<SegmentationTier> {
        self.strategies.iter().map(|s| s.tier()).collect()
    }

    /// Run the cascade, logging and skipping failed tiers
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn segment(&self, image: &RgbImage) -> Result<SegmentationResult> {
        ImageValidator::validate_rgb(image)?;
        let (w, h) = image.dimensions();
        let mut failures = Vec::new();

        for strategy in &self.strategies {
            let tier = strategy.tier();
            match strategy.try_run(image) {
                Ok(mask) if mask.dimensions() == (w, h) => {
                    info!(tier = %tier, "segmentation succeeded");
                    return Ok(SegmentationResult {
                        mask: postprocess(&mask),
                        tier,
                    });
                },
                Ok(mask) => {
                    let (mw, mh) = mask.dimensions();
                    warn!("⚠️ Segmentation tier {tier} returned a {mw}x{mh} mask for a {w}x{h} image");
                    failures.push(format!("{tier}: wrong mask size"));
                },
                Err(e) => {
                    warn!("⚠️ Segmentation tier {tier} failed: {e}");
                    failures.push(format!("{tier}: {e}"));
                },
            }
        }

        Err(RetouchError::SegmentationExhausted(if failures.is_empty() {
            "no segmentation strategies configured".to_string()
        } else {
            failures.join("; ")
        }))
    }
}

/// Clean-up applied to every tier's mask: close small holes, soften the edge
#[must_use]
pub fn postprocess(mask: &Mask) -> Mask {
    mask.close(StructuringElement::Cross(1)).gaussian_blur(3, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{FailingStrategy, MockNeuralSegmenter};

    fn cascade_without_neural() -> SegmentationCascade {
        SegmentationCascade::standard(None, &SegmentationConfig::default())
    }

    #[test]
    fn test_standard_tier_order() {
        assert_eq!(
            cascade_without_neural().tiers(),
            vec![
                SegmentationTier::Neural,
                SegmentationTier::GraphCut,
                SegmentationTier::GeometricFallback
            ]
        );
    }

    #[test]
    fn test_neural_tier_used_when_available() {
        let segmenter: Arc<dyn NeuralSegmenter> = Arc::new(MockNeuralSegmenter::new());
        let cascade = SegmentationCascade::standard(Some(segmenter), &SegmentationConfig::default());
        let result = cascade.segment(&RgbImage::new(40, 40)).unwrap();
        assert_eq!(result.tier, SegmentationTier::Neural);
        assert_eq!(result.mask.dimensions(), (40, 40));
    }

    #[test]
    fn test_unavailable_neural_falls_through() {
        let image = crate::backends::test_utils::test_helpers::create_test_image(64, 64);
        let result = cascade_without_neural().segment(&image).unwrap();
        assert!(matches!(
            result.tier,
            SegmentationTier::GraphCut | SegmentationTier::GeometricFallback
        ));
    }

    #[test]
    fn test_geometric_fallback_alpha_outside_ellipse() {
        let cascade = SegmentationCascade::new(vec![
            Box::new(FailingStrategy(SegmentationTier::Neural)),
            Box::new(FailingStrategy(SegmentationTier::GraphCut)),
            Box::new(GeometricTier),
        ]);
        let result = cascade.segment(&RgbImage::new(200, 200)).unwrap();
        assert_eq!(result.tier, SegmentationTier::GeometricFallback);

        let (ax, ay) = GeometricTier::axes(200, 200);
        // Post-processing may soften the rim by a pixel
        let (ax, ay) = (ax as f32 + 2.0, ay as f32 + 2.0);
        for (x, y, p) in result.mask.to_gray().enumerate_pixels() {
            let dx = (x as f32 - 100.0) / ax;
            let dy = (y as f32 - 100.0) / ay;
            if dx * dx + dy * dy > 1.0 {
                assert_eq!(p.0[0], 0, "alpha at ({x}, {y})");
            }
        }
        assert_eq!(result.mask.to_gray().get_pixel(100, 100).0[0], 255);
    }

    #[test]
    fn test_all_tiers_failing_is_exhausted() {
        let cascade = SegmentationCascade::new(vec![
            Box::new(FailingStrategy(SegmentationTier::Neural)),
            Box::new(FailingStrategy(SegmentationTier::GraphCut)),
        ]);
        let err = cascade.segment(&RgbImage::new(10, 10)).unwrap_err();
        assert!(matches!(err, RetouchError::SegmentationExhausted(_)));
        assert!(err.to_string().contains("graph-cut"));
    }

    #[test]
    fn test_zero_size_rejected_before_tiers() {
        let err = cascade_without_neural().segment(&RgbImage::new(0, 0)).unwrap_err();
        assert!(matches!(err, RetouchError::InvalidInput(_)));
    }

    #[test]
    fn test_postprocess_fills_pinholes() {
        let mut mask = Mask::whole(9, 9);
        mask.set(4, 4, 0.0);
        let cleaned = postprocess(&mask);
        assert!(cleaned.get(4, 4) > 0.99);
    }
}
