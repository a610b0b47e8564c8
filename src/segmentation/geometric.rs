//! Last-resort tier: a centred ellipse standing in for the subject

use super::SegmentationStrategy;
use crate::error::{RetouchError, Result};
use crate::mask::Mask;
use crate::types::SegmentationTier;
use image::RgbImage;

#[derive(Debug, Clone, Copy, Default)]
pub struct GeometricTier;

impl GeometricTier {
    /// Semi-axes of the fallback ellipse for a frame
    #[must_use]
    pub fn axes(width: u32, height: u32) -> (u32, u32) {
        (width / 6, height / 4)
    }

    /// Centre of the fallback ellipse for a frame
    #[must_use]
    pub fn center(width: u32, height: u32) -> (u32, u32) {
        (width / 2, height / 2)
    }
}

impl SegmentationStrategy for GeometricTier {
    fn tier(&self) -> SegmentationTier {
        SegmentationTier::GeometricFallback
    }

    fn try_run(&self, image: &RgbImage) -> Result<Mask> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(RetouchError::tier(
                SegmentationTier::GeometricFallback,
                "image has zero size",
            ));
        }
        let (cx, cy) = Self::center(w, h);
        let (ax, ay) = Self::axes(w, h);
        let mut mask = Mask::new(w, h);
        mask.paint_ellipse((cx as i32, cy as i32), (ax.max(1) as i32, ay.max(1) as i32), 1.0);
        Ok(mask)
    }
}
