//! Test utilities and mock collaborators
//!
//! Mock implementations of [`RegionDetector`], [`NeuralSegmenter`] and
//! [`SegmentationStrategy`] so pipelines can be tested without cascade files
//! or model weights.

use crate::{
    detection::RegionDetector,
    error::{RetouchError, Result},
    mask::Mask,
    segmentation::{NeuralSegmenter, SegmentationStrategy, SegmenterOutput},
    types::{FaceRegion, SegmentationTier},
};
use image::RgbImage;
use std::sync::{Arc, Mutex};

/// Mock detector returning a fixed set of faces
#[derive(Debug, Clone, Default)]
pub struct MockRegionDetector {
    faces: Vec<FaceRegion>,
    /// Call history for verification in tests
    call_history: Arc<Mutex<Vec<String>>>,
}

impl MockRegionDetector {
    /// Detector that never finds anything
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_faces(faces: Vec<FaceRegion>) -> Self {
        Self {
            faces,
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Get the call history for verification in tests
    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.get_call_history().len()
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }
}

impl RegionDetector for MockRegionDetector {
    fn detect(&self, image: &RgbImage) -> Vec<FaceRegion> {
        self.record_call(&format!("detect {}x{}", image.width(), image.height()));
        self.faces.clone()
    }

    fn name(&self) -> &'static str {
        "mock-detector"
    }
}

/// Mock segmentation model producing a soft centred disc
#[derive(Debug, Clone, Default)]
pub struct MockNeuralSegmenter {
    /// Whether to simulate inference failure
    should_fail: bool,
    call_history: Arc<Mutex<Vec<String>>>,
}

impl MockNeuralSegmenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Segmenter whose every call fails
    #[must_use]
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_history.lock().unwrap().len()
    }

    /// Mask with a circular pattern and soft edges, like a real model
    #[must_use]
    pub fn disc(width: u32, height: u32) -> Mask {
        let center_x = width as f32 / 2.0;
        let center_y = height as f32 / 2.0;
        let radius = (width.min(height) as f32 / 3.0).max(2.0);
        Mask::from_fn(width, height, |x, y| {
            let dx = x as f32 - center_x;
            let dy = y as f32 - center_y;
            let distance = (dx * dx + dy * dy).sqrt();
            if distance < radius {
                ((radius - distance) / radius * 4.0).min(1.0)
            } else {
                0.0
            }
        })
    }
}

impl NeuralSegmenter for MockNeuralSegmenter {
    fn segment(&self, image: &RgbImage) -> Result<SegmenterOutput> {
        if let Ok(mut history) = self.call_history.lock() {
            history.push("segment".to_string());
        }
        if self.should_fail {
            return Err(RetouchError::model("Mock segmenter inference failed"));
        }
        Ok(SegmenterOutput::Probability(Self::disc(
            image.width(),
            image.height(),
        )))
    }

    fn name(&self) -> &'static str {
        "mock-segmenter"
    }
}

/// Strategy that always fails, for exercising cascade fallback
#[derive(Debug, Clone, Copy)]
pub struct FailingStrategy(pub SegmentationTier);

impl SegmentationStrategy for FailingStrategy {
    fn tier(&self) -> SegmentationTier {
        self.0
    }

    fn try_run(&self, _image: &RgbImage) -> Result<Mask> {
        Err(RetouchError::tier(self.0, "forced failure"))
    }
}

/// Helper functions for creating test images
pub mod test_helpers {
    use crate::types::{FaceRegion, Region};
    use image::{Rgb, RgbImage};

    /// Gradient image with every pixel distinct along each axis
    pub fn create_test_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let r = ((x as f32 / width as f32) * 255.0) as u8;
            let g = ((y as f32 / height as f32) * 255.0) as u8;
            Rgb([r, g, 128])
        })
    }

    /// Skin-toned portrait-ish image with a face region and features
    pub fn create_portrait(width: u32, height: u32) -> (RgbImage, FaceRegion) {
        let image = RgbImage::from_fn(width, height, |x, y| {
            let noise = ((x * 7 + y * 13) % 11) as u8;
            Rgb([190 + noise, 150 + noise / 2, 130])
        });
        let face = Region::new(width / 4, height / 4, width / 2, height / 2);
        let mut region = FaceRegion::new(face);
        let eye_w = face.width / 5;
        let eye_h = face.height / 8;
        region.eyes = vec![
            Region::new(face.x + face.width / 5, face.y + face.height / 4, eye_w, eye_h),
            Region::new(face.x + face.width * 3 / 5, face.y + face.height / 4, eye_w, eye_h),
        ];
        region.mouths = vec![Region::new(
            face.x + face.width / 3,
            face.y + face.height * 3 / 4,
            face.width / 3,
            face.height / 8,
        )];
        (image, region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_detector_records_calls() {
        let detector = MockRegionDetector::empty();
        assert_eq!(detector.call_count(), 0);
        assert!(detector.detect(&RgbImage::new(3, 2)).is_empty());
        assert_eq!(detector.get_call_history(), vec!["detect 3x2".to_string()]);
    }

    #[test]
    fn test_mock_segmenter_modes() {
        let ok = MockNeuralSegmenter::new();
        assert!(ok.segment(&RgbImage::new(30, 30)).is_ok());
        assert_eq!(ok.call_count(), 1);
        assert!(MockNeuralSegmenter::failing().segment(&RgbImage::new(4, 4)).is_err());
    }

    #[test]
    fn test_disc_is_centred() {
        let disc = MockNeuralSegmenter::disc(60, 60);
        assert_eq!(disc.get(30, 30), 1.0);
        assert_eq!(disc.get(0, 0), 0.0);
    }

    #[test]
    fn test_portrait_features_inside_face() {
        let (image, face) = test_helpers::create_portrait(120, 160);
        assert_eq!(image.dimensions(), (120, 160));
        assert!(face.features().all(|f| face.face.contains(f)));
    }
}
