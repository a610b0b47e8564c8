//! Face, eye and mouth region detection
//!
//! Detection runs on a luminance copy of the input. Finding no face is a
//! normal outcome and yields an empty list.
//!
//! Cascades are the XML files shipped with OpenCV (`haarcascade_*.xml`) or
//! the JSON form of [`HaarCascade`].

pub mod cascade;
mod xml;

pub use cascade::{HaarCascade, HaarFeature, HaarRect, ScanParams, Stage, TreeNode, WeakClassifier};

use crate::color::to_gray;
use crate::config::DetectorConfig;
use crate::types::{FaceRegion, Region};
use image::{imageops, GrayImage, RgbImage};
use log::warn;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Locates faces and the eyes and mouths inside them
pub trait RegionDetector: Send + Sync {
    /// Detected faces in no particular order
    fn detect(&self, image: &RgbImage) -> Vec<FaceRegion>;

    /// Short name for logs
    fn name(&self) -> &'static str {
        "region-detector"
    }
}

/// Detector backed by three Haar cascades
///
/// Any cascade may be absent: without a face cascade nothing is detected,
/// without eye or mouth cascades faces come back with no features.
#[derive(Debug, Clone, Default)]
pub struct CascadeRegionDetector {
    face: Option<HaarCascade>,
    eyes: Option<HaarCascade>,
    mouth: Option<HaarCascade>,
    config: DetectorConfig,
}

impl CascadeRegionDetector {
    #[must_use]
    pub fn new(
        face: Option<HaarCascade>,
        eyes: Option<HaarCascade>,
        mouth: Option<HaarCascade>,
        config: DetectorConfig,
    ) -> Self {
        Self {
            face,
            eyes,
            mouth,
            config,
        }
    }

    /// Load the cascades named in `config`, warning about the ones that fail
    #[must_use]
    pub fn from_config(config: &DetectorConfig) -> Self {
        let load = |path: Option<&Path>, what: &str| -> Option<HaarCascade> {
            let path = path?;
            match HaarCascade::from_file(path) {
                Ok(cascade) => Some(cascade),
                Err(e) => {
                    warn!("⚠️ Could not load {} cascade {}: {}", what, path.display(), e);
                    None
                },
            }
        };

        let face = load(config.face_cascade.as_deref(), "face");
        if face.is_none() {
            warn!("⚠️ No face cascade available, beauty operations will run in whole-image mode");
        }
        Self {
            face,
            eyes: load(config.eye_cascade.as_deref(), "eye"),
            mouth: load(config.mouth_cascade.as_deref(), "mouth"),
            config: config.clone(),
        }
    }

    #[must_use]
    pub fn has_face_cascade(&self) -> bool {
        self.face.is_some()
    }

    fn scan(&self, cascade: &HaarCascade, gray: &GrayImage, area: Region, min_neighbors: usize, min_size: u32) -> Vec<Region> {
        let patch = imageops::crop_imm(gray, area.x, area.y, area.width, area.height).to_image();
        let params = ScanParams {
            scale_factor: self.config.scale_factor,
            min_neighbors,
            min_size,
        };
        cascade
            .detect(&patch, params)
            .into_iter()
            .map(|r| area.offset(r))
            .filter_map(|r| {
                // Keep children strictly inside the search area
                Region::clipped(
                    i64::from(r.x),
                    i64::from(r.y),
                    i64::from(r.width),
                    i64::from(r.height),
                    (area.right(), area.bottom()),
                )
            })
            .filter(|r| area.contains(r))
            .collect()
    }
}

/// Detector for `config`: OpenCV's classifier when the `opencv` feature is
/// enabled and can load the face cascade, the built-in evaluator otherwise
#[must_use]
pub fn detector_from_config(config: &DetectorConfig) -> Arc<dyn RegionDetector> {
    opencv_detector(config).unwrap_or_else(|| Arc::new(CascadeRegionDetector::from_config(config)))
}

#[cfg(feature = "opencv")]
fn opencv_detector(config: &DetectorConfig) -> Option<Arc<dyn RegionDetector>> {
    config.face_cascade.as_ref()?;
    match crate::backends::OpenCvRegionDetector::from_config(config) {
        Ok(detector) => Some(Arc::new(detector)),
        Err(e) => {
            warn!("⚠️ OpenCV detector unavailable, using built-in cascades: {}", e);
            None
        },
    }
}

#[cfg(not(feature = "opencv"))]
fn opencv_detector(_config: &DetectorConfig) -> Option<Arc<dyn RegionDetector>> {
    None
}

impl RegionDetector for CascadeRegionDetector {
    fn detect(&self, image: &RgbImage) -> Vec<FaceRegion> {
        let Some(face_cascade) = &self.face else {
            return Vec::new();
        };
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Vec::new();
        }
        let gray = to_gray(image);

        let faces = self.scan(
            face_cascade,
            &gray,
            Region::full(w, h),
            self.config.face_min_neighbors,
            self.config.min_face_size,
        );
        debug!(faces = faces.len(), "face scan finished");

        faces
            .into_iter()
            .map(|face| {
                let mut region = FaceRegion::new(face);
                if let Some(eyes) = &self.eyes {
                    region.eyes = self.scan(eyes, &gray, face, self.config.feature_min_neighbors, 1);
                }
                if let Some(mouth) = &self.mouth {
                    region.mouths = self.scan(mouth, &gray, face.lower_half(), self.config.feature_min_neighbors, 1);
                }
                debug!(
                    face = %face,
                    eyes = region.eyes.len(),
                    mouths = region.mouths.len(),
                    "face features located"
                );
                region
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "haar-cascade"
    }
}
