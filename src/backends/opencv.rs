//! OpenCV backend
//!
//! Native counterparts of three built-in algorithms, used when the crate is
//! built with the `opencv` feature: `CascadeClassifier` for region detection,
//! `imgproc::grab_cut` for the graph-cut tier and `imgproc::create_clahe` for
//! lightness equalization. Each caller falls back to the pure Rust version
//! when a call here fails.

use crate::color::to_gray;
use crate::config::DetectorConfig;
use crate::detection::RegionDetector;
use crate::error::{RetouchError, Result};
use crate::mask::Mask;
use crate::types::{FaceRegion, Region};
use image::{imageops, GrayImage, RgbImage};
use log::{info, warn};
use opencv::core::{self, Mat, Rect, Size, Vector, CV_8UC1, CV_8UC3};
use opencv::imgproc;
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

fn cv_error(context: &'static str) -> impl FnOnce(opencv::Error) -> RetouchError {
    move |e| RetouchError::internal(format!("OpenCV {context} failed: {e}"))
}

/// Owned `Mat` holding a copy of `data`, laid out row-major with no padding
fn mat_from_bytes(data: &[u8], width: u32, height: u32, typ: i32) -> Result<Mat> {
    // SAFETY: the borrowed Mat is dropped before `data` and never written;
    // try_clone copies the pixels into OpenCV-owned memory.
    #[allow(unsafe_code)]
    let borrowed = unsafe {
        Mat::new_rows_cols_with_data_unsafe(
            height as i32,
            width as i32,
            typ,
            data.as_ptr() as *mut _,
            core::Mat_AUTO_STEP,
        )
    }
    .map_err(cv_error("wrap pixels"))?;
    borrowed.try_clone().map_err(cv_error("copy pixels"))
}

fn load_classifier(path: &Path) -> Result<CascadeClassifier> {
    let name = path
        .to_str()
        .ok_or_else(|| RetouchError::invalid_config(format!("Cascade path is not UTF-8: {}", path.display())))?;
    let classifier = CascadeClassifier::new(name).map_err(cv_error("load cascade"))?;
    if classifier.empty().map_err(cv_error("inspect cascade"))? {
        return Err(RetouchError::model(format!("OpenCV could not read cascade {}", path.display())));
    }
    Ok(classifier)
}

/// Region detector running OpenCV's `CascadeClassifier`
///
/// `detect_multi_scale` needs exclusive access, so each classifier sits
/// behind a mutex.
pub struct OpenCvRegionDetector {
    face: Mutex<CascadeClassifier>,
    eyes: Option<Mutex<CascadeClassifier>>,
    mouth: Option<Mutex<CascadeClassifier>>,
    config: DetectorConfig,
}

impl std::fmt::Debug for OpenCvRegionDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenCvRegionDetector")
            .field("eyes", &self.eyes.is_some())
            .field("mouth", &self.mouth.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OpenCvRegionDetector {
    /// Load the cascades named in `config`
    ///
    /// # Errors
    /// - `RetouchError::InvalidConfig` when no face cascade is configured
    /// - `RetouchError::Model` when OpenCV cannot read the face cascade
    pub fn from_config(config: &DetectorConfig) -> Result<Self> {
        let face_path = config
            .face_cascade
            .as_deref()
            .ok_or_else(|| RetouchError::invalid_config("OpenCV detection needs a face cascade"))?;
        let face = load_classifier(face_path)?;

        let optional = |path: Option<&Path>, what: &str| {
            let path = path?;
            match load_classifier(path) {
                Ok(classifier) => Some(Mutex::new(classifier)),
                Err(e) => {
                    warn!("⚠️ OpenCV could not load {} cascade {}: {}", what, path.display(), e);
                    None
                },
            }
        };

        info!("📦 Region detection: OpenCV CascadeClassifier");
        Ok(Self {
            face: Mutex::new(face),
            eyes: optional(config.eye_cascade.as_deref(), "eye"),
            mouth: optional(config.mouth_cascade.as_deref(), "mouth"),
            config: config.clone(),
        })
    }

    fn scan(
        &self,
        classifier: &Mutex<CascadeClassifier>,
        gray: &GrayImage,
        area: Region,
        min_neighbors: usize,
        min_size: u32,
    ) -> Result<Vec<Region>> {
        let patch = imageops::crop_imm(gray, area.x, area.y, area.width, area.height).to_image();
        let src = mat_from_bytes(patch.as_raw(), area.width, area.height, CV_8UC1)?;
        let mut found = Vector::<Rect>::new();
        {
            let mut classifier = classifier
                .lock()
                .map_err(|_| RetouchError::internal("cascade classifier lock poisoned"))?;
            classifier
                .detect_multi_scale(
                    &src,
                    &mut found,
                    f64::from(self.config.scale_factor),
                    min_neighbors as i32,
                    0,
                    Size::new(min_size as i32, min_size as i32),
                    Size::new(0, 0),
                )
                .map_err(cv_error("detect_multi_scale"))?;
        }
        Ok(found
            .iter()
            .filter_map(|r| {
                Region::clipped(
                    i64::from(r.x),
                    i64::from(r.y),
                    i64::from(r.width),
                    i64::from(r.height),
                    (area.width, area.height),
                )
            })
            .map(|r| area.offset(r))
            .collect())
    }

    fn scan_or_warn(
        &self,
        classifier: &Mutex<CascadeClassifier>,
        gray: &GrayImage,
        area: Region,
        min_neighbors: usize,
        min_size: u32,
    ) -> Vec<Region> {
        self.scan(classifier, gray, area, min_neighbors, min_size)
            .unwrap_or_else(|e| {
                warn!("⚠️ OpenCV detection failed in {}: {}", area, e);
                Vec::new()
            })
    }
}

impl RegionDetector for OpenCvRegionDetector {
    fn detect(&self, image: &RgbImage) -> Vec<FaceRegion> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Vec::new();
        }
        let gray = to_gray(image);
        let faces = self.scan_or_warn(
            &self.face,
            &gray,
            Region::full(w, h),
            self.config.face_min_neighbors,
            self.config.min_face_size,
        );
        debug!(faces = faces.len(), "opencv face scan finished");

        faces
            .into_iter()
            .map(|face| {
                let mut region = FaceRegion::new(face);
                if let Some(eyes) = &self.eyes {
                    region.eyes = self.scan_or_warn(eyes, &gray, face, self.config.feature_min_neighbors, 1);
                }
                if let Some(mouth) = &self.mouth {
                    region.mouths =
                        self.scan_or_warn(mouth, &gray, face.lower_half(), self.config.feature_min_neighbors, 1);
                }
                region
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "opencv-cascade"
    }
}

/// Rectangle-seeded GrabCut, returning a hard 0/1 foreground mask
///
/// `refine_iterations` re-runs the solver from the first pass's labels and
/// colour models.
pub fn grab_cut(image: &RgbImage, rect: Region, iterations: usize, refine_iterations: usize) -> Result<Mask> {
    let (w, h) = image.dimensions();
    let src = mat_from_bytes(image.as_raw(), w, h, CV_8UC3)?;
    let seed = Rect::new(rect.x as i32, rect.y as i32, rect.width as i32, rect.height as i32);
    let mut labels = Mat::default();
    let mut bgd_model = Mat::default();
    let mut fgd_model = Mat::default();

    imgproc::grab_cut(
        &src,
        &mut labels,
        seed,
        &mut bgd_model,
        &mut fgd_model,
        iterations as i32,
        imgproc::GC_INIT_WITH_RECT,
    )
    .map_err(cv_error("grab_cut"))?;
    if refine_iterations > 0 {
        imgproc::grab_cut(
            &src,
            &mut labels,
            seed,
            &mut bgd_model,
            &mut fgd_model,
            refine_iterations as i32,
            imgproc::GC_EVAL,
        )
        .map_err(cv_error("grab_cut refinement"))?;
    }

    let labels = labels.data_bytes().map_err(cv_error("read grab_cut labels"))?;
    let foreground = |label: u8| i32::from(label) == imgproc::GC_FGD || i32::from(label) == imgproc::GC_PR_FGD;
    Ok(Mask::from_fn(w, h, |x, y| {
        let idx = y as usize * w as usize + x as usize;
        match labels.get(idx) {
            Some(&label) if foreground(label) => 1.0,
            _ => 0.0,
        }
    }))
}

/// CLAHE on a 0-255 plane; values are rounded to 8 bits first
pub fn clahe(plane: &[f32], width: usize, height: usize, clip_limit: f32, tiles: (usize, usize)) -> Result<Vec<f32>> {
    if width == 0 || height == 0 {
        return Ok(plane.to_vec());
    }
    let bytes: Vec<u8> = plane.iter().map(|v| v.round().clamp(0.0, 255.0) as u8).collect();
    let src = mat_from_bytes(&bytes, width as u32, height as u32, CV_8UC1)?;
    let mut equalizer = imgproc::create_clahe(
        f64::from(clip_limit),
        Size::new(tiles.0.max(1) as i32, tiles.1.max(1) as i32),
    )
    .map_err(cv_error("create_clahe"))?;
    let mut dst = Mat::default();
    equalizer.apply(&src, &mut dst).map_err(cv_error("clahe"))?;
    Ok(dst
        .data_bytes()
        .map_err(cv_error("read clahe output"))?
        .iter()
        .map(|&v| f32::from(v))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_grab_cut_separates_subject() {
        let image = RgbImage::from_fn(80, 100, |x, y| {
            let dx = (x as f32 - 40.0) / 16.0;
            let dy = (y as f32 - 50.0) / 25.0;
            if dx * dx + dy * dy <= 1.0 {
                Rgb([200, 60, 40])
            } else {
                Rgb([30, 60, 200])
            }
        });
        let mask = grab_cut(&image, Region::new(16, 18, 48, 70), 5, 1).unwrap();
        assert!(mask.get(40, 50) > 0.5);
        assert!(mask.get(0, 0) < 0.5);
    }

    #[test]
    fn test_clahe_keeps_flat_plane_flat() {
        let plane = vec![100.0f32; 64 * 48];
        let out = clahe(&plane, 64, 48, 2.0, (8, 8)).unwrap();
        assert_eq!(out.len(), plane.len());
        assert!(out.windows(2).all(|p| (p[0] - p[1]).abs() < 1e-6));
    }

    #[test]
    fn test_missing_face_cascade_is_an_error() {
        let config = DetectorConfig {
            face_cascade: Some("/nonexistent/haarcascade_frontalface_default.xml".into()),
            ..DetectorConfig::default()
        };
        assert!(OpenCvRegionDetector::from_config(&config).is_err());
        assert!(OpenCvRegionDetector::from_config(&DetectorConfig::default()).is_err());
    }
}
