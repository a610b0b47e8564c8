//! Adaptive beauty pipeline
//!
//! A linear state machine:
//!
//! ```text
//! Detect -> Smooth -> Whiten -> EnhanceEyes -> EnhanceLips -> ColorHarmony -> DetailEnhance -> Done
//! ```
//!
//! Stages with a zero strength, or whose regions were not found, are skipped
//! and the machine moves on. When the detector finds no face every regional
//! stage runs over the whole frame instead (degraded mode). The two finishing
//! passes run only if at least one strength is non-zero, so an all-zero
//! parameter set returns the input unchanged.

pub mod stages;

use crate::color::{to_float, to_rgb8};
use crate::config::BeautyParams;
use crate::detection::RegionDetector;
use crate::error::{RetouchError, Result};
use crate::types::{FaceRegion, Region};
use crate::utils::ImageValidator;
use image::{Rgb32FImage, RgbImage};
use instant::Instant;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, span, Level};

/// Pipeline states in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeautyStage {
    Detect,
    Smooth,
    Whiten,
    EnhanceEyes,
    EnhanceLips,
    ColorHarmony,
    DetailEnhance,
    Done,
}

impl BeautyStage {
    /// The state that follows this one; `Done` is terminal
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Detect => Self::Smooth,
            Self::Smooth => Self::Whiten,
            Self::Whiten => Self::EnhanceEyes,
            Self::EnhanceEyes => Self::EnhanceLips,
            Self::EnhanceLips => Self::ColorHarmony,
            Self::ColorHarmony => Self::DetailEnhance,
            Self::DetailEnhance | Self::Done => Self::Done,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Detect => "detect",
            Self::Smooth => "smooth",
            Self::Whiten => "whiten",
            Self::EnhanceEyes => "enhance_eyes",
            Self::EnhanceLips => "enhance_lips",
            Self::ColorHarmony => "color_harmony",
            Self::DetailEnhance => "detail_enhance",
            Self::Done => "done",
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Detect => "Locating faces, eyes and mouths",
            Self::Smooth => "Smoothing skin",
            Self::Whiten => "Whitening skin",
            Self::EnhanceEyes => "Enhancing eyes",
            Self::EnhanceLips => "Enhancing lips",
            Self::ColorHarmony => "Harmonizing colours",
            Self::DetailEnhance => "Enhancing detail",
            Self::Done => "Beauty pipeline finished",
        }
    }
}

impl std::fmt::Display for BeautyStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What the pipeline produced and how it got there
#[derive(Debug, Clone)]
pub struct BeautyOutcome {
    pub image: RgbImage,
    pub faces: Vec<FaceRegion>,
    /// No face was found and the whole-frame variants ran
    pub degraded: bool,
    pub executed: Vec<BeautyStage>,
    pub skipped: Vec<BeautyStage>,
    /// Time spent in the detector
    pub detection_ms: u64,
}

/// Runs the beauty state machine with an injected detector
pub struct BeautyPipeline<'a> {
    detector: &'a dyn RegionDetector,
}

impl<'a> BeautyPipeline<'a> {
    #[must_use]
    pub fn new(detector: &'a dyn RegionDetector) -> Self {
        Self { detector }
    }

    /// Apply every stage to `image`
    ///
    /// # Errors
    /// - Input validation failures (zero-size image)
    /// - `RetouchError::Processing` naming the stage that produced invalid output
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn apply(&self, image: &RgbImage, params: &BeautyParams) -> Result<BeautyOutcome> {
        ImageValidator::validate_rgb(image)?;
        params.validate()?;

        let mut outcome = BeautyOutcome {
            image: image.clone(),
            faces: Vec::new(),
            degraded: false,
            executed: Vec::new(),
            skipped: Vec::new(),
            detection_ms: 0,
        };

        if params.is_identity() {
            debug!("all strengths are zero, returning input unchanged");
            outcome.skipped = all_stages();
            return Ok(outcome);
        }

        let start = Instant::now();
        let mut work = to_float(image);
        let mut stage = BeautyStage::Detect;

        while stage != BeautyStage::Done {
            let _span = span!(Level::DEBUG, "beauty_stage", stage = stage.name()).entered();
            let ran = self.run_stage(stage, &mut work, &mut outcome, params)?;
            if ran {
                ensure_finite(&work, stage)?;
                debug!(stage = stage.name(), "{}", stage.description());
                outcome.executed.push(stage);
            } else {
                debug!(stage = stage.name(), "stage skipped");
                outcome.skipped.push(stage);
            }
            stage = stage.next();
        }

        outcome.image = to_rgb8(&work);
        info!(
            faces = outcome.faces.len(),
            degraded = outcome.degraded,
            executed = outcome.executed.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "beauty pipeline finished"
        );
        Ok(outcome)
    }

    /// Execute one state; returns whether it did any work
    fn run_stage(
        &self,
        stage: BeautyStage,
        work: &mut Rgb32FImage,
        outcome: &mut BeautyOutcome,
        params: &BeautyParams,
    ) -> Result<bool> {
        if stage == BeautyStage::Detect {
            let detect_start = Instant::now();
            let bounds = work.dimensions();
            let detected = self.detector.detect(&to_rgb8(work));
            let reported = detected.len();
            outcome.faces = detected.iter().filter_map(|f| f.clip_to(bounds)).collect();
            if outcome.faces.len() < reported {
                debug!(
                    dropped = reported - outcome.faces.len(),
                    "faces outside the frame ignored"
                );
            }
            outcome.detection_ms = detect_start.elapsed().as_millis() as u64;
            outcome.degraded = outcome.faces.is_empty();
            if outcome.degraded {
                info!(detector = self.detector.name(), "no face detected, using whole-image mode");
            }
            return Ok(true);
        }

        let faces = &outcome.faces;
        let degraded = outcome.degraded;
        let next = match stage {
            BeautyStage::Smooth if params.smoothing > 0.0 => Some(if degraded {
                stages::smooth_whole(work, params.smoothing)
            } else {
                stages::smooth_faces(work, faces, params.smoothing)
            }),
            BeautyStage::Whiten if params.whitening > 0.0 => Some(if degraded {
                stages::whiten_whole(work, params.whitening)
            } else {
                stages::whiten_faces(work, faces, params.whitening)
            }),
            BeautyStage::EnhanceEyes if params.eye_enhancement > 0.0 => {
                if degraded {
                    Some(stages::enhance_eyes_whole(work, params.eye_enhancement))
                } else {
                    let eyes = collect(faces, |f| &f.eyes);
                    (!eyes.is_empty()).then(|| stages::enhance_eyes(work, &eyes, params.eye_enhancement))
                }
            },
            BeautyStage::EnhanceLips if params.lip_enhancement > 0.0 => {
                if degraded {
                    Some(stages::enhance_lips_whole(work, params.lip_enhancement))
                } else {
                    let mouths = collect(faces, |f| &f.mouths);
                    (!mouths.is_empty()).then(|| stages::enhance_lips(work, &mouths, params.lip_enhancement))
                }
            },
            BeautyStage::ColorHarmony => Some(stages::color_harmony(work)),
            BeautyStage::DetailEnhance => Some(stages::detail_enhance(work)),
            _ => None,
        };

        match next {
            Some(buffer) => {
                *work = buffer;
                Ok(true)
            },
            None => Ok(false),
        }
    }
}

fn collect<F>(faces: &[FaceRegion], pick: F) -> Vec<Region>
where
    F: Fn(&FaceRegion) -> &Vec<Region>,
{
    faces.iter().flat_map(|f| pick(f).iter().copied()).collect()
}

fn all_stages() -> Vec<BeautyStage> {
    let mut stages = Vec::new();
    let mut stage = BeautyStage::Detect;
    while stage != BeautyStage::Done {
        stages.push(stage);
        stage = stage.next();
    }
    stages
}

fn ensure_finite(image: &Rgb32FImage, stage: BeautyStage) -> Result<()> {
    if image.pixels().all(|p| p.0.iter().all(|c| c.is_finite())) {
        Ok(())
    } else {
        Err(RetouchError::processing_stage(
            stage.name(),
            "stage produced non-finite pixel values",
        ))
    }
}

/// Run the pipeline once and return only the image
pub fn apply_beauty(image: &RgbImage, params: &BeautyParams, detector: &dyn RegionDetector) -> Result<RgbImage> {
    BeautyPipeline::new(detector).apply(image, params).map(|o| o.image)
}
