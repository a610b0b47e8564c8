//! Request-scoped orchestration of retouching operations
//!
//! [`RetouchProcessor`] owns immutable configuration plus `Arc`-shared
//! collaborators, so a single instance (or cheap clones of it) can serve
//! requests from many threads at once.

use crate::{
    adjust,
    beauty::BeautyPipeline,
    compositing::{self, DEFAULT_BLUR_RADIUS},
    config::{
        BackgroundColor, BeautyParams, ColorAdjustments, FilterKind, IdPhotoParams, ParameterScale,
        RepairKind, RetouchConfig, SegmentationConfig,
    },
    detection::{detector_from_config, RegionDetector},
    error::{RetouchError, Result},
    id_photo,
    repair::{self, DEFAULT_REPAIR_STRENGTH},
    segmentation::{NeuralSegmenter, SegmentationCascade},
    services::{ImageIOService, ProcessingStage, ProgressTracker},
    types::{ProcessingMetadata, RetouchResult},
    utils::ImageValidator,
};
use image::{DynamicImage, RgbImage};
use instant::Instant;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

/// Default intensity for tone filter presets
pub const DEFAULT_FILTER_INTENSITY: f32 = 0.8;

fn default_filter_intensity() -> f32 {
    DEFAULT_FILTER_INTENSITY
}

fn default_blur_radius() -> u32 {
    DEFAULT_BLUR_RADIUS
}

fn default_repair_strength() -> f32 {
    DEFAULT_REPAIR_STRENGTH
}

/// A retouching operation together with its parameters
///
/// ```rust
/// use photo_retouch::Operation;
///
/// let op: Operation = serde_json::from_str(r#"{"operation":"filter","kind":"sepia"}"#).unwrap();
/// assert_eq!(op.name(), "filter");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "kebab-case")]
pub enum Operation {
    /// Face-aware beauty pipeline
    Beauty(BeautyParams),
    /// Tone filter preset mixed with the source
    Filter {
        kind: FilterKind,
        #[serde(default = "default_filter_intensity")]
        intensity: f32,
    },
    /// Global colour adjustment
    Adjust(ColorAdjustments),
    /// Cut-out with alpha from the segmentation cascade
    RemoveBackground,
    /// Subject over a flat colour
    ReplaceBackground {
        #[serde(default)]
        color: BackgroundColor,
    },
    /// Whole-frame Gaussian blur with radius in pixels
    BlurBackground {
        #[serde(default = "default_blur_radius")]
        radius: u32,
    },
    /// Noise and scratch repair
    Repair {
        #[serde(default)]
        kind: RepairKind,
        #[serde(default = "default_repair_strength")]
        strength: f32,
    },
    /// Standard-size ID photo on a flat background
    IdPhoto(IdPhotoParams),
}

impl Operation {
    /// Stable name used in metadata, output file names and logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Beauty(_) => "beauty",
            Self::Filter { .. } => "filter",
            Self::Adjust(_) => "adjust",
            Self::RemoveBackground => "remove-background",
            Self::ReplaceBackground { .. } => "replace-background",
            Self::BlurBackground { .. } => "blur-background",
            Self::Repair { .. } => "repair",
            Self::IdPhoto(_) => "id-photo",
        }
    }

    /// Whether the operation runs the segmentation cascade
    #[must_use]
    pub fn needs_segmentation(&self) -> bool {
        matches!(
            self,
            Self::RemoveBackground | Self::ReplaceBackground { .. } | Self::IdPhoto(_)
        )
    }

    /// Convert strength parameters given in `scale` to the canonical `[0, 1]` range
    ///
    /// Hue, gamma and blur radius are absolute units and pass through.
    pub fn normalized(&self, scale: ParameterScale) -> Result<Self> {
        if scale == ParameterScale::Unit {
            return Ok(self.clone());
        }
        Ok(match self {
            Self::Beauty(p) => Self::Beauty(BeautyParams::from_scaled(
                scale,
                p.smoothing,
                p.whitening,
                p.eye_enhancement,
                p.lip_enhancement,
            )?),
            Self::Filter { kind, intensity } => Self::Filter {
                kind: *kind,
                intensity: scale.normalize(*intensity, "intensity")?,
            },
            Self::Adjust(a) => Self::Adjust(ColorAdjustments::from_scaled(
                scale,
                a.brightness,
                a.contrast,
                a.saturation,
                a.hue,
                a.gamma,
            )?),
            Self::Repair { kind, strength } => Self::Repair {
                kind: *kind,
                strength: scale.normalize(*strength, "strength")?,
            },
            Self::IdPhoto(p) => Self::IdPhoto(IdPhotoParams {
                beauty_strength: scale.normalize(p.beauty_strength, "beauty_strength")?,
                ..*p
            }),
            other => other.clone(),
        })
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Entry point for running operations on images
#[derive(Clone)]
pub struct RetouchProcessor {
    config: RetouchConfig,
    detector: Arc<dyn RegionDetector>,
    segmenter: Option<Arc<dyn NeuralSegmenter>>,
    cascade: Arc<SegmentationCascade>,
}

impl std::fmt::Debug for RetouchProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetouchProcessor")
            .field("config", &self.config)
            .field("detector", &self.detector.name())
            .field("neural_tier", &self.segmenter.as_ref().map(|s| s.name()))
            .field("tiers", &self.cascade.tiers())
            .finish()
    }
}

impl RetouchProcessor {
    /// Build a processor from configuration
    ///
    /// Loads the Haar cascades named in `config.detector` and, with the
    /// `tract` feature, the segmentation model at `config.segmentation.model_path`.
    /// A model that fails to load leaves the neural tier unavailable.
    ///
    /// # Errors
    /// - `RetouchError::InvalidConfig` when `config` does not validate
    pub fn new(config: RetouchConfig) -> Result<Self> {
        config.validate()?;
        info!("🚀 Initializing retouch processor");
        let detector = detector_from_config(&config.detector);
        let segmenter = load_segmenter(&config.segmentation);
        Self::with_components(config, detector, segmenter)
    }

    /// Build a processor with injected collaborators
    pub fn with_components(
        config: RetouchConfig,
        detector: Arc<dyn RegionDetector>,
        segmenter: Option<Arc<dyn NeuralSegmenter>>,
    ) -> Result<Self> {
        config.validate()?;
        let cascade = Arc::new(SegmentationCascade::standard(
            segmenter.clone(),
            &config.segmentation,
        ));
        debug!(
            "Processor ready: detector={}, tiers={:?}",
            detector.name(),
            cascade.tiers()
        );
        Ok(Self {
            config,
            detector,
            segmenter,
            cascade,
        })
    }

    #[must_use]
    pub fn config(&self) -> &RetouchConfig {
        &self.config
    }

    /// Whether a neural segmenter was configured
    #[must_use]
    pub fn has_neural_tier(&self) -> bool {
        self.segmenter.is_some()
    }

    #[must_use]
    pub fn cascade(&self) -> &SegmentationCascade {
        &self.cascade
    }

    /// Encoder quality for an operation's output
    #[must_use]
    pub fn output_quality(&self, operation: &Operation) -> u8 {
        self.config.quality_for(operation.name())
    }

    /// Run one operation on a decoded image
    ///
    /// # Errors
    /// - `RetouchError::InvalidInput` for zero-sized images
    /// - `RetouchError::InvalidConfig` for out-of-range parameters
    /// - `RetouchError::SegmentationExhausted` when no segmentation tier succeeds
    /// - `RetouchError::Processing` when a stage fails
    pub fn process_image(&self, image: &DynamicImage, operation: &Operation) -> Result<RetouchResult> {
        self.process_image_with_progress(image, operation, &mut ProgressTracker::no_op())
    }

    /// [`Self::process_image`] with stage reporting
    #[instrument(
        skip(self, image, tracker),
        fields(
            operation = %operation,
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    pub fn process_image_with_progress(
        &self,
        image: &DynamicImage,
        operation: &Operation,
        tracker: &mut ProgressTracker,
    ) -> Result<RetouchResult> {
        let total_start = Instant::now();
        let operation = operation.normalized(self.config.parameter_scale)?;
        let rgb = ImageValidator::to_rgb(image)?;
        let mut metadata = ProcessingMetadata::new(operation.name());

        if self.config.debug {
            debug!("Operation parameters: {:?}", operation);
        }

        let output = match &operation {
            Operation::Beauty(params) => {
                tracker.report_stage(ProcessingStage::RegionDetection);
                let processing_start = Instant::now();
                let outcome = BeautyPipeline::new(self.detector.as_ref()).apply(&rgb, params)?;
                metadata.timings.detection_ms = outcome.detection_ms;
                metadata.timings.processing_ms = (processing_start.elapsed().as_millis() as u64)
                    .saturating_sub(outcome.detection_ms);
                metadata.faces_detected = Some(outcome.faces.len());
                metadata.degraded = outcome.degraded;
                metadata.stages = outcome
                    .executed
                    .iter()
                    .map(|s| s.name().to_string())
                    .collect();
                tracker.report_stage(ProcessingStage::Processing);
                DynamicImage::ImageRgb8(outcome.image)
            },
            Operation::RemoveBackground | Operation::ReplaceBackground { .. } => {
                tracker.report_stage(ProcessingStage::Segmentation);
                let segmentation_start = Instant::now();
                let segmentation = self.cascade.segment(&rgb)?;
                metadata.timings.segmentation_ms = segmentation_start.elapsed().as_millis() as u64;
                metadata.segmentation_tier = Some(segmentation.tier);
                metadata.degraded = segmentation.tier != crate::types::SegmentationTier::Neural;

                tracker.report_stage(ProcessingStage::Processing);
                let processing_start = Instant::now();
                let output = match &operation {
                    Operation::ReplaceBackground { color } => DynamicImage::ImageRgb8(
                        compositing::composite_over(&rgb, &segmentation.mask, *color)?,
                    ),
                    _ => DynamicImage::ImageRgba8(compositing::apply_alpha(&rgb, &segmentation.mask)?),
                };
                metadata.timings.processing_ms = processing_start.elapsed().as_millis() as u64;
                metadata.stages = vec!["segment".to_string(), "composite".to_string()];
                output
            },
            Operation::IdPhoto(params) => {
                tracker.report_stage(ProcessingStage::Processing);
                let processing_start = Instant::now();
                let photo = id_photo::generate_id_photo(&rgb, params, &self.cascade)?;
                metadata.timings.processing_ms = processing_start.elapsed().as_millis() as u64;
                metadata.segmentation_tier = Some(photo.tier);
                metadata.stages = ["beauty", "crop", "resize", "replace-background", "finish"]
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                DynamicImage::ImageRgb8(photo.image)
            },
            simple => {
                tracker.report_stage(ProcessingStage::Processing);
                let processing_start = Instant::now();
                let output = self.run_pixel_operation(&rgb, simple)?;
                metadata.timings.processing_ms = processing_start.elapsed().as_millis() as u64;
                metadata.stages = vec![simple.name().to_string()];
                DynamicImage::ImageRgb8(output)
            },
        };

        metadata.timings.total_ms = total_start.elapsed().as_millis() as u64;
        tracker.report_stage(ProcessingStage::Completed);
        info!(
            "✅ {} finished in {}ms ({}x{})",
            operation.name(),
            metadata.timings.total_ms,
            output.width(),
            output.height()
        );
        Ok(RetouchResult::new(output, metadata))
    }

    /// Operations that need neither detection nor segmentation
    fn run_pixel_operation(&self, rgb: &RgbImage, operation: &Operation) -> Result<RgbImage> {
        match operation {
            Operation::Filter { kind, intensity } => adjust::apply_filter(rgb, *kind, *intensity),
            Operation::Adjust(adjustments) => adjust::adjust_color(rgb, adjustments),
            Operation::BlurBackground { radius } => {
                debug!("blur-background blurs the whole frame, the subject included");
                compositing::blur_background(rgb, *radius)
            },
            Operation::Repair { kind, strength } => repair::repair(rgb, *kind, *strength),
            other => Err(RetouchError::internal(format!(
                "{} is not a pixel operation",
                other.name()
            ))),
        }
    }

    /// Load a file and run an operation on it
    pub fn process_file<P: AsRef<Path>>(&self, input_path: P, operation: &Operation) -> Result<RetouchResult> {
        self.process_file_with_progress(input_path, operation, &mut ProgressTracker::no_op())
    }

    /// [`Self::process_file`] with stage reporting
    pub fn process_file_with_progress<P: AsRef<Path>>(
        &self,
        input_path: P,
        operation: &Operation,
        tracker: &mut ProgressTracker,
    ) -> Result<RetouchResult> {
        let input_path = input_path.as_ref();
        tracker.report_stage(ProcessingStage::ImageLoading);
        let decode_start = Instant::now();
        let image = ImageIOService::load_image(input_path).map_err(|e| {
            tracker.report_error(&e.to_string());
            e
        })?;
        let decode_ms = decode_start.elapsed().as_millis() as u64;

        let mut result = self
            .process_image_with_progress(&image, operation, tracker)
            .map_err(|e| {
                tracker.report_error(&e.to_string());
                e
            })?;
        result.metadata.timings.image_decode_ms = decode_ms;
        result.metadata.timings.total_ms += decode_ms;
        result.input_path = Some(input_path.display().to_string());
        Ok(result)
    }

    /// Decode bytes and run an operation on a blocking worker thread
    pub async fn process_bytes(&self, image_bytes: Vec<u8>, operation: Operation) -> Result<RetouchResult> {
        let processor = self.clone();
        tokio::task::spawn_blocking(move || {
            let decode_start = Instant::now();
            let image = ImageIOService::load_from_bytes(&image_bytes)?;
            let decode_ms = decode_start.elapsed().as_millis() as u64;
            let mut result = processor.process_image(&image, &operation)?;
            result.metadata.timings.image_decode_ms = decode_ms;
            result.metadata.timings.total_ms += decode_ms;
            Ok(result)
        })
        .await
        .map_err(|e| RetouchError::internal(format!("Processing task failed: {e}")))?
    }

    /// Read a whole stream, then process it like [`Self::process_bytes`]
    pub async fn process_reader<R: tokio::io::AsyncRead + Unpin>(
        &self,
        mut reader: R,
        operation: Operation,
    ) -> Result<RetouchResult> {
        use tokio::io::AsyncReadExt;

        let mut buffer = Vec::new();
        reader
            .read_to_end(&mut buffer)
            .await
            .map_err(|e| RetouchError::processing_stage("read stream", e.to_string()))?;
        self.process_bytes(buffer, operation).await
    }

    /// Save a result with the configured format and the operation's quality
    pub fn save_result<P: AsRef<Path>>(&self, result: &mut RetouchResult, path: P) -> Result<()> {
        let quality = self.config.quality_for(&result.metadata.operation);
        result.save_timed(path, self.config.output_format, quality)
    }

    /// Save into `dir` under a generated unique name and return that path
    pub fn save_to_dir<P: AsRef<Path>>(
        &self,
        result: &mut RetouchResult,
        dir: P,
    ) -> Result<std::path::PathBuf> {
        let tool = result.metadata.operation.replace('-', "_");
        let path = ImageIOService::output_path(dir, &tool, self.config.output_format);
        self.save_result(result, &path)?;
        Ok(path)
    }
}

#[cfg(feature = "tract")]
fn load_segmenter(config: &SegmentationConfig) -> Option<Arc<dyn NeuralSegmenter>> {
    let path = config.model_path.as_ref()?;
    match crate::backends::TractSegmenter::from_path(path, config.model_input_size) {
        Ok(segmenter) => Some(Arc::new(segmenter)),
        Err(e) => {
            warn!("⚠️ Neural segmentation unavailable: {}", e);
            None
        },
    }
}

#[cfg(not(feature = "tract"))]
fn load_segmenter(config: &SegmentationConfig) -> Option<Arc<dyn NeuralSegmenter>> {
    if let Some(path) = &config.model_path {
        warn!(
            "⚠️ Ignoring segmentation model {}: built without the tract feature",
            path.display()
        );
    }
    None
}
