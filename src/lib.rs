#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Photo Retouch Library
//!
//! Region-aware portrait retouching: face and feature detection
//! with OpenCV-format Haar cascades, a per-region beauty pipeline, three-tier foreground
//! segmentation and the background, tone, repair and ID-photo operations
//! built on top of them.
//!
//! ## Features
//!
//! - **Beauty Pipeline**: Skin smoothing, whitening, eye and lip enhancement blended per region
//! - **Segmentation Cascade**: Neural model (Tract), iterative graph cut, geometric fallback
//! - **Background Operations**: Removal with alpha, flat-colour replacement, whole-frame blur
//! - **Tone and Colour**: Five filter presets plus brightness, contrast, saturation, hue and gamma
//! - **Repair**: Edge-preserving denoise and scratch filling
//! - **ID Photos**: Standard print sizes on a flat background
//! - **Format Support**: JPEG, PNG, WebP, BMP, TIFF input; PNG, JPEG, WebP, TIFF output
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//! - **Async and Sync APIs**: Blocking calls plus tokio wrappers for byte buffers and streams
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use photo_retouch::{retouch_reader, Operation, RetouchConfig};
//! use tokio::fs::File;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RetouchConfig::builder()
//!     .model_path("models/u2netp.onnx")
//!     .build()?;
//!
//! let file = File::open("portrait.jpg").await?;
//! let mut result = retouch_reader(file, Operation::RemoveBackground, &config).await?;
//! result.save_timed("cutout.png", photo_retouch::OutputFormat::Png, 95)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): Neural segmentation tier backed by Tract (pure Rust)
//! - `cli` (default): Command-line interface and tracing setup
//! - `webp-support` (default): WebP image format support
//! - `tracing-json`: JSON log output for the CLI
//! - `opencv`: Detection, GrabCut and CLAHE through a system OpenCV, with the
//!   built-in implementations as fallback
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! photo-retouch = { version = "0.1", default-features = false, features = ["tract"] }
//! ```

pub mod adjust;
pub mod backends;
pub mod beauty;
pub mod blend;
#[cfg(feature = "cli")]
pub mod cli;
pub mod color;
pub mod compositing;
pub mod config;
pub mod detection;
pub mod error;
pub mod filters;
pub mod id_photo;
pub mod mask;
pub mod processor;
pub mod repair;
pub mod segmentation;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

use tokio::io::AsyncRead;

// Public API exports
#[cfg(feature = "tract")]
pub use backends::TractSegmenter;
#[cfg(feature = "opencv")]
pub use backends::OpenCvRegionDetector;
pub use beauty::{apply_beauty, BeautyOutcome, BeautyPipeline, BeautyStage};
pub use config::{
    BackgroundColor, BeautyParams, ColorAdjustments, DetectorConfig, FilterKind, IdPhotoParams,
    OutputFormat, ParameterScale, PhotoSize, RepairKind, RetouchConfig, RetouchConfigBuilder,
    SegmentationConfig,
};
pub use detection::{detector_from_config, CascadeRegionDetector, HaarCascade, RegionDetector};
pub use error::{Result, RetouchError};
pub use mask::Mask;
pub use processor::{Operation, RetouchProcessor};
pub use segmentation::{
    GeometricTier, GraphCutTier, NeuralSegmenter, NeuralTier, SegmentationCascade,
    SegmentationStrategy, SegmenterOutput,
};
pub use services::{
    ConsoleProgressReporter, ImageIOService, NoOpProgressReporter, OutputFormatHandler,
    ProcessingStage, ProgressReporter, ProgressTracker, ProgressUpdate,
};
pub use types::{
    FaceRegion, ProcessingMetadata, ProcessingTimings, Region, RetouchResult,
    SegmentationResult, SegmentationTier,
};
pub use utils::{ImagePreprocessor, ImageValidator, NumericValidator};

#[cfg(feature = "cli")]
pub use tracing_config::{events, init_cli_tracing, spans, TracingConfig, TracingFormat};

/// Run an operation on an already decoded image
///
/// Builds a [`RetouchProcessor`] from `config` for the call. Services that
/// handle many requests should build one processor and share it instead.
///
/// ```rust,no_run
/// use image::DynamicImage;
/// use photo_retouch::{retouch_image, FilterKind, Operation, RetouchConfig};
///
/// # fn example(img: DynamicImage) -> anyhow::Result<()> {
/// let op = Operation::Filter { kind: FilterKind::Sepia, intensity: 0.8 };
/// let result = retouch_image(&img, &op, &RetouchConfig::default())?;
/// result.save("sepia.jpg", photo_retouch::OutputFormat::Jpeg, 95)?;
/// # Ok(())
/// # }
/// ```
pub fn retouch_image(
    image: &image::DynamicImage,
    operation: &Operation,
    config: &RetouchConfig,
) -> Result<RetouchResult> {
    let processor = RetouchProcessor::new(config.clone())?;
    processor.process_image(image, operation)
}

/// Run an operation on encoded image bytes (JPEG, PNG, WebP, BMP, TIFF)
///
/// ```rust,no_run
/// use photo_retouch::{retouch_bytes, BeautyParams, Operation, RetouchConfig};
///
/// # async fn example(upload_bytes: Vec<u8>) -> anyhow::Result<()> {
/// let config = RetouchConfig::default();
/// let result = retouch_bytes(upload_bytes, Operation::Beauty(BeautyParams::default()), &config).await?;
/// let jpeg = result.to_bytes(photo_retouch::OutputFormat::Jpeg, config.beauty_quality)?;
/// # Ok(())
/// # }
/// ```
pub async fn retouch_bytes(
    image_bytes: Vec<u8>,
    operation: Operation,
    config: &RetouchConfig,
) -> Result<RetouchResult> {
    let processor = RetouchProcessor::new(config.clone())?;
    processor.process_bytes(image_bytes, operation).await
}

/// Run an operation on an image read from an async stream
pub async fn retouch_reader<R: AsyncRead + Unpin>(
    reader: R,
    operation: Operation,
    config: &RetouchConfig,
) -> Result<RetouchResult> {
    let processor = RetouchProcessor::new(config.clone())?;
    processor.process_reader(reader, operation).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(12, 10, Rgb([120, 90, 60])));
        ImageIOService::encode(&image, OutputFormat::Png, 100).unwrap()
    }

    #[test]
    fn test_retouch_image_applies_filter() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([200, 100, 50])));
        let op = Operation::Filter {
            kind: FilterKind::BlackWhite,
            intensity: 1.0,
        };
        let result = retouch_image(&image, &op, &RetouchConfig::default()).unwrap();
        let rgb = result.image.to_rgb8();
        let [r, g, b] = rgb.get_pixel(3, 3).0;
        assert!(r.abs_diff(g) <= 1 && g.abs_diff(b) <= 1);
    }

    #[tokio::test]
    async fn test_retouch_bytes_and_reader() {
        let config = RetouchConfig::default();
        let op = Operation::Adjust(ColorAdjustments::default());

        let from_bytes = retouch_bytes(png_bytes(), op.clone(), &config).await.unwrap();
        assert_eq!(from_bytes.dimensions(), (12, 10));

        let from_reader = retouch_reader(Cursor::new(png_bytes()), op, &config)
            .await
            .unwrap();
        assert_eq!(from_reader.dimensions(), (12, 10));
    }

    #[tokio::test]
    async fn test_retouch_bytes_rejects_garbage() {
        let err = retouch_bytes(vec![1, 2, 3], Operation::RemoveBackground, &RetouchConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RetouchError::InvalidInput(_)));
    }
}
