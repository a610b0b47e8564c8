//! Tract backend for the neural segmentation tier
//!
//! Runs a salient-object ONNX model (U²-Net style: one RGB input, first
//! output a single-channel saliency map) through tract, a pure Rust
//! inference library with no native dependencies.

use crate::error::{RetouchError, Result};
use crate::segmentation::{NeuralSegmenter, SegmenterOutput};
use crate::utils::{ImagePreprocessor, NormalizationConfig};
use image::RgbImage;
use instant::Instant;
use std::path::Path;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX segmentation model executed with tract
pub struct TractSegmenter {
    model: TractModel,
    normalization: NormalizationConfig,
}

impl std::fmt::Debug for TractSegmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TractSegmenter")
            .field("normalization", &self.normalization)
            .finish_non_exhaustive()
    }
}

impl TractSegmenter {
    /// Load and optimize a model expecting a `[1, 3, size, size]` input
    pub fn from_path<P: AsRef<Path>>(path: P, input_size: u32) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RetouchError::model(format!(
                "Segmentation model not found: {}",
                path.display()
            )));
        }
        if input_size == 0 {
            return Err(RetouchError::invalid_config("Model input size must be positive"));
        }
        let load_start = Instant::now();
        let side = input_size as usize;

        log::info!("🚀 Loading segmentation model");
        log::info!("🧠 Model: {}", path.display());
        log::info!("📦 Backend: Tract (Pure Rust)");

        let model = onnx()
            .model_for_path(path)
            .map_err(|e| RetouchError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([1, 3, side, side]).into())
            .map_err(|e| RetouchError::model(format!("Failed to set model input shape: {e}")))?
            .into_optimized()
            .map_err(|e| RetouchError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| RetouchError::model(format!("Failed to create runnable model: {e}")))?;

        log::info!(
            "✅ Tract model ready in {}ms",
            load_start.elapsed().as_millis()
        );

        Ok(Self {
            model,
            normalization: NormalizationConfig::imagenet(input_size),
        })
    }

    #[must_use]
    pub fn input_size(&self) -> u32 {
        self.normalization.target_size
    }
}

impl NeuralSegmenter for TractSegmenter {
    fn segment(&self, image: &RgbImage) -> Result<SegmenterOutput> {
        let (width, height) = image.dimensions();
        let input = ImagePreprocessor::to_tensor(image, &self.normalization)?;

        log::debug!("🔮 Running Tract inference");
        log::debug!("  - Input tensor: {:?}", input.shape());
        let inference_start = Instant::now();

        let outputs = self
            .model
            .run(tvec![Tensor::from(input).into()])
            .map_err(|e| RetouchError::model(format!("Tract inference failed: {e}")))?;

        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| RetouchError::model("No output tensor found"))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| RetouchError::model(format!("Failed to read output tensor: {e}")))?;

        let shape = view.shape();
        if shape.len() < 2 {
            return Err(RetouchError::model(format!(
                "Expected at least a 2D output tensor, got {}D",
                shape.len()
            )));
        }
        let plane_height = shape[shape.len() - 2];
        let plane_width = shape[shape.len() - 1];
        let values: Vec<f32> = view.iter().copied().collect();

        log::debug!(
            "✅ Tract inference completed in {}ms, output {:?}",
            inference_start.elapsed().as_millis(),
            shape
        );

        let mask = ImagePreprocessor::plane_to_mask(&values, plane_width, plane_height, width, height)?;
        Ok(SegmenterOutput::Probability(mask))
    }

    fn name(&self) -> &'static str {
        "tract-onnx"
    }
}
