//! Shared utilities: parameter validation and model input preparation

pub mod preprocessing;
pub mod validation;

pub use preprocessing::{ImagePreprocessor, NormalizationConfig};
pub use validation::{ImageValidator, NumericValidator};
