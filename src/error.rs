//! Error types for retouching operations

use crate::types::SegmentationTier;
use thiserror::Error;

/// Result type alias for retouching operations
pub type Result<T> = std::result::Result<T, RetouchError>;

/// Error types for retouching operations
#[derive(Error, Debug)]
pub enum RetouchError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode/encode errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Unusable source buffer: zero-sized, corrupt or unsupported layout
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A single segmentation tier could not produce a mask
    #[error("Segmentation tier '{tier}' failed: {reason}")]
    SegmentationTier {
        tier: SegmentationTier,
        reason: String,
    },

    /// Every segmentation tier failed
    #[error("All segmentation tiers failed: {0}")]
    SegmentationExhausted(String),

    /// A pipeline stage failed on malformed input
    #[error("Processing failed at stage '{stage}': {message}")]
    Processing { stage: String, message: String },

    /// Segmentation model loading or inference errors
    #[error("Model error: {0}")]
    Model(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RetouchError {
    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a tier failure for the segmentation cascade
    pub fn tier<S: Into<String>>(tier: SegmentationTier, reason: S) -> Self {
        Self::SegmentationTier {
            tier,
            reason: reason.into(),
        }
    }

    /// Create processing error with stage context
    pub fn processing_stage<S: Into<String>>(stage: &str, message: S) -> Self {
        Self::Processing {
            stage: stage.to_string(),
            message: message.into(),
        }
    }

    /// Wrap an arbitrary error as a stage failure, keeping the stage name
    #[must_use]
    pub fn at_stage(self, stage: &str) -> Self {
        match self {
            already @ Self::Processing { .. } => already,
            other => Self::processing_stage(stage, other.to_string()),
        }
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Whether this error was raised by a single segmentation tier
    #[must_use]
    pub fn is_tier_failure(&self) -> bool {
        matches!(self, Self::SegmentationTier { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = RetouchError::invalid_config("test config error");
        assert!(matches!(err, RetouchError::InvalidConfig(_)));

        let err = RetouchError::invalid_input("zero-sized image");
        assert!(matches!(err, RetouchError::InvalidInput(_)));

        let err = RetouchError::tier(SegmentationTier::GraphCut, "empty foreground");
        assert!(err.is_tier_failure());
    }

    #[test]
    fn test_error_display() {
        let err = RetouchError::invalid_config("bad colour");
        assert_eq!(err.to_string(), "Invalid configuration: bad colour");

        let err = RetouchError::tier(SegmentationTier::Neural, "no segmenter");
        assert_eq!(
            err.to_string(),
            "Segmentation tier 'neural' failed: no segmenter"
        );
    }

    #[test]
    fn test_stage_context() {
        let err = RetouchError::processing_stage("smooth", "kernel larger than image");
        let error_string = err.to_string();
        assert!(error_string.contains("smooth"));
        assert!(error_string.contains("kernel larger than image"));

        // Wrapping keeps the innermost stage
        let wrapped = err.at_stage("beauty");
        assert!(wrapped.to_string().contains("'smooth'"));

        let wrapped = RetouchError::internal("boom").at_stage("whiten");
        match wrapped {
            RetouchError::Processing { stage, message } => {
                assert_eq!(stage, "whiten");
                assert!(message.contains("boom"));
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_enhanced_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err =
            RetouchError::file_io_error("read config file", Path::new("/etc/retouch.json"), &io_error);
        let error_string = err.to_string();
        assert!(error_string.contains("read config file"));
        assert!(error_string.contains("/etc/retouch.json"));

        let err = RetouchError::config_value_error("quality", 150, "0-100", Some(95));
        let error_string = err.to_string();
        assert!(error_string.contains("quality"));
        assert!(error_string.contains("150"));
        assert!(error_string.contains("0-100"));
        assert!(error_string.contains("Recommended: 95"));
    }
}
