//! Concrete collaborators for the segmentation cascade and region detection
//!
//! - Tract backend (pure Rust ONNX inference) for the neural tier
//! - OpenCV backend for cascade detection, GrabCut and CLAHE

#[cfg(feature = "tract")]
pub mod tract;

#[cfg(feature = "opencv")]
pub mod opencv;

// Mock collaborators for unit tests
#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "tract")]
pub use self::tract::TractSegmenter;

#[cfg(feature = "opencv")]
pub use self::opencv::OpenCvRegionDetector;
