//! Validation helpers for parameters and input buffers

pub mod input;
pub mod numeric;

pub use input::ImageValidator;
pub use numeric::NumericValidator;
