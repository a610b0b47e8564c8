//! Numeric validation utilities
//!
//! Range checks for strength parameters, qualities and kernel sizes.

use crate::error::{RetouchError, Result};

/// Validator for numeric parameters
pub struct NumericValidator;

impl NumericValidator {
    /// Validate a canonical strength value (0.0 to 1.0)
    pub fn validate_unit(value: f32, name: &str) -> Result<f32> {
        if !value.is_finite() {
            return Err(RetouchError::invalid_config(format!(
                "{} must be finite, got {}",
                name, value
            )));
        }

        if !(0.0..=1.0).contains(&value) {
            return Err(RetouchError::config_value_error(
                name,
                value,
                "0.0-1.0",
                None,
            ));
        }

        Ok(value)
    }

    /// Convert a percent value (0 to 100) to the canonical unit range
    pub fn percent_to_unit(value: f32, name: &str) -> Result<f32> {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(RetouchError::config_value_error(name, value, "0-100", None));
        }
        Ok(value / 100.0)
    }

    /// Validate quality setting (0-100)
    pub fn validate_quality(value: u8) -> Result<u8> {
        if value > 100 {
            return Err(RetouchError::invalid_config(format!(
                "Quality must be between 0 and 100, got {}",
                value
            )));
        }
        Ok(value)
    }

    /// Validate numeric range (inclusive)
    pub fn validate_range<T>(value: T, min: T, max: T, name: &str) -> Result<T>
    where
        T: PartialOrd + std::fmt::Display + Copy,
    {
        // NaN fails both comparisons, so test containment positively
        if !(value >= min && value <= max) {
            return Err(RetouchError::invalid_config(format!(
                "{} must be between {} and {}, got {}",
                name, min, max, value
            )));
        }
        Ok(value)
    }

    /// Validate that a value is positive
    pub fn validate_positive<T>(value: T, name: &str) -> Result<T>
    where
        T: PartialOrd + std::fmt::Display + Copy + Default,
    {
        if value <= T::default() {
            return Err(RetouchError::invalid_config(format!(
                "{} must be positive, got {}",
                name, value
            )));
        }
        Ok(value)
    }

    /// Smallest odd integer that is at least `value` and at least `min`
    #[must_use]
    pub fn odd_kernel(value: f32, min: u32) -> u32 {
        let k = (value.max(0.0).round() as u32).max(min);
        if k % 2 == 0 {
            k + 1
        } else {
            k
        }
    }
}
