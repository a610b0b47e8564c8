//! Input buffer validation

use crate::error::{RetouchError, Result};
use image::{DynamicImage, GenericImageView, RgbImage};

/// Largest side accepted for a single call
pub const MAX_IMAGE_SIDE: u32 = 16_384;

/// Validator for source buffers
pub struct ImageValidator;

impl ImageValidator {
    /// Reject zero-sized or oversized buffers
    pub fn validate_dimensions(width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(RetouchError::invalid_input(format!(
                "Image has zero size ({}x{})",
                width, height
            )));
        }
        if width > MAX_IMAGE_SIDE || height > MAX_IMAGE_SIDE {
            return Err(RetouchError::invalid_input(format!(
                "Image {}x{} exceeds the maximum side of {} pixels",
                width, height, MAX_IMAGE_SIDE
            )));
        }
        Ok(())
    }

    /// Validate a decoded image and convert it to 8-bit RGB
    pub fn to_rgb(image: &DynamicImage) -> Result<RgbImage> {
        let (width, height) = image.dimensions();
        Self::validate_dimensions(width, height)?;
        Ok(image.to_rgb8())
    }

    /// Validate an RGB buffer in place
    pub fn validate_rgb(image: &RgbImage) -> Result<()> {
        Self::validate_dimensions(image.width(), image.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_sized_rejected() {
        let err = ImageValidator::validate_dimensions(0, 10).unwrap_err();
        assert!(matches!(err, RetouchError::InvalidInput(_)));
        assert!(ImageValidator::to_rgb(&DynamicImage::new_rgb8(0, 0)).is_err());
    }

    #[test]
    fn test_layouts_converted() {
        let gray = DynamicImage::new_luma8(4, 3);
        let rgb = ImageValidator::to_rgb(&gray).unwrap();
        assert_eq!(rgb.dimensions(), (4, 3));

        let rgba = DynamicImage::new_rgba16(2, 2);
        assert!(ImageValidator::to_rgb(&rgba).is_ok());
    }

    #[test]
    fn test_oversized_rejected() {
        assert!(ImageValidator::validate_dimensions(MAX_IMAGE_SIDE + 1, 1).is_err());
        assert!(ImageValidator::validate_dimensions(MAX_IMAGE_SIDE, 1).is_ok());
    }
}
