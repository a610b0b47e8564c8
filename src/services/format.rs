//! Output format handling service

use crate::config::OutputFormat;
use image::{DynamicImage, Rgb, RgbImage};

/// Service for preparing images for a particular output format
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Convert an image to the 8-bit layout the encoder for `format` expects
    ///
    /// JPEG has no alpha channel, so translucent pixels are composited over
    /// white. Other formats keep RGBA when the source has alpha.
    ///
    /// ```rust
    /// use photo_retouch::{services::OutputFormatHandler, OutputFormat};
    /// use image::{DynamicImage, RgbaImage};
    ///
    /// let cutout = DynamicImage::ImageRgba8(RgbaImage::new(4, 4));
    /// let jpeg_ready = OutputFormatHandler::prepare(&cutout, OutputFormat::Jpeg);
    /// assert!(!jpeg_ready.color().has_alpha());
    /// ```
    #[must_use]
    pub fn prepare(image: &DynamicImage, format: OutputFormat) -> DynamicImage {
        let has_alpha = image.color().has_alpha();
        match (format, has_alpha) {
            (OutputFormat::Jpeg, true) => {
                Self::warn_if_transparency_lost(format);
                DynamicImage::ImageRgb8(Self::flatten(image))
            },
            (_, true) => DynamicImage::ImageRgba8(image.to_rgba8()),
            (_, false) => DynamicImage::ImageRgb8(image.to_rgb8()),
        }
    }

    /// Composite an image with alpha over white
    #[must_use]
    pub fn flatten(image: &DynamicImage) -> RgbImage {
        let rgba = image.to_rgba8();
        RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
            let [r, g, b, a] = rgba.get_pixel(x, y).0;
            let alpha = f32::from(a) / 255.0;
            let over = |c: u8| (f32::from(c) * alpha + 255.0 * (1.0 - alpha)).round() as u8;
            Rgb([over(r), over(g), over(b)])
        })
    }

    /// File extension for a format
    ///
    /// ```rust
    /// use photo_retouch::{services::OutputFormatHandler, OutputFormat};
    ///
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Jpeg), "jpg");
    /// ```
    #[must_use]
    pub fn get_extension(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::WebP => "webp",
            OutputFormat::Tiff => "tiff",
        }
    }

    /// Check if a format supports transparency
    #[must_use]
    pub fn supports_transparency(format: OutputFormat) -> bool {
        !matches!(format, OutputFormat::Jpeg)
    }

    /// Warn when a cut-out is about to be written to a format without alpha
    pub fn warn_if_transparency_lost(format: OutputFormat) {
        if !Self::supports_transparency(format) {
            log::warn!(
                "Output format {:?} does not support transparency. Transparent areas will be flattened onto white.",
                format
            );
        }
    }

    /// Recommended `(default, min, max)` encoder quality, `None` for lossless formats
    #[must_use]
    pub fn get_quality_range(format: OutputFormat) -> Option<(u8, u8, u8)> {
        match format {
            OutputFormat::Jpeg => Some((95, 1, 100)),
            OutputFormat::Png | OutputFormat::WebP | OutputFormat::Tiff => None,
        }
    }
}
