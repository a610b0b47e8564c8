//! Image I/O operations service
//!
//! Loading, encoding and saving live here so the processing code never
//! touches the filesystem.

use crate::{
    config::OutputFormat,
    error::{RetouchError, Result},
    services::OutputFormatHandler,
};
use chrono::Local;
use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Extensions accepted as input when walking directories
const SUPPORTED_INPUT_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "webp", "bmp", "tiff", "tif"];

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// Extension-based decoding is tried first, then content sniffing.
    ///
    /// ```rust,no_run
    /// use photo_retouch::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("portrait.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(RetouchError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );
                let data = std::fs::read(path_ref)
                    .map_err(|io_err| RetouchError::file_io_error("read image data", path_ref, &io_err))?;
                Self::load_from_bytes(&data).map_err(|content_err| {
                    RetouchError::invalid_input(format!(
                        "Failed to decode {} ({} bytes): {}; {}",
                        path_ref.display(),
                        data.len(),
                        e,
                        content_err
                    ))
                })
            },
        }
    }

    /// Decode an in-memory image, guessing the format from its content
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(RetouchError::invalid_input("image data is empty"));
        }
        image::load_from_memory(bytes)
            .map_err(|e| RetouchError::invalid_input(format!("Failed to decode image: {e}")))
    }

    /// Read a whole stream and decode it
    pub async fn load_from_reader<R: AsyncRead + Unpin>(mut reader: R) -> Result<DynamicImage> {
        let mut buffer = Vec::new();
        reader
            .read_to_end(&mut buffer)
            .await
            .map_err(|e| RetouchError::processing_stage("read stream", e.to_string()))?;
        Self::load_from_bytes(&buffer)
    }

    /// Encode an image into `format`
    ///
    /// `quality` drives the JPEG encoder. PNG, WebP (lossless) and TIFF ignore
    /// it. Formats without an alpha channel get the image flattened first.
    pub fn encode(image: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
        let prepared = OutputFormatHandler::prepare(image, format);
        let mut buffer = Vec::new();
        match format {
            OutputFormat::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
                prepared.write_with_encoder(encoder)?;
            },
            OutputFormat::Png => prepared.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?,
            OutputFormat::WebP => {
                #[cfg(feature = "webp-support")]
                prepared.write_to(&mut Cursor::new(&mut buffer), ImageFormat::WebP)?;
                #[cfg(not(feature = "webp-support"))]
                return Err(RetouchError::invalid_config(
                    "WebP output requires the webp-support feature",
                ));
            },
            OutputFormat::Tiff => {
                prepared.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Tiff)?;
            },
        }
        Ok(buffer)
    }

    /// Encode and write an image, creating parent directories as needed
    pub fn save_image<P: AsRef<Path>>(
        image: &DynamicImage,
        path: P,
        format: OutputFormat,
        quality: u8,
    ) -> Result<()> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| RetouchError::file_io_error("create output directory", parent, &e))?;
            }
        }
        let bytes = Self::encode(image, format, quality)?;
        std::fs::write(path_ref, bytes)
            .map_err(|e| RetouchError::file_io_error("write image file", path_ref, &e))?;
        log::debug!("Saved {} as {}", path_ref.display(), format);
        Ok(())
    }

    /// Unique output file name `<tool>_<YYYYmmdd_HHMMSS>_<8 hex>.<ext>` inside `dir`
    #[must_use]
    pub fn output_path<P: AsRef<Path>>(dir: P, tool: &str, format: OutputFormat) -> PathBuf {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let token = uuid::Uuid::new_v4().simple().to_string();
        let file_name = format!(
            "{tool}_{timestamp}_{}.{}",
            &token[..8],
            OutputFormatHandler::get_extension(format)
        );
        dir.as_ref().join(file_name)
    }

    /// Whether a path has an extension this crate can decode
    #[must_use]
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                let ext = ext.to_ascii_lowercase();
                SUPPORTED_INPUT_EXTENSIONS.contains(&ext.as_str())
            })
    }
}
