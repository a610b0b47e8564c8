//! Configuration and parameter types for retouching operations
//!
//! Every strength-like parameter is held canonically in `[0, 1]`. Callers that
//! speak in percent (`0..=100`) convert at the boundary through
//! [`ParameterScale`].

use crate::error::{RetouchError, Result};
use crate::utils::NumericValidator;
use image::Rgb;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Output image format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG, keeps the alpha channel
    #[default]
    Png,
    /// JPEG (no transparency, alpha is flattened)
    Jpeg,
    /// WebP with alpha channel transparency
    WebP,
    /// TIFF with alpha channel transparency and lossless compression
    Tiff,
}

impl OutputFormat {
    /// Guess the format from a file extension
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            "tif" | "tiff" => Some(Self::Tiff),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Png => write!(f, "png"),
            Self::Jpeg => write!(f, "jpeg"),
            Self::WebP => write!(f, "webp"),
            Self::Tiff => write!(f, "tiff"),
        }
    }
}

/// Scale in which callers express strength parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterScale {
    /// Values already in `[0, 1]`
    #[default]
    Unit,
    /// Values in `[0, 100]`, divided by 100 at the boundary
    Percent,
}

impl ParameterScale {
    /// Convert a caller value to the canonical `[0, 1]` range
    pub fn normalize(self, value: f32, name: &str) -> Result<f32> {
        match self {
            Self::Unit => NumericValidator::validate_unit(value, name),
            Self::Percent => NumericValidator::percent_to_unit(value, name),
        }
    }

    /// Convert a signed caller value to the canonical `[-1, 1]` range
    pub fn normalize_signed(self, value: f32, name: &str) -> Result<f32> {
        let unit = match self {
            Self::Unit => value,
            Self::Percent => value / 100.0,
        };
        NumericValidator::validate_range(unit, -1.0, 1.0, name)
    }
}

/// Strengths of the four per-region beauty stages
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeautyParams {
    pub smoothing: f32,
    pub whitening: f32,
    pub eye_enhancement: f32,
    pub lip_enhancement: f32,
}

impl Default for BeautyParams {
    fn default() -> Self {
        Self {
            smoothing: 0.6,
            whitening: 0.55,
            eye_enhancement: 0.65,
            lip_enhancement: 0.45,
        }
    }
}

impl BeautyParams {
    /// All stages disabled
    #[must_use]
    pub fn none() -> Self {
        Self {
            smoothing: 0.0,
            whitening: 0.0,
            eye_enhancement: 0.0,
            lip_enhancement: 0.0,
        }
    }

    /// Build from caller values in the given scale
    pub fn from_scaled(
        scale: ParameterScale,
        smoothing: f32,
        whitening: f32,
        eye_enhancement: f32,
        lip_enhancement: f32,
    ) -> Result<Self> {
        Ok(Self {
            smoothing: scale.normalize(smoothing, "smoothing")?,
            whitening: scale.normalize(whitening, "whitening")?,
            eye_enhancement: scale.normalize(eye_enhancement, "eye_enhancement")?,
            lip_enhancement: scale.normalize(lip_enhancement, "lip_enhancement")?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        NumericValidator::validate_unit(self.smoothing, "smoothing")?;
        NumericValidator::validate_unit(self.whitening, "whitening")?;
        NumericValidator::validate_unit(self.eye_enhancement, "eye_enhancement")?;
        NumericValidator::validate_unit(self.lip_enhancement, "lip_enhancement")?;
        Ok(())
    }

    /// True when every stage strength is zero
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.smoothing <= 0.0
            && self.whitening <= 0.0
            && self.eye_enhancement <= 0.0
            && self.lip_enhancement <= 0.0
    }
}

/// Tone filter presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Vintage,
    #[serde(alias = "monochrome")]
    BlackWhite,
    Sepia,
    Cool,
    Warm,
}

impl FilterKind {
    pub const ALL: [FilterKind; 5] = [
        Self::Vintage,
        Self::BlackWhite,
        Self::Sepia,
        Self::Cool,
        Self::Warm,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vintage => "vintage",
            Self::BlackWhite => "black_white",
            Self::Sepia => "sepia",
            Self::Cool => "cool",
            Self::Warm => "warm",
        }
    }
}

impl FromStr for FilterKind {
    type Err = RetouchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "vintage" => Ok(Self::Vintage),
            "black_white" | "blackwhite" | "monochrome" | "bw" => Ok(Self::BlackWhite),
            "sepia" => Ok(Self::Sepia),
            "cool" => Ok(Self::Cool),
            "warm" => Ok(Self::Warm),
            other => Err(RetouchError::invalid_config(format!(
                "Unknown filter '{other}' (expected vintage, black_white, sepia, cool or warm)"
            ))),
        }
    }
}

impl std::fmt::Display for FilterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Global colour adjustments; every field at its neutral value is a no-op
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorAdjustments {
    /// `[-1, 1]`, multiplicative factor `1 + brightness`
    pub brightness: f32,
    /// `[-1, 1]`, contrast around mid-grey with factor `1 + contrast`
    pub contrast: f32,
    /// `[-1, 1]`, saturation factor `1 + saturation`
    pub saturation: f32,
    /// Hue rotation in degrees, `[-180, 180]`
    pub hue: f32,
    /// Gamma, `[0.1, 3.0]`
    pub gamma: f32,
}

impl Default for ColorAdjustments {
    fn default() -> Self {
        Self {
            brightness: 0.0,
            contrast: 0.0,
            saturation: 0.0,
            hue: 0.0,
            gamma: 1.0,
        }
    }
}

impl ColorAdjustments {
    /// Build from caller values; brightness/contrast/saturation in the given scale
    pub fn from_scaled(
        scale: ParameterScale,
        brightness: f32,
        contrast: f32,
        saturation: f32,
        hue: f32,
        gamma: f32,
    ) -> Result<Self> {
        let adjustments = Self {
            brightness: scale.normalize_signed(brightness, "brightness")?,
            contrast: scale.normalize_signed(contrast, "contrast")?,
            saturation: scale.normalize_signed(saturation, "saturation")?,
            hue,
            gamma,
        };
        adjustments.validate()?;
        Ok(adjustments)
    }

    pub fn validate(&self) -> Result<()> {
        NumericValidator::validate_range(self.brightness, -1.0, 1.0, "brightness")?;
        NumericValidator::validate_range(self.contrast, -1.0, 1.0, "contrast")?;
        NumericValidator::validate_range(self.saturation, -1.0, 1.0, "saturation")?;
        NumericValidator::validate_range(self.hue, -180.0, 180.0, "hue")?;
        NumericValidator::validate_range(self.gamma, 0.1, 3.0, "gamma")?;
        Ok(())
    }

    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.brightness == 0.0
            && self.contrast == 0.0
            && self.saturation == 0.0
            && self.hue == 0.0
            && (self.gamma - 1.0).abs() < f32::EPSILON
    }
}

/// Solid fill colour for background replacement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BackgroundColor(pub Rgb<u8>);

impl BackgroundColor {
    pub const WHITE: Self = Self(Rgb([255, 255, 255]));

    #[must_use]
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self(Rgb([r, g, b]))
    }

    /// Named colours accepted besides `#RRGGBB`; red and blue are the
    /// shades used on ID photos
    fn named(name: &str) -> Option<Self> {
        let rgb = match name {
            "white" => [255, 255, 255],
            "black" => [0, 0, 0],
            "red" => [220, 53, 69],
            "green" => [0, 255, 0],
            "blue" => [67, 142, 219],
            "yellow" => [255, 255, 0],
            "cyan" => [0, 255, 255],
            "magenta" => [255, 0, 255],
            _ => return None,
        };
        Some(Self(Rgb(rgb)))
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        let [r, g, b] = self.0 .0;
        format!("#{r:02X}{g:02X}{b:02X}")
    }
}

impl Default for BackgroundColor {
    fn default() -> Self {
        Self::WHITE
    }
}

impl FromStr for BackgroundColor {
    type Err = RetouchError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix('#') {
            if hex.len() != 6 || !hex.is_ascii() {
                return Err(RetouchError::invalid_config(format!(
                    "Colour '{s}' must have the form #RRGGBB"
                )));
            }
            let channel = |range: std::ops::Range<usize>| {
                hex.get(range)
                    .and_then(|part| u8::from_str_radix(part, 16).ok())
                    .ok_or_else(|| {
                        RetouchError::invalid_config(format!("Colour '{s}' is not valid hex"))
                    })
            };
            return Ok(Self::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?));
        }
        Self::named(&s.to_ascii_lowercase())
            .ok_or_else(|| RetouchError::invalid_config(format!("Unknown colour '{s}'")))
    }
}

impl TryFrom<String> for BackgroundColor {
    type Error = RetouchError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BackgroundColor> for String {
    fn from(color: BackgroundColor) -> Self {
        color.to_hex()
    }
}

impl std::fmt::Display for BackgroundColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Repair modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepairKind {
    /// Light denoise followed by scratch filling
    #[default]
    Auto,
    /// Edge-preserving denoise
    Noise,
    /// Morphological close over thin dark defects
    Scratch,
}

impl FromStr for RepairKind {
    type Err = RetouchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "noise" => Ok(Self::Noise),
            "scratch" => Ok(Self::Scratch),
            other => Err(RetouchError::invalid_config(format!(
                "Unknown repair type '{other}' (expected auto, noise or scratch)"
            ))),
        }
    }
}

/// Standard ID photo sizes in pixels (300 dpi)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoSize {
    #[default]
    #[serde(rename = "1_inch")]
    OneInch,
    #[serde(rename = "2_inch")]
    TwoInch,
    Passport,
    IdCard,
}

impl PhotoSize {
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::OneInch => (295, 413),
            Self::TwoInch => (413, 579),
            Self::Passport => (390, 567),
            Self::IdCard => (358, 441),
        }
    }
}

impl FromStr for PhotoSize {
    type Err = RetouchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "1_inch" | "one_inch" => Ok(Self::OneInch),
            "2_inch" | "two_inch" => Ok(Self::TwoInch),
            "passport" => Ok(Self::Passport),
            "id_card" => Ok(Self::IdCard),
            other => Err(RetouchError::invalid_config(format!(
                "Unknown photo size '{other}' (expected 1_inch, 2_inch, passport or id_card)"
            ))),
        }
    }
}

/// Parameters for ID photo generation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdPhotoParams {
    pub size: PhotoSize,
    pub background: BackgroundColor,
    /// `[0, 1]`
    pub beauty_strength: f32,
    pub auto_crop: bool,
}

impl Default for IdPhotoParams {
    fn default() -> Self {
        Self {
            size: PhotoSize::OneInch,
            background: BackgroundColor::WHITE,
            beauty_strength: 0.3,
            auto_crop: true,
        }
    }
}

/// Haar cascade locations and detection tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub face_cascade: Option<PathBuf>,
    pub eye_cascade: Option<PathBuf>,
    pub mouth_cascade: Option<PathBuf>,
    /// Window growth between pyramid levels
    pub scale_factor: f32,
    /// Neighbour votes required to keep a face
    pub face_min_neighbors: usize,
    /// Neighbour votes required to keep an eye or mouth
    pub feature_min_neighbors: usize,
    /// Faces smaller than this (pixels) are not searched for
    pub min_face_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            face_cascade: None,
            eye_cascade: None,
            mouth_cascade: None,
            scale_factor: 1.1,
            face_min_neighbors: 4,
            feature_min_neighbors: 3,
            min_face_size: 24,
        }
    }
}

/// Segmentation cascade tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// ONNX model for the neural tier
    pub model_path: Option<PathBuf>,
    /// Square model input size
    pub model_input_size: u32,
    /// Longest side of the working copy used by the graph cut
    pub graph_cut_max_side: u32,
    /// Iterations seeded from the rectangle prior
    pub graph_cut_iterations: usize,
    /// Refinement iterations seeded from the first pass
    pub graph_cut_refine_iterations: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            model_input_size: 320,
            graph_cut_max_side: 160,
            graph_cut_iterations: 5,
            graph_cut_refine_iterations: 3,
        }
    }
}

/// Top-level configuration for a [`crate::RetouchProcessor`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetouchConfig {
    /// Output format for file/bytes output
    pub output_format: OutputFormat,

    /// Encoder quality for beauty output (0-100)
    pub beauty_quality: u8,

    /// Encoder quality for every other operation (0-100)
    pub quality: u8,

    /// Scale used by callers for strength parameters
    pub parameter_scale: ParameterScale,

    pub detector: DetectorConfig,

    pub segmentation: SegmentationConfig,

    /// Enable debug mode (additional logging)
    pub debug: bool,
}

impl Default for RetouchConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::default(),
            beauty_quality: 98,
            quality: 95,
            parameter_scale: ParameterScale::Unit,
            detector: DetectorConfig::default(),
            segmentation: SegmentationConfig::default(),
            debug: false,
        }
    }
}

impl RetouchConfig {
    /// Create a new configuration builder
    ///
    /// ```rust
    /// use photo_retouch::{OutputFormat, RetouchConfig};
    ///
    /// let config = RetouchConfig::builder()
    ///     .output_format(OutputFormat::Jpeg)
    ///     .quality(90)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.quality, 90);
    /// ```
    #[must_use]
    pub fn builder() -> RetouchConfigBuilder {
        RetouchConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        NumericValidator::validate_quality(self.quality)?;
        NumericValidator::validate_quality(self.beauty_quality)?;
        if self.detector.scale_factor <= 1.0 {
            return Err(RetouchError::config_value_error(
                "detector.scale_factor",
                self.detector.scale_factor,
                "> 1.0",
                Some(1.1),
            ));
        }
        if self.segmentation.model_input_size == 0 {
            return Err(RetouchError::invalid_config(
                "segmentation.model_input_size must be positive",
            ));
        }
        if self.segmentation.graph_cut_max_side < 16 {
            return Err(RetouchError::config_value_error(
                "segmentation.graph_cut_max_side",
                self.segmentation.graph_cut_max_side,
                ">= 16",
                Some(160),
            ));
        }
        Ok(())
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RetouchError::file_io_error("read config file", path, &e))?;
        Self::from_json_str(&content)
    }

    /// Parse a configuration from JSON text; missing fields take defaults
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| RetouchError::invalid_config(format!("Invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Encoder quality for an operation
    #[must_use]
    pub fn quality_for(&self, operation: &str) -> u8 {
        if operation == "beauty" {
            self.beauty_quality
        } else {
            self.quality
        }
    }
}

/// Builder for [`RetouchConfig`]
#[derive(Debug, Default)]
pub struct RetouchConfigBuilder {
    config: RetouchConfig,
}

impl RetouchConfigBuilder {
    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    #[must_use]
    pub fn quality(mut self, quality: u8) -> Self {
        self.config.quality = quality.min(100);
        self
    }

    #[must_use]
    pub fn beauty_quality(mut self, quality: u8) -> Self {
        self.config.beauty_quality = quality.min(100);
        self
    }

    #[must_use]
    pub fn parameter_scale(mut self, scale: ParameterScale) -> Self {
        self.config.parameter_scale = scale;
        self
    }

    #[must_use]
    pub fn detector(mut self, detector: DetectorConfig) -> Self {
        self.config.detector = detector;
        self
    }

    #[must_use]
    pub fn segmentation(mut self, segmentation: SegmentationConfig) -> Self {
        self.config.segmentation = segmentation;
        self
    }

    #[must_use]
    pub fn model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.segmentation.model_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<RetouchConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
