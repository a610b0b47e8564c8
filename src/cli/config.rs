//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, Command};
use crate::{
    compositing::{BLUR_RADIUS_RANGE, DEFAULT_BLUR_RADIUS},
    config::{
        BeautyParams, ColorAdjustments, IdPhotoParams, OutputFormat, ParameterScale,
        RetouchConfig,
    },
    processor::{Operation, DEFAULT_FILTER_INTENSITY},
    repair::DEFAULT_REPAIR_STRENGTH,
    utils::NumericValidator,
};
use anyhow::{Context, Result};

/// Convert CLI arguments into a [`RetouchConfig`] and an [`Operation`]
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the configuration: JSON file first, then flag overrides
    ///
    /// Operations built by [`Self::operation`] are already canonical, so the
    /// returned configuration always uses [`ParameterScale::Unit`].
    pub(crate) fn from_cli(cli: &Cli) -> Result<RetouchConfig> {
        let mut config = match &cli.config {
            Some(path) => RetouchConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => RetouchConfig::default(),
        };

        if let Some(format) = cli.format {
            config.output_format = OutputFormat::from(format);
        }
        if let Some(quality) = cli.quality {
            config.quality = quality;
            config.beauty_quality = quality;
        }
        if let Some(model) = &cli.model {
            config.segmentation.model_path = Some(model.clone());
        }
        if let Some(path) = &cli.face_cascade {
            config.detector.face_cascade = Some(path.clone());
        }
        if let Some(path) = &cli.eye_cascade {
            config.detector.eye_cascade = Some(path.clone());
        }
        if let Some(path) = &cli.mouth_cascade {
            config.detector.mouth_cascade = Some(path.clone());
        }
        config.debug = config.debug || cli.verbose >= 2;
        config.parameter_scale = ParameterScale::Unit;

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Scale in which the user's strength values are written
    fn input_scale(cli: &Cli) -> Result<ParameterScale> {
        if cli.percent {
            return Ok(ParameterScale::Percent);
        }
        match &cli.config {
            Some(path) => Ok(RetouchConfig::from_json_file(path)?.parameter_scale),
            None => Ok(ParameterScale::Unit),
        }
    }

    /// Build the operation for the selected subcommand
    ///
    /// Explicit values are normalized from the input scale; omitted values
    /// take the canonical defaults.
    pub(crate) fn operation(cli: &Cli) -> Result<Operation> {
        let scale = Self::input_scale(cli)?;
        let unit = |value: Option<f32>, default: f32, name: &str| -> Result<f32> {
            match value {
                Some(v) => Ok(scale.normalize(v, name)?),
                None => Ok(default),
            }
        };
        let signed = |value: Option<f32>, name: &str| -> Result<f32> {
            match value {
                Some(v) => Ok(scale.normalize_signed(v, name)?),
                None => Ok(0.0),
            }
        };

        let operation = match &cli.command {
            Command::Beauty {
                smoothing,
                whitening,
                eye_enhancement,
                lip_enhancement,
                ..
            } => {
                let defaults = BeautyParams::default();
                Operation::Beauty(BeautyParams {
                    smoothing: unit(*smoothing, defaults.smoothing, "smoothing")?,
                    whitening: unit(*whitening, defaults.whitening, "whitening")?,
                    eye_enhancement: unit(*eye_enhancement, defaults.eye_enhancement, "eyes")?,
                    lip_enhancement: unit(*lip_enhancement, defaults.lip_enhancement, "lips")?,
                })
            },
            Command::Filter { kind, intensity, .. } => Operation::Filter {
                kind: *kind,
                intensity: unit(*intensity, DEFAULT_FILTER_INTENSITY, "intensity")?,
            },
            Command::Adjust {
                brightness,
                contrast,
                saturation,
                hue,
                gamma,
                ..
            } => {
                let adjustments = ColorAdjustments {
                    brightness: signed(*brightness, "brightness")?,
                    contrast: signed(*contrast, "contrast")?,
                    saturation: signed(*saturation, "saturation")?,
                    hue: hue.unwrap_or(0.0),
                    gamma: gamma.unwrap_or(1.0),
                };
                adjustments.validate()?;
                Operation::Adjust(adjustments)
            },
            Command::RemoveBg { .. } => Operation::RemoveBackground,
            Command::ReplaceBg { color, .. } => Operation::ReplaceBackground { color: *color },
            Command::BlurBg { radius, .. } => Operation::BlurBackground {
                radius: radius.unwrap_or(DEFAULT_BLUR_RADIUS),
            },
            Command::Repair { kind, strength, .. } => Operation::Repair {
                kind: *kind,
                strength: unit(*strength, DEFAULT_REPAIR_STRENGTH, "strength")?,
            },
            Command::IdPhoto {
                size,
                background,
                beauty,
                no_crop,
                ..
            } => {
                let defaults = IdPhotoParams::default();
                Operation::IdPhoto(IdPhotoParams {
                    size: *size,
                    background: *background,
                    beauty_strength: unit(*beauty, defaults.beauty_strength, "beauty")?,
                    auto_crop: !*no_crop,
                })
            },
        };
        Ok(operation)
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if let Some(quality) = cli.quality {
            NumericValidator::validate_quality(quality).context("Invalid quality setting")?;
        }

        let paths = [
            ("config file", &cli.config),
            ("model", &cli.model),
            ("face cascade", &cli.face_cascade),
            ("eye cascade", &cli.eye_cascade),
            ("mouth cascade", &cli.mouth_cascade),
        ];
        for (what, path) in paths {
            if let Some(path) = path {
                if !path.is_file() {
                    anyhow::bail!("{} not found: {}", what, path.display());
                }
            }
        }

        let io = cli.command.io();
        if io.input.len() > 1 && io.input.iter().any(|i| i == "-") {
            anyhow::bail!("stdin (-) cannot be combined with other inputs");
        }

        if let Command::BlurBg {
            radius: Some(radius),
            ..
        } = &cli.command
        {
            NumericValidator::validate_range(*radius, BLUR_RADIUS_RANGE.0, BLUR_RADIUS_RANGE.1, "radius")
                .context("Invalid blur radius")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackgroundColor, FilterKind, PhotoSize, RepairKind};
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["photo-retouch"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_cli_config_conversion() {
        let cli = parse(&["-f", "jpeg", "-q", "80", "-vv", "beauty", "face.jpg"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.output_format, OutputFormat::Jpeg);
        assert_eq!(config.quality, 80);
        assert_eq!(config.beauty_quality, 80);
        assert_eq!(config.parameter_scale, ParameterScale::Unit);
        assert!(config.debug);
        assert!(config.segmentation.model_path.is_none());
    }

    #[test]
    fn test_config_defaults_without_flags() {
        let cli = parse(&["remove-bg", "a.png"]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.quality, 95);
        assert_eq!(config.beauty_quality, 98);
        assert!(!config.debug);
    }

    #[test]
    fn test_beauty_operation_defaults_and_percent() {
        let cli = parse(&["beauty", "face.jpg"]);
        assert_eq!(
            CliConfigBuilder::operation(&cli).unwrap(),
            Operation::Beauty(BeautyParams::default())
        );

        let cli = parse(&["--percent", "beauty", "--smoothing", "80", "face.jpg"]);
        let Operation::Beauty(params) = CliConfigBuilder::operation(&cli).unwrap() else {
            panic!("expected beauty");
        };
        assert!((params.smoothing - 0.8).abs() < 1e-6);
        assert!((params.whitening - BeautyParams::default().whitening).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_range_strength_rejected() {
        let cli = parse(&["beauty", "--smoothing", "1.5", "face.jpg"]);
        assert!(CliConfigBuilder::operation(&cli).is_err());

        let cli = parse(&["--percent", "filter", "-k", "sepia", "--intensity", "150", "x.jpg"]);
        assert!(CliConfigBuilder::operation(&cli).is_err());
    }

    #[test]
    fn test_filter_and_repair_operations() {
        let cli = parse(&["filter", "-k", "black_white", "x.jpg"]);
        assert_eq!(
            CliConfigBuilder::operation(&cli).unwrap(),
            Operation::Filter {
                kind: FilterKind::BlackWhite,
                intensity: DEFAULT_FILTER_INTENSITY
            }
        );

        let cli = parse(&["repair", "-k", "scratch", "--strength", "0.4", "x.jpg"]);
        assert_eq!(
            CliConfigBuilder::operation(&cli).unwrap(),
            Operation::Repair {
                kind: RepairKind::Scratch,
                strength: 0.4
            }
        );
    }

    #[test]
    fn test_adjust_accepts_negative_values() {
        let cli = parse(&["adjust", "--brightness", "-0.2", "--hue", "-30", "x.jpg"]);
        let Operation::Adjust(adjustments) = CliConfigBuilder::operation(&cli).unwrap() else {
            panic!("expected adjust");
        };
        assert!((adjustments.brightness + 0.2).abs() < 1e-6);
        assert!((adjustments.hue + 30.0).abs() < 1e-6);
        assert!((adjustments.gamma - 1.0).abs() < 1e-6);

        let cli = parse(&["adjust", "--gamma", "5", "x.jpg"]);
        assert!(CliConfigBuilder::operation(&cli).is_err());
    }

    #[test]
    fn test_background_and_id_photo_operations() {
        let cli = parse(&["replace-bg", "--color", "#00FF00", "x.jpg"]);
        assert_eq!(
            CliConfigBuilder::operation(&cli).unwrap(),
            Operation::ReplaceBackground {
                color: BackgroundColor::rgb(0, 255, 0)
            }
        );

        let cli = parse(&["id-photo", "-s", "passport", "-b", "blue", "--no-crop", "x.jpg"]);
        let Operation::IdPhoto(params) = CliConfigBuilder::operation(&cli).unwrap() else {
            panic!("expected id photo");
        };
        assert_eq!(params.size, PhotoSize::Passport);
        assert_eq!(params.background, BackgroundColor::rgb(67, 142, 219));
        assert!(!params.auto_crop);
    }

    #[test]
    fn test_unknown_values_fail_to_parse() {
        assert!(Cli::try_parse_from(["photo-retouch", "filter", "-k", "neon", "x.jpg"]).is_err());
        assert!(
            Cli::try_parse_from(["photo-retouch", "replace-bg", "--color", "#12", "x.jpg"]).is_err()
        );
        assert!(Cli::try_parse_from(["photo-retouch", "beauty"]).is_err());
    }

    #[test]
    fn test_cli_validation() {
        let cli = parse(&["blur-bg", "x.jpg"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_ok());

        let cli = parse(&["blur-bg", "--radius", "0", "x.jpg"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());

        let cli = parse(&["-q", "150", "blur-bg", "x.jpg"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());

        let cli = parse(&["-m", "/definitely/missing/model.onnx", "remove-bg", "x.jpg"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());

        let cli = parse(&["remove-bg", "-", "x.jpg"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());
    }

    #[test]
    fn test_config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("retouch.json");
        std::fs::write(&path, r#"{"quality": 70, "parameter_scale": "percent"}"#).unwrap();

        let cli = parse(&[
            "--config",
            path.to_str().unwrap(),
            "filter",
            "-k",
            "warm",
            "--intensity",
            "50",
            "x.jpg",
        ]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        assert_eq!(config.quality, 70);
        assert_eq!(config.parameter_scale, ParameterScale::Unit);
        assert_eq!(
            CliConfigBuilder::operation(&cli).unwrap(),
            Operation::Filter {
                kind: FilterKind::Warm,
                intensity: 0.5
            }
        );
    }
}
