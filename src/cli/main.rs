//! Photo retouching CLI tool
//!
//! One subcommand per operation; every subcommand takes files, directories
//! or `-` for stdin.

use super::config::CliConfigBuilder;
use crate::{
    config::{BackgroundColor, FilterKind, OutputFormat, PhotoSize, RepairKind},
    processor::{Operation, RetouchProcessor},
    services::{ImageIOService, OutputFormatHandler, ProgressTracker},
    tracing_config::{events, init_cli_tracing, spans},
    types::RetouchResult,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Region-aware photo retouching
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "photo-retouch")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output format [default: from the output extension, else the config]
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<CliOutputFormat>,

    /// Encoder quality (0-100) [default: 98 for beauty, 95 otherwise]
    #[arg(short, long, global = true)]
    pub quality: Option<u8>,

    /// Enable verbose logging (-v: DEBUG for this crate, -vv: more, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// JSON configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// ONNX segmentation model for the neural tier
    #[arg(short, long, value_name = "PATH", global = true)]
    pub model: Option<PathBuf>,

    /// Haar cascade (OpenCV XML or JSON) used to find faces, e.g. haarcascade_frontalface_default.xml
    #[arg(long, value_name = "PATH", global = true)]
    pub face_cascade: Option<PathBuf>,

    /// Haar cascade (OpenCV XML or JSON) used to find eyes
    #[arg(long, value_name = "PATH", global = true)]
    pub eye_cascade: Option<PathBuf>,

    /// Haar cascade (OpenCV XML or JSON) used to find mouths
    #[arg(long, value_name = "PATH", global = true)]
    pub mouth_cascade: Option<PathBuf>,

    /// Strength values are given in percent (0-100) instead of 0-1
    #[arg(long, global = true)]
    pub percent: bool,

    /// Report processing stages for each file
    #[arg(long, global = true)]
    pub progress: bool,

    /// Write a JSON metadata file next to each output
    #[arg(long, global = true)]
    pub metadata: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,
}

/// Inputs and outputs shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Input image files or directories (use "-" for stdin)
    #[arg(value_name = "INPUT", required = true)]
    pub input: Vec<String>,

    /// Output file (single input) or directory (several inputs). Use "-" for stdout.
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Process directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// File name pattern for directory inputs (e.g., "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Skin smoothing, whitening, eye and lip enhancement
    Beauty {
        #[arg(long)]
        smoothing: Option<f32>,
        #[arg(long)]
        whitening: Option<f32>,
        #[arg(long = "eyes")]
        eye_enhancement: Option<f32>,
        #[arg(long = "lips")]
        lip_enhancement: Option<f32>,
        #[command(flatten)]
        io: InputArgs,
    },
    /// Tone filter preset (vintage, black_white, sepia, cool, warm)
    Filter {
        #[arg(short, long)]
        kind: FilterKind,
        #[arg(long)]
        intensity: Option<f32>,
        #[command(flatten)]
        io: InputArgs,
    },
    /// Brightness, contrast, saturation, hue and gamma
    Adjust {
        #[arg(long, allow_negative_numbers = true)]
        brightness: Option<f32>,
        #[arg(long, allow_negative_numbers = true)]
        contrast: Option<f32>,
        #[arg(long, allow_negative_numbers = true)]
        saturation: Option<f32>,
        /// Hue rotation in degrees (-180 to 180)
        #[arg(long, allow_negative_numbers = true)]
        hue: Option<f32>,
        /// Gamma (0.1 to 3.0)
        #[arg(long)]
        gamma: Option<f32>,
        #[command(flatten)]
        io: InputArgs,
    },
    /// Cut the subject out onto a transparent background
    RemoveBg {
        #[command(flatten)]
        io: InputArgs,
    },
    /// Put the subject on a flat colour (#RRGGBB or a colour name)
    ReplaceBg {
        #[arg(short, long, default_value = "white")]
        color: BackgroundColor,
        #[command(flatten)]
        io: InputArgs,
    },
    /// Gaussian blur over the whole frame
    BlurBg {
        /// Blur radius in pixels (1-50)
        #[arg(long)]
        radius: Option<u32>,
        #[command(flatten)]
        io: InputArgs,
    },
    /// Denoise and fill scratches
    Repair {
        /// auto, noise or scratch
        #[arg(short, long, default_value = "auto")]
        kind: RepairKind,
        #[arg(long)]
        strength: Option<f32>,
        #[command(flatten)]
        io: InputArgs,
    },
    /// Standard-size ID photo on a flat background
    IdPhoto {
        /// 1_inch, 2_inch, passport or id_card
        #[arg(short, long, default_value = "1_inch")]
        size: PhotoSize,
        #[arg(short, long, default_value = "white")]
        background: BackgroundColor,
        #[arg(long)]
        beauty: Option<f32>,
        /// Keep the original framing instead of cropping to 3:4
        #[arg(long)]
        no_crop: bool,
        #[command(flatten)]
        io: InputArgs,
    },
}

impl Command {
    #[must_use]
    pub fn io(&self) -> &InputArgs {
        match self {
            Self::Beauty { io, .. }
            | Self::Filter { io, .. }
            | Self::Adjust { io, .. }
            | Self::RemoveBg { io }
            | Self::ReplaceBg { io, .. }
            | Self::BlurBg { io, .. }
            | Self::Repair { io, .. }
            | Self::IdPhoto { io, .. } => io,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Jpeg,
    Webp,
    Tiff,
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Png => OutputFormat::Png,
            CliOutputFormat::Jpeg => OutputFormat::Jpeg,
            CliOutputFormat::Webp => OutputFormat::WebP,
            CliOutputFormat::Tiff => OutputFormat::Tiff,
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_tracing(cli.verbose, cli.json_logs).context("Failed to initialize tracing")?;

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;
    let operation = CliConfigBuilder::operation(&cli).context("Invalid operation parameters")?;

    info!("Starting photo-retouch: {}", operation);
    info!("Input(s): {}", cli.command.io().input.join(", "));

    let processor = RetouchProcessor::new(config).context("Failed to initialize processor")?;
    if !processor.has_neural_tier() && operation.needs_segmentation() {
        events::warning_with_recommendation(
            "No segmentation model loaded, background operations use graph cut or the fallback ellipse",
            "pass --model <PATH> with an ONNX salient-object model",
        );
    }

    let start_time = Instant::now();
    let processed_count = process_inputs(&cli, &processor, &operation).await?;
    let total_time = start_time.elapsed();

    events::progress(
        &format!(
            "Processed {} image(s) in {:.2}s",
            processed_count,
            total_time.as_secs_f64()
        ),
        "✅",
    );
    Ok(())
}

/// Process every input and return how many succeeded
async fn process_inputs(cli: &Cli, processor: &RetouchProcessor, operation: &Operation) -> Result<usize> {
    let io_args = cli.command.io();

    if io_args.input.len() == 1 && io_args.input.first().is_some_and(|s| s == "-") {
        return process_stdin(cli, processor, operation).await;
    }

    let all_files = collect_input_files(io_args)?;
    if all_files.is_empty() {
        warn!("No supported image files found in the provided inputs");
        return Ok(0);
    }
    info!("Found {} image file(s) to process", all_files.len());

    let file_count = all_files.len();
    let output_dir = prepare_output_dir(io_args.output.as_deref(), file_count)?;

    let indicatif_progress = if !cli.progress && file_count > 1 {
        let pb = ProgressBar::new(file_count as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .context("Invalid progress bar template")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut processed_count = 0;
    let mut failed_count = 0;
    let batch_start_time = Instant::now();

    for input_file in &all_files {
        let _span = spans::file_processing(input_file, operation.name()).entered();
        if let Some(ref pb) = indicatif_progress {
            pb.set_message(format!("Processing {}", input_file.display()));
        }

        let output_target = if file_count == 1 {
            io_args.output.clone()
        } else {
            None
        };
        let target_dir = output_dir
            .clone()
            .or_else(|| input_file.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        match process_single_file(cli, processor, operation, input_file, output_target.as_deref(), &target_dir) {
            Ok(()) => processed_count += 1,
            Err(e) => {
                error!("❌ Failed to process {}: {:#}", input_file.display(), e);
                failed_count += 1;
            },
        }

        if let Some(ref pb) = indicatif_progress {
            pb.inc(1);
        }
    }

    if let Some(pb) = indicatif_progress {
        pb.finish_with_message(format!(
            "Completed! Processed: {processed_count}, Failed: {failed_count}"
        ));
    }

    if failed_count > 0 {
        warn!("Some files failed to process. Processed: {processed_count}, Failed: {failed_count}");
    }

    if file_count > 1 {
        let batch_total_time = batch_start_time.elapsed();
        info!("📊 Batch processing summary:");
        info!("  ├─ Files processed: {}", processed_count);
        info!("  ├─ Files failed: {}", failed_count);
        info!("  ├─ Total time: {:.2}s", batch_total_time.as_secs_f64());
        info!(
            "  └─ Average per file: {:.2}s",
            if processed_count > 0 {
                batch_total_time.as_secs_f64() / (processed_count as f64)
            } else {
                0.0
            }
        );
    }

    if processed_count == 0 {
        anyhow::bail!("No input could be processed");
    }
    Ok(processed_count)
}

/// Process an image read from stdin; output goes to stdout unless `-o` names a file
async fn process_stdin(cli: &Cli, processor: &RetouchProcessor, operation: &Operation) -> Result<usize> {
    info!("Reading image from stdin");
    let image_data = read_stdin()?;

    let mut result = processor
        .process_bytes(image_data, operation.clone())
        .await
        .context("Failed to process stdin image")?;

    match cli.command.io().output.as_deref() {
        Some(target) if target != "-" => {
            let output_path = PathBuf::from(target);
            let format = output_format(cli, processor, Some(&output_path));
            save(cli, processor, operation, &mut result, &output_path, format)?;
        },
        _ => {
            let format = output_format(cli, processor, None);
            let data = result.to_bytes(format, quality(cli, processor, operation))?;
            write_stdout(&data)?;
            info!("Image written to stdout");
        },
    }
    Ok(1)
}

/// Process one file and write its output
fn process_single_file(
    cli: &Cli,
    processor: &RetouchProcessor,
    operation: &Operation,
    input_path: &Path,
    output_target: Option<&str>,
    target_dir: &Path,
) -> Result<()> {
    let mut tracker = if cli.progress {
        ProgressTracker::console(cli.verbose > 0)
    } else {
        ProgressTracker::no_op()
    };

    let mut result = processor
        .process_file_with_progress(input_path, operation, &mut tracker)
        .map_err(|e| {
            events::error_with_context(&e, &input_path.display().to_string());
            e
        })
        .with_context(|| format!("Failed to apply {operation}"))?;

    let timings = result.timings();
    info!("📊 Processing breakdown for {}:", input_path.display());
    info!("  ├─ Image Decode: {}ms", timings.image_decode_ms);
    if result.metadata.faces_detected.is_some() {
        info!("  ├─ Detection: {}ms", timings.detection_ms);
    }
    if let Some(tier) = result.metadata.segmentation_tier {
        info!("  ├─ Segmentation ({}): {}ms", tier, timings.segmentation_ms);
    }
    info!("  ├─ Processing: {}ms", timings.processing_ms);

    match output_target {
        Some("-") => {
            let format = output_format(cli, processor, None);
            let data = result.to_bytes(format, quality(cli, processor, operation))?;
            write_stdout(&data)?;
        },
        Some(target) => {
            let output_path = PathBuf::from(target);
            let format = output_format(cli, processor, Some(&output_path));
            save(cli, processor, operation, &mut result, &output_path, format)?;
        },
        None => {
            let format = output_format(cli, processor, None);
            let tool = operation.name().replace('-', "_");
            let output_path = ImageIOService::output_path(target_dir, &tool, format);
            save(cli, processor, operation, &mut result, &output_path, format)?;
        },
    }

    tracker.report_completion(result.timings());
    events::performance_metric(operation.name(), result.timings().total_ms);
    info!(
        "  └─ Total: {}ms ({:.2}s)",
        result.timings().total_ms,
        result.timings().total_ms as f64 / 1000.0
    );
    Ok(())
}

fn save(
    cli: &Cli,
    processor: &RetouchProcessor,
    operation: &Operation,
    result: &mut RetouchResult,
    output_path: &Path,
    format: OutputFormat,
) -> Result<()> {
    if matches!(operation, Operation::RemoveBackground) {
        OutputFormatHandler::warn_if_transparency_lost(format);
    }
    result
        .save_timed(output_path, format, quality(cli, processor, operation))
        .with_context(|| format!("Failed to save result to {}", output_path.display()))?;

    if cli.metadata {
        let sidecar = output_path.with_extension("json");
        let json = result.metadata_json()?;
        std::fs::write(&sidecar, json)
            .with_context(|| format!("Failed to write metadata to {}", sidecar.display()))?;
    }
    info!("Image saved to: {}", output_path.display());
    Ok(())
}

/// Explicit `--format`, then the output file extension, then the configuration
fn output_format(cli: &Cli, processor: &RetouchProcessor, output_path: Option<&Path>) -> OutputFormat {
    if let Some(format) = cli.format {
        return format.into();
    }
    output_path
        .and_then(|p| p.extension())
        .and_then(|ext| ext.to_str())
        .and_then(OutputFormat::from_extension)
        .unwrap_or(processor.config().output_format)
}

fn quality(cli: &Cli, processor: &RetouchProcessor, operation: &Operation) -> u8 {
    cli.quality
        .unwrap_or_else(|| processor.output_quality(operation))
}

/// Expand files and directories into a sorted list of image files
fn collect_input_files(io_args: &InputArgs) -> Result<Vec<PathBuf>> {
    let mut all_files = Vec::new();

    for input in &io_args.input {
        let path = PathBuf::from(input);
        if path.is_file() {
            if ImageIOService::is_supported_format(&path) {
                all_files.push(path);
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            all_files.extend(find_image_files(&path, io_args.recursive, io_args.pattern.as_deref())?);
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }

    all_files.sort();
    all_files.dedup();
    Ok(all_files)
}

/// Validate or create the output directory used when several files are processed
fn prepare_output_dir(output: Option<&str>, file_count: usize) -> Result<Option<PathBuf>> {
    let Some(output) = output else {
        return Ok(None);
    };
    if file_count <= 1 {
        return Ok(None);
    }
    if output == "-" {
        anyhow::bail!("Cannot use stdout (-) as output when processing multiple files");
    }
    let output_path = PathBuf::from(output);
    if output_path.is_file() {
        anyhow::bail!(
            "Output path exists and is a file, not a directory: {}",
            output_path.display()
        );
    }
    if !output_path.exists() {
        std::fs::create_dir_all(&output_path).with_context(|| {
            format!("Failed to create output directory: {}", output_path.display())
        })?;
    }
    Ok(Some(output_path))
}

fn read_stdin() -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    io::stdin()
        .read_to_end(&mut buffer)
        .context("Failed to read image data from stdin")?;
    if buffer.is_empty() {
        anyhow::bail!("No data received from stdin");
    }
    Ok(buffer)
}

fn write_stdout(data: &[u8]) -> Result<()> {
    io::stdout()
        .write_all(data)
        .context("Failed to write image data to stdout")?;
    io::stdout().flush().context("Failed to flush stdout")?;
    Ok(())
}

/// Find image files in a directory
fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    for entry in walkdir::WalkDir::new(dir).max_depth(max_depth) {
        let entry = entry?;
        if entry.file_type().is_file() {
            let path = entry.path();
            if ImageIOService::is_supported_format(path) && matches_pattern(path, pattern) {
                files.push(path.to_path_buf());
            }
        }
    }
    Ok(files)
}

/// Check a file name against an optional glob pattern
fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pat) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|filename| {
                glob::Pattern::new(pat)
                    .map(|p| p.matches(filename))
                    .unwrap_or(false)
            }),
        None => true,
    }
}
