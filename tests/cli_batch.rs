//! CLI integration tests for batch and stream processing

#![cfg(feature = "cli")]

use image::{Rgb, RgbImage};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_photo-retouch"))
}

fn write_fixture(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_fn(24, 18, |x, y| Rgb([(x * 10) as u8, (y * 12) as u8, 90]))
        .save(&path)
        .expect("Failed to write fixture");
    path
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .expect("Failed to read output directory")
        .filter_map(std::result::Result::ok)
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn test_batch_directory_writes_one_output_per_image() {
    let input = TempDir::new().expect("Failed to create temp directory");
    let output = TempDir::new().expect("Failed to create temp directory");
    for name in ["z_last.png", "a_first.png", "img10.jpg"] {
        write_fixture(input.path(), name);
    }
    std::fs::write(input.path().join("notes.txt"), "not an image").unwrap();

    let status = cli()
        .args(["filter", "-k", "sepia"])
        .arg(input.path())
        .arg("-o")
        .arg(output.path().join("results"))
        .status()
        .expect("Failed to execute CLI");
    assert!(status.success());

    let outputs = files_in(&output.path().join("results"));
    assert_eq!(outputs.len(), 3, "{outputs:?}");
    assert!(outputs.iter().all(|n| n.starts_with("filter_") && n.ends_with(".png")));
}

#[test]
fn test_single_file_output_format_follows_extension() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let input = write_fixture(dir.path(), "portrait.png");
    let target = dir.path().join("cutout.tiff");

    let status = cli()
        .arg("--metadata")
        .arg("remove-bg")
        .arg(&input)
        .arg("-o")
        .arg(&target)
        .status()
        .expect("Failed to execute CLI");
    assert!(status.success());

    let decoded = image::open(&target).expect("Output should decode");
    assert_eq!(decoded.color(), image::ColorType::Rgba8);

    let metadata = std::fs::read_to_string(dir.path().join("cutout.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&metadata).unwrap();
    assert_eq!(json["operation"], "remove-background");
}

#[test]
fn test_stdin_to_stdout() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let input = write_fixture(dir.path(), "in.png");
    let bytes = std::fs::read(input).unwrap();

    let mut child = cli()
        .args(["-f", "jpeg", "adjust", "--brightness", "0.1", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn CLI");
    child.stdin.take().unwrap().write_all(&bytes).unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    let decoded = image::load_from_memory(&output.stdout).expect("stdout should be an image");
    assert_eq!((decoded.width(), decoded.height()), (24, 18));
    assert_eq!(output.stdout.get(..2), Some(&[0xFF, 0xD8][..]));
}

#[test]
fn test_invalid_parameters_fail() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let input = write_fixture(dir.path(), "in.png");

    let status = cli()
        .args(["beauty", "--smoothing", "3"])
        .arg(&input)
        .stderr(Stdio::null())
        .status()
        .expect("Failed to execute CLI");
    assert!(!status.success());

    let status = cli()
        .args(["blur-bg"])
        .arg(dir.path().join("missing.png"))
        .stderr(Stdio::null())
        .status()
        .expect("Failed to execute CLI");
    assert!(!status.success());
}
