//! Photo retouching CLI tool
//!
//! Command-line front end for the beauty pipeline, background operations,
//! tone filters, colour adjustment, repair and ID photos.

#[cfg(feature = "cli")]
use photo_retouch::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
