//! Run the link replacement on a single image file
//! Run with: cargo run --release --bin scrub_image -- <input> [output]

use anyhow::{Context, Result};
use post_relay::{Config, ImagePipeline};
use std::path::{Path, PathBuf};
use tracing::info;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("post_relay=debug")
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(input) = args.get(1).map(PathBuf::from) else {
        eprintln!("Usage: scrub_image <input> [output]");
        std::process::exit(2);
    };
    let output = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| default_output(&input));

    let config = Config::without_feed().context("Failed to load configuration")?;
    info!(
        "Replacing /{}/ with '{}'",
        config.image.old_link_pattern, config.branding.target_link
    );

    let pipeline = ImagePipeline::from_config(&config)?;

    let bytes = std::fs::read(&input).with_context(|| format!("Cannot read {}", input.display()))?;
    let result = pipeline.process(&bytes);

    std::fs::write(&output, &result.bytes)
        .with_context(|| format!("Cannot write {}", output.display()))?;

    println!("\n=== Results ===");
    println!("Input:    {}", input.display());
    println!("Output:   {}", output.display());
    println!("Modified: {}", if result.modified { "yes" } else { "no" });

    Ok(())
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());
    input.with_file_name(format!("{}_scrubbed.png", stem))
}
