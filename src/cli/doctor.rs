//! CLI `doctor` command: check model assets, load them, and run a sample embedding.

use anyhow::{Context, Result};
use embed_svc::config::ServiceConfig;
use embed_svc::embedding::{self, MODEL_NAME};
use std::path::Path;

const SAMPLE_TEXT: &str = "The quick brown fox jumps over the lazy dog";

/// Print an asset report, then load the pipeline and embed a sample sentence.
/// Fails if the assets cannot be loaded or the sample does not embed.
pub fn doctor(config: &ServiceConfig) -> Result<()> {
    println!("embed-svc Health Report");
    println!("=======================");
    println!();
    println!("Model:             {MODEL_NAME}");
    println!("Model dir:         {}", config.model.resolved_dir().display());
    println!("Max length:        {}", config.model.max_length);
    println!("Listen address:    {}", config.bind_addr());
    println!();
    println!("Assets:");
    report_asset("model.onnx", &config.model.model_path());
    report_asset("tokenizer.json", &config.model.tokenizer_path());
    println!();

    let embedder = embedding::load_local(&config.model)
        .context("failed to load model assets (run `embed-svc model download`)")?;
    let vector = embedder
        .embed(SAMPLE_TEXT)
        .context("sample embedding failed")?;
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();

    println!("Sample embedding:");
    println!("  Dimensions:      {}", vector.len());
    println!("  L2 norm:         {norm:.6}");
    println!();
    println!("Status:            OK");
    Ok(())
}

fn report_asset(label: &str, path: &Path) {
    match std::fs::metadata(path) {
        Ok(meta) => println!("  {label:<16} {} ({})", path.display(), format_bytes(meta.len())),
        Err(_) => println!("  {label:<16} MISSING at {}", path.display()),
    }
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
