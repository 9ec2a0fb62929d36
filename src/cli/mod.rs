pub mod doctor;

use anyhow::{Context, Result};
use embed_svc::config::ModelConfig;
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

const MODEL_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

/// Download the ONNX model and tokenizer into the model directory.
/// Files that already exist are left alone.
pub async fn model_download(config: &ModelConfig) -> Result<()> {
    let model_dir = config.resolved_dir();
    std::fs::create_dir_all(&model_dir)
        .with_context(|| format!("failed to create model dir: {}", model_dir.display()))?;

    for (url, dest) in [
        (MODEL_URL, config.model_path()),
        (TOKENIZER_URL, config.tokenizer_path()),
    ] {
        if dest.exists() {
            println!("Already exists: {}", dest.display());
            continue;
        }
        println!("Downloading {url}");
        download_file(url, &dest).await?;
        let size = std::fs::metadata(&dest).map(|m| m.len()).unwrap_or(0);
        println!("  Saved: {} ({})", dest.display(), doctor::format_bytes(size));
    }

    println!("Model download complete");
    Ok(())
}

/// Download a file from a URL with progress bar. Uses atomic write (tmp + rename).
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let mut response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;

    anyhow::ensure!(
        response.status().is_success(),
        "download failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")?
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let progress = &pb;
    write_atomically(dest, |mut file| async move {
        while let Some(chunk) = response.chunk().await.context("error reading response")? {
            file.write_all(&chunk)
                .await
                .context("error writing to file")?;
            progress.inc(chunk.len() as u64);
        }
        Ok::<_, anyhow::Error>(file)
    })
    .await?;

    pb.finish_and_clear();
    Ok(())
}

/// Run `write` against `<dest>.tmp`, then rename it over `dest`.
/// On any failure the temp file is removed and `dest` is left untouched.
async fn write_atomically<F, Fut>(dest: &Path, write: F) -> Result<()>
where
    F: FnOnce(File) -> Fut,
    Fut: Future<Output = Result<File>>,
{
    let tmp_path = dest.with_extension("tmp");
    let file = File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

    let finished = async {
        let mut file = write(file).await?;
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, dest)
            .await
            .context("failed to rename temp file")
    }
    .await;

    if finished.is_err() {
        if let Err(e) = tokio::fs::remove_file(&tmp_path).await {
            tracing::warn!(path = %tmp_path.display(), error = %e, "failed to remove temp file");
        }
    }
    finished
}
