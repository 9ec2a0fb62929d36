mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use embed_svc::config::ServiceConfig;
use embed_svc::server;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "embed-svc", version, about = "all-MiniLM-L6-v2 sentence embedding service")]
struct Cli {
    /// Path to a TOML config file (defaults to <config dir>/embed-svc/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Load the model and serve HTTP (default)
    Serve,
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Check model assets and run a sample embedding
    Doctor,
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download model.onnx and tokenizer.json into the model directory
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ServiceConfig::load_from(path)?,
        None => ServiceConfig::load()?,
    };

    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            server::serve(config).await?;
        }
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.model).await?;
            }
        },
        Command::Doctor => {
            cli::doctor::doctor(&config)?;
        }
    }

    Ok(())
}
