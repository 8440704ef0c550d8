//! CLI entry point for the media-dl service.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use media_dl::{Config, MediaDownloader};
use tracing::{debug, info};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.default_log_level()));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let config = load_config(&args)?;
    info!(
        bind = %config.server.api.bind_address,
        download_dir = %config.download.download_dir.display(),
        temp_dir = %config.download.temp_dir.display(),
        "media-dl starting"
    );

    let downloader = Arc::new(
        MediaDownloader::new(config)
            .await
            .context("failed to initialize downloader")?,
    );

    media_dl::serve_with_shutdown(downloader)
        .await
        .context("API server failed")?;

    info!("media-dl stopped");
    Ok(())
}

/// Config file (if any) with CLI overrides applied
fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            serde_json::from_str::<Config>(&raw)
                .with_context(|| format!("invalid config file {}", path.display()))?
        }
        None => Config::default(),
    };

    if let Some(bind) = args.bind {
        config.server.api.bind_address = bind;
    }
    if let Some(dir) = &args.download_dir {
        config.download.download_dir = dir.clone();
    }
    if let Some(dir) = &args.temp_dir {
        config.download.temp_dir = dir.clone();
    }
    Ok(config)
}
