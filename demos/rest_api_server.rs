//! REST API server example
//!
//! This example shows how to run media-dl with the REST API enabled,
//! allowing control via HTTP endpoints.
//!
//! After starting, you can:
//! - View Swagger UI at http://localhost:6790/swagger-ui
//! - Submit a job via POST http://localhost:6790/submit
//! - Poll progress via GET http://localhost:6790/progress?jobId=...
//! - Stream progress via GET http://localhost:6790/progress/stream?jobId=...

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use media_dl::MediaDownloader;
use media_dl::config::{ApiConfig, Config, DownloadConfig, RateLimitConfig, ServerIntegrationConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // Configure API
    let api_config = ApiConfig {
        bind_address: "127.0.0.1:6790".parse::<SocketAddr>()?,
        cors_enabled: true,
        cors_origins: vec!["*".to_string()],
        swagger_ui: true,
        rate_limit: RateLimitConfig {
            enabled: true,
            max_requests: 10,
            window: Duration::from_secs(60),
        },
    };

    // Build configuration
    let config = Config {
        download: DownloadConfig {
            download_dir: "downloads".into(),
            temp_dir: "temp".into(),
            artifact_ttl: Duration::from_secs(120),
            ..Default::default()
        },
        server: ServerIntegrationConfig { api: api_config },
        ..Default::default()
    };

    // Create downloader instance (yt-dlp and ffmpeg are looked up on PATH)
    let downloader = Arc::new(MediaDownloader::new(config).await?);

    let caps = downloader.capabilities();
    println!("Starting media-dl REST API server");
    println!("  source: {}, transcoder: {}", caps.source, caps.transcoder);
    println!("  Swagger UI: http://localhost:6790/swagger-ui");
    println!();
    println!("Example commands:");
    println!("  # Submit a job");
    println!("  curl -X POST http://localhost:6790/submit \\");
    println!("    -H 'Content-Type: application/json' \\");
    println!(
        "    -d '{{\"url\": \"https://www.youtube.com/watch?v=dQw4w9WgXcQ\", \"format\": \"AUDIO\"}}'"
    );
    println!();
    println!("  # Follow its progress (Server-Sent Events)");
    println!("  curl -N 'http://localhost:6790/progress/stream?jobId=<jobId>'");

    // Serve until Ctrl+C, then shut down gracefully
    media_dl::serve_with_shutdown(downloader).await?;

    Ok(())
}
