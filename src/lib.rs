//! # media-dl
//!
//! Download-job lifecycle engine for media URLs.
//!
//! A submitted URL becomes a job: its bytes are fetched in the background
//! (rotating request identities until one works), optionally transcoded, and
//! either written to the download directory or kept as a short-lived temp
//! artifact that can be served or redeemed exactly once.
//!
//! ## Design Philosophy
//!
//! - **Poll or stream** - Every job has a progress snapshot from the moment
//!   its id is returned; subscribers get each change as it happens
//! - **Pluggable collaborators** - The media source and the transcoder are
//!   traits with external-tool and no-op implementations
//! - **Sensible defaults** - Works out of the box when `yt-dlp` and `ffmpeg`
//!   are on the `PATH`
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, JobRequest, MediaDownloader, OutputFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = MediaDownloader::new(Config::default()).await?;
//!
//!     let job_id = downloader
//!         .submit(JobRequest::new(
//!             "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
//!             OutputFormat::Audio,
//!         ))
//!         .await?;
//!
//!     println!("{:?}", downloader.get_progress(&job_id));
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Temp artifact store
pub mod artifacts;
/// Request identity rotation
pub mod bypass;
/// Transcoding collaborators
pub mod codec;
/// Configuration types
pub mod config;
/// Core downloader implementation (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Job progress store
pub mod progress;
/// Proxy health monitoring
pub mod proxy_health;
/// Sliding-window rate limiting
pub mod rate_limiter;
/// Strategy fallback for upstream requests
pub mod retry;
/// Media source collaborators
pub mod source;
/// Core types
pub mod types;
/// Utility functions
pub mod utils;

use std::sync::Arc;

// Re-export commonly used types
pub use artifacts::TempArtifactStore;
pub use bypass::{BypassRotator, RequestProfile};
pub use codec::{FfmpegTranscoder, NoOpTranscoder, TranscodeRequest, Transcoder, TranscoderCapabilities};
pub use config::{ClientIpMode, Config, PreviewStrategy, ProxyConfig};
pub use downloader::{JobRequest, MediaDownloader};
pub use error::{ApiError, Error, ErrorDetail, Result, ToHttpStatus};
pub use progress::{ProgressStore, ProgressUpdate};
pub use proxy_health::ProxyHealthMonitor;
pub use rate_limiter::{Admission, SlidingWindowLimiter};
pub use source::{MediaStream, NoOpSource, SourceAdapter, YtDlpSource};
pub use types::{
    ArtifactHandle, Capabilities, JobId, JobStatus, MediaMetadata, OutputFormat, PreviewInfo,
    ProgressSnapshot, ProxyHealthRecord, ProxyStatus, RateLimitStats, TempArtifact,
};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use media_dl::{MediaDownloader, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let downloader = MediaDownloader::new(config).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(downloader).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: MediaDownloader) -> Result<()> {
    wait_for_signal().await;
    downloader.shutdown().await
}

/// Serve the REST API until a termination signal, then shut the downloader down
///
/// The listener stops first so no new job can arrive while running jobs are
/// being cancelled.
pub async fn serve_with_shutdown(downloader: Arc<MediaDownloader>) -> Result<()> {
    let config = Arc::new(downloader.config().clone());
    api::start_api_server_with_shutdown(downloader.clone(), config, wait_for_signal()).await?;
    downloader.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
