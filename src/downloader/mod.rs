//! Core downloader implementation split into focused submodules.
//!
//! The `MediaDownloader` struct and its methods are organized by domain:
//! - [`submit`] - Job admission (validation, rate limiting, seeding)
//! - [`pipeline`] - Fetch / transcode / place execution for one job
//! - [`preview`] - Metadata preview through the strategy chain
//! - [`artifacts`] - Serving and redeeming temp artifacts
//! - [`status`] - Progress queries, progress streams, proxy status, cancellation
//! - [`lifecycle`] - Startup sweep, background services, shutdown

mod artifacts;
mod lifecycle;
mod pipeline;
mod preview;
mod status;
mod submit;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use submit::JobRequest;

use crate::artifacts::TempArtifactStore;
use crate::bypass::BypassRotator;
use crate::codec::{FfmpegTranscoder, NoOpTranscoder, Transcoder};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::progress::ProgressStore;
use crate::proxy_health::ProxyHealthMonitor;
use crate::rate_limiter::SlidingWindowLimiter;
use crate::source::{NoOpSource, SourceAdapter, YtDlpSource};
use crate::types::JobId;
use crate::utils::SourceUrlPolicy;

/// In-flight job tracking
#[derive(Clone)]
pub(crate) struct JobState {
    /// Map of running jobs to their cancellation tokens
    pub(crate) active_jobs: std::sync::Arc<
        tokio::sync::Mutex<
            std::collections::HashMap<JobId, tokio_util::sync::CancellationToken>,
        >,
    >,
    /// Flag to indicate whether new jobs are accepted (set to false during shutdown)
    pub(crate) accepting_new: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

/// External collaborators, resolved once at startup
#[derive(Clone)]
pub(crate) struct Collaborators {
    /// Upstream media source (trait object for pluggable implementations)
    pub(crate) source: std::sync::Arc<dyn SourceAdapter>,
    /// Codec; `capabilities().can_transcode` decides whether audio is converted
    pub(crate) transcoder: std::sync::Arc<dyn Transcoder>,
    /// Request identity rotation
    pub(crate) rotator: std::sync::Arc<BypassRotator>,
    /// Proxy health monitor, when a proxy is configured
    pub(crate) proxy_monitor: Option<std::sync::Arc<ProxyHealthMonitor>>,
}

/// Background services owned by the downloader
#[derive(Clone)]
pub(crate) struct Services {
    /// Cancelled on shutdown to stop background loops
    pub(crate) shutdown: tokio_util::sync::CancellationToken,
    /// Handles of spawned background loops
    pub(crate) handles: std::sync::Arc<tokio::sync::Mutex<Vec<tokio::task::JoinHandle<()>>>>,
}

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct MediaDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: std::sync::Arc<Config>,
    /// Job progress snapshots; the single source of truth for pollers
    pub(crate) progress: ProgressStore,
    /// Finished artifacts awaiting one-time redemption
    pub(crate) artifacts: TempArtifactStore,
    /// Admission gate for job-initiating requests
    pub(crate) rate_limiter: std::sync::Arc<SlidingWindowLimiter>,
    /// Accepted source URL shapes
    pub(crate) url_policy: std::sync::Arc<SourceUrlPolicy>,
    /// Source, codec, identity rotation and proxy health
    pub(crate) collaborators: Collaborators,
    /// In-flight job tracking
    pub(crate) job_state: JobState,
    /// Background services
    pub(crate) services: Services,
}

impl MediaDownloader {
    /// Create a new MediaDownloader instance
    ///
    /// Resolves the external collaborators (yt-dlp and ffmpeg) from the
    /// configured paths or PATH, then continues as
    /// [`with_components`](Self::with_components).
    pub async fn new(config: Config) -> Result<Self> {
        let source: std::sync::Arc<dyn SourceAdapter> =
            match (&config.tools.yt_dlp_path, config.tools.search_path) {
                (Some(path), _) => std::sync::Arc::new(YtDlpSource::new(path.clone())),
                (None, true) => match YtDlpSource::from_path() {
                    Some(source) => std::sync::Arc::new(source),
                    None => {
                        tracing::warn!("yt-dlp not found in PATH, media fetching is disabled");
                        std::sync::Arc::new(NoOpSource)
                    }
                },
                (None, false) => std::sync::Arc::new(NoOpSource),
            };

        let bitrate = config.tools.audio_bitrate_kbps;
        let transcoder: std::sync::Arc<dyn Transcoder> =
            match (&config.tools.ffmpeg_path, config.tools.search_path) {
                (Some(path), _) => std::sync::Arc::new(FfmpegTranscoder::new(path.clone(), bitrate)),
                (None, true) => match FfmpegTranscoder::from_path(bitrate) {
                    Some(ffmpeg) => std::sync::Arc::new(ffmpeg),
                    None => {
                        tracing::warn!(
                            "ffmpeg not found in PATH, audio will be saved without conversion"
                        );
                        std::sync::Arc::new(NoOpTranscoder)
                    }
                },
                (None, false) => std::sync::Arc::new(NoOpTranscoder),
            };

        Self::with_components(config, source, transcoder).await
    }

    /// Create a downloader around explicit collaborators
    ///
    /// This initializes all core components:
    /// - Validates configuration and creates the download and temp directories
    /// - Sweeps orphaned temp files left by a previous process
    /// - Starts the proxy health monitor when a proxy is configured
    pub async fn with_components(
        config: Config,
        source: std::sync::Arc<dyn SourceAdapter>,
        transcoder: std::sync::Arc<dyn Transcoder>,
    ) -> Result<Self> {
        config.validate()?;

        // Ensure download and temp directories exist
        for (dir, what) in [
            (&config.download.download_dir, "download"),
            (&config.download.temp_dir, "temp"),
        ] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create {} directory '{}': {}", what, dir.display(), e),
                ))
            })?;
        }

        let url_policy = SourceUrlPolicy::new(&config.download.accepted_url_patterns)?;
        let rate_limiter = SlidingWindowLimiter::from_config(&config.server.api.rate_limit);
        let artifacts =
            TempArtifactStore::new(config.download.temp_dir.clone(), config.download.artifact_ttl);

        let proxy_monitor = match &config.proxy {
            Some(proxy) => Some(std::sync::Arc::new(ProxyHealthMonitor::new(proxy.clone())?)),
            None => None,
        };
        let rotator = BypassRotator::new(config.bypass.clone(), proxy_monitor.clone());

        tracing::info!(
            source = source.name(),
            transcoder = transcoder.name(),
            transcoding = transcoder.capabilities().can_transcode,
            proxy = proxy_monitor.is_some(),
            "media downloader initialized"
        );

        let downloader = Self {
            config: std::sync::Arc::new(config),
            progress: ProgressStore::new(),
            artifacts,
            rate_limiter: std::sync::Arc::new(rate_limiter),
            url_policy: std::sync::Arc::new(url_policy),
            collaborators: Collaborators {
                source,
                transcoder,
                rotator: std::sync::Arc::new(rotator),
                proxy_monitor,
            },
            job_state: JobState {
                active_jobs: std::sync::Arc::new(tokio::sync::Mutex::new(
                    std::collections::HashMap::new(),
                )),
                accepting_new: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true)),
            },
            services: Services {
                shutdown: tokio_util::sync::CancellationToken::new(),
                handles: std::sync::Arc::new(tokio::sync::Mutex::new(Vec::new())),
            },
        };

        downloader.sweep_orphaned_artifacts().await;
        downloader.start_proxy_monitor().await;

        Ok(downloader)
    }

    /// Configuration this downloader was built with
    pub fn config(&self) -> &Config {
        &self.config
    }
}
