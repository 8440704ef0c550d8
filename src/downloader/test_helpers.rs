//! Shared test helpers for creating MediaDownloader instances in tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tempfile::tempdir;
use url::Url;

use crate::bypass::RequestProfile;
use crate::codec::{NoOpTranscoder, TranscodeRequest, Transcoder, TranscoderCapabilities};
use crate::config::{Config, PreviewStrategy};
use crate::downloader::MediaDownloader;
use crate::error::{Error, Result};
use crate::source::{MediaStream, SourceAdapter};
use crate::types::{JobId, MediaMetadata, OutputFormat, ProgressSnapshot};

pub(crate) const VALID_URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

/// Source that serves fixed bytes in small chunks
pub(crate) struct StaticSource {
    pub(crate) title: String,
    pub(crate) body: Vec<u8>,
    pub(crate) chunk_size: usize,
    /// Delay before each chunk
    pub(crate) chunk_delay: Duration,
    pub(crate) metadata_calls: AtomicU32,
}

impl StaticSource {
    pub(crate) fn new(title: &str, body: &[u8]) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_vec(),
            chunk_size: 4,
            chunk_delay: Duration::ZERO,
            metadata_calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn slow(mut self, chunk_delay: Duration) -> Self {
        self.chunk_delay = chunk_delay;
        self
    }
}

#[async_trait]
impl SourceAdapter for StaticSource {
    async fn fetch_metadata(
        &self,
        _url: &Url,
        _format: Option<OutputFormat>,
        _profile: &RequestProfile,
    ) -> Result<MediaMetadata> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        Ok(MediaMetadata {
            title: self.title.clone(),
            description: "test media".into(),
            channel_name: Some("Test Channel".into()),
            duration_secs: Some(61),
            view_count: Some(1_234),
            video_id: Some("dQw4w9WgXcQ".into()),
            filesize: Some(self.body.len() as u64),
            ..Default::default()
        })
    }

    async fn open_stream(
        &self,
        _url: &Url,
        _format: OutputFormat,
        _profile: &RequestProfile,
    ) -> Result<MediaStream> {
        let chunks: Vec<Bytes> = self
            .body
            .chunks(self.chunk_size.max(1))
            .map(Bytes::copy_from_slice)
            .collect();
        let delay = self.chunk_delay;
        let body = futures::stream::iter(chunks)
            .then(move |chunk| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok::<_, std::io::Error>(chunk)
            })
            .boxed();
        Ok(MediaStream {
            total_bytes: Some(self.body.len() as u64),
            body,
        })
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Source whose metadata lookups fail for a given set of strategies
pub(crate) struct FlakySource {
    pub(crate) inner: StaticSource,
    pub(crate) failing: Vec<PreviewStrategy>,
    pub(crate) unavailable: bool,
    pub(crate) attempts: AtomicU32,
}

impl FlakySource {
    pub(crate) fn failing_for(failing: Vec<PreviewStrategy>) -> Self {
        Self {
            inner: StaticSource::new("Flaky Title", b"flaky bytes"),
            failing,
            unavailable: false,
            attempts: AtomicU32::new(0),
        }
    }

    pub(crate) fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::failing_for(Vec::new())
        }
    }
}

#[async_trait]
impl SourceAdapter for FlakySource {
    async fn fetch_metadata(
        &self,
        url: &Url,
        format: Option<OutputFormat>,
        profile: &RequestProfile,
    ) -> Result<MediaMetadata> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(Error::NotFound("Video unavailable".into()));
        }
        if self.failing.contains(&profile.strategy) {
            return Err(Error::UpstreamUnavailable(format!(
                "blocked for {:?}",
                profile.strategy
            )));
        }
        self.inner.fetch_metadata(url, format, profile).await
    }

    async fn open_stream(
        &self,
        url: &Url,
        format: OutputFormat,
        profile: &RequestProfile,
    ) -> Result<MediaStream> {
        self.inner.open_stream(url, format, profile).await
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

/// Source whose byte stream breaks after the first chunk
pub(crate) struct BrokenStreamSource;

#[async_trait]
impl SourceAdapter for BrokenStreamSource {
    async fn fetch_metadata(
        &self,
        _url: &Url,
        _format: Option<OutputFormat>,
        _profile: &RequestProfile,
    ) -> Result<MediaMetadata> {
        Ok(MediaMetadata {
            title: "Broken".into(),
            filesize: Some(100),
            ..Default::default()
        })
    }

    async fn open_stream(
        &self,
        _url: &Url,
        _format: OutputFormat,
        _profile: &RequestProfile,
    ) -> Result<MediaStream> {
        let items: Vec<std::io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::from(std::io::ErrorKind::ConnectionReset)),
        ];
        Ok(MediaStream {
            total_bytes: Some(100),
            body: futures::stream::iter(items).boxed(),
        })
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

/// Transcoder that copies input to output, reporting 50% then 100%
pub(crate) struct CopyTranscoder {
    pub(crate) fail: bool,
}

#[async_trait]
impl Transcoder for CopyTranscoder {
    async fn transcode(
        &self,
        request: TranscodeRequest<'_>,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> Result<()> {
        on_progress(50);
        if self.fail {
            tokio::fs::write(request.output, b"garbage").await?;
            return Err(Error::Codec("simulated encoder crash".into()));
        }
        tokio::fs::copy(request.input, request.output).await?;
        on_progress(100);
        Ok(())
    }

    fn capabilities(&self) -> TranscoderCapabilities {
        TranscoderCapabilities {
            can_transcode: true,
        }
    }

    fn name(&self) -> &'static str {
        "copy"
    }
}

/// Transcoder that copies input to output and then fires `cancel`, so the
/// job is cancelled after its output exists but before it is placed
pub(crate) struct CancellingTranscoder {
    pub(crate) cancel: std::sync::Mutex<Option<tokio_util::sync::CancellationToken>>,
}

impl CancellingTranscoder {
    pub(crate) fn new() -> Self {
        Self {
            cancel: std::sync::Mutex::new(None),
        }
    }

    /// Arm with the token of the job to cancel
    pub(crate) fn arm(&self, token: tokio_util::sync::CancellationToken) {
        *self.cancel.lock().unwrap() = Some(token);
    }
}

#[async_trait]
impl Transcoder for CancellingTranscoder {
    async fn transcode(
        &self,
        request: TranscodeRequest<'_>,
        _on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> Result<()> {
        tokio::fs::copy(request.input, request.output).await?;
        if let Some(token) = self.cancel.lock().unwrap().take() {
            token.cancel();
        }
        Ok(())
    }

    fn capabilities(&self) -> TranscoderCapabilities {
        TranscoderCapabilities {
            can_transcode: true,
        }
    }

    fn name(&self) -> &'static str {
        "cancelling"
    }
}

/// Token of a running job, for tests that cancel from inside a collaborator
pub(crate) async fn job_token(
    downloader: &MediaDownloader,
    job_id: &JobId,
) -> tokio_util::sync::CancellationToken {
    downloader
        .job_state
        .active_jobs
        .lock()
        .await
        .get(job_id)
        .cloned()
        .expect("job should still be running")
}

/// Config rooted in `root`, rate limiting on with the default window
pub(crate) fn test_config(root: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = root.join("downloads");
    config.download.temp_dir = root.join("temp");
    config.download.artifact_ttl = Duration::from_secs(60);
    config.tools.search_path = false;
    config.bypass.strategy_budget = Duration::from_secs(5);
    config
}

/// Helper to create a test MediaDownloader with the given collaborators.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) async fn create_downloader_with(
    source: Arc<dyn SourceAdapter>,
    transcoder: Arc<dyn Transcoder>,
    configure: impl FnOnce(&mut Config),
) -> (MediaDownloader, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    configure(&mut config);
    let downloader = MediaDownloader::with_components(config, source, transcoder)
        .await
        .unwrap();
    (downloader, temp_dir)
}

/// Helper to create a test MediaDownloader with a static source and no codec.
pub(crate) async fn create_test_downloader() -> (MediaDownloader, tempfile::TempDir) {
    create_downloader_with(
        Arc::new(StaticSource::new("Test Song", b"0123456789abcdef")),
        Arc::new(NoOpTranscoder),
        |_| {},
    )
    .await
}

/// Poll until the job reaches a terminal status
pub(crate) async fn wait_for_terminal(
    downloader: &MediaDownloader,
    job_id: &JobId,
) -> ProgressSnapshot {
    for _ in 0..500 {
        let snapshot = downloader.get_progress(job_id);
        if snapshot.status.is_terminal() {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "job {job_id} did not finish: {:?}",
        downloader.get_progress(job_id)
    );
}

/// Poll until no job task is running any more
pub(crate) async fn wait_until_idle(downloader: &MediaDownloader) {
    for _ in 0..500 {
        if downloader.active_job_count().await == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("jobs still running");
}
