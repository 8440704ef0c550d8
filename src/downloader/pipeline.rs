//! Per-job fetch / transcode / place pipeline.
//!
//! Each job runs in its own task. Progress is written as merges into the
//! [`ProgressStore`](crate::progress::ProgressStore); every failure ends as an
//! `error` snapshot rather than escaping the task.

use futures::StreamExt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::codec::TranscodeRequest;
use crate::error::{Error, Result};
use crate::progress::ProgressUpdate;
use crate::retry::try_strategies;
use crate::source::stream_error;
use crate::types::{ArtifactHandle, JobId, JobStatus, OutputFormat};
use crate::utils::{reserve_unique_path, sanitize_filename};

use super::MediaDownloader;

/// Share of the progress bar given to the fetch when a conversion follows
const FETCH_SHARE_WITH_TRANSCODE: u8 = 50;

/// Where a finished job's file goes
#[derive(Clone, Debug)]
pub(crate) enum JobTarget {
    /// Straight into the download directory
    Permanent,
    /// Into the temp artifact store under this handle
    Temporary(ArtifactHandle),
}

/// Everything a pipeline task needs to know about its job
#[derive(Clone, Debug)]
pub(crate) struct JobSpec {
    pub(crate) id: JobId,
    pub(crate) url: Url,
    pub(crate) format: OutputFormat,
    pub(crate) client_ip: Option<IpAddr>,
    pub(crate) target: JobTarget,
}

/// A fetched (and possibly converted) file waiting to be placed
struct Produced {
    display_name: String,
    output: PathBuf,
}

/// Where placement put a job's file
enum Placement {
    Artifact(ArtifactHandle),
    File(PathBuf),
}

/// Working files of one job inside the temp directory
struct Scratch {
    fetched: PathBuf,
    converted: PathBuf,
}

impl Scratch {
    fn for_job(temp_dir: &Path, id: &JobId) -> Self {
        Self {
            fetched: temp_dir.join(format!("{id}.fetch.part")),
            converted: temp_dir.join(format!("{id}.convert.part")),
        }
    }

    async fn cleanup(&self) {
        for path in [&self.fetched, &self.converted] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "removed working file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove working file"),
            }
        }
    }
}

/// Monotonic percentage within `[floor, ceiling]`
struct ScaledProgress {
    last: AtomicU8,
    floor: u8,
    ceiling: u8,
}

impl ScaledProgress {
    fn new(floor: u8, ceiling: u8) -> Self {
        Self {
            last: AtomicU8::new(floor),
            floor,
            ceiling,
        }
    }

    /// Map `done / total` into the range; `Some` only when the percent grew
    fn advance(&self, done: u64, total: u64) -> Option<u8> {
        if total == 0 {
            return None;
        }
        let span = u64::from(self.ceiling - self.floor);
        let scaled = self.floor + (done.min(total) * span / total) as u8;
        let previous = self.last.fetch_max(scaled, Ordering::Relaxed);
        (scaled > previous).then_some(scaled)
    }
}

impl MediaDownloader {
    /// Spawn the pipeline task for a seeded job
    pub(crate) fn spawn_job(&self, spec: JobSpec, cancel: CancellationToken) {
        let downloader = self.clone();
        tokio::spawn(async move {
            let job_id = spec.id.clone();
            let scratch = Scratch::for_job(&downloader.config.download.temp_dir, &job_id);

            let outcome = downloader.run_guarded(&spec, &scratch, &cancel).await;
            scratch.cleanup().await;

            match outcome {
                Ok(filename) => {
                    tracing::info!(job_id = %job_id, filename = %filename, "job completed");
                    downloader.record(&job_id, ProgressUpdate::completed(filename));
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "job failed");
                    downloader.record(&job_id, ProgressUpdate::failed(e.user_message()));
                }
            }

            downloader.job_state.active_jobs.lock().await.remove(&job_id);
        });
    }

    /// Run the pipeline under the job's cancellation token and fetch timeout
    ///
    /// Only fetching and converting can be interrupted. Placement always runs
    /// to completion, and a cancel that lands while it runs undoes it, so a
    /// job that ends in `error` never leaves a file behind.
    async fn run_guarded(
        &self,
        spec: &JobSpec,
        scratch: &Scratch,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let work = self.produce(spec, scratch);
        let limited = async {
            match self.config.download.fetch_timeout {
                Some(limit) => tokio::time::timeout(limit, work)
                    .await
                    .unwrap_or(Err(Error::Timeout(limit))),
                None => work.await,
            }
        };
        let produced = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = limited => result?,
        };

        let (filename, placement) = self.place(spec, &produced).await?;
        if cancel.is_cancelled() {
            tracing::debug!(job_id = %spec.id, "cancelled during placement");
            self.undo_placement(spec, placement).await;
            return Err(Error::Cancelled);
        }
        Ok(filename)
    }

    /// Move the produced file to the job's target
    async fn place(&self, spec: &JobSpec, produced: &Produced) -> Result<(String, Placement)> {
        match &spec.target {
            JobTarget::Temporary(handle) => {
                let artifact = self
                    .artifacts
                    .adopt(&produced.display_name, Some(handle.clone()), &produced.output)
                    .await?;
                Ok((artifact.display_name, Placement::Artifact(artifact.handle)))
            }
            JobTarget::Permanent => {
                let destination = place_unique(
                    &produced.output,
                    &self.config.download.download_dir,
                    &produced.display_name,
                )
                .await?;
                let filename = destination
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| produced.display_name.clone());
                Ok((filename, Placement::File(destination)))
            }
        }
    }

    async fn undo_placement(&self, spec: &JobSpec, placement: Placement) {
        match placement {
            Placement::Artifact(handle) => {
                self.artifacts.discard(&handle).await;
            }
            Placement::File(path) => {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    tracing::warn!(
                        job_id = %spec.id,
                        path = %path.display(),
                        error = %e,
                        "failed to remove placed file"
                    );
                }
            }
        }
    }

    /// Merge an update into the job's snapshot
    ///
    /// A rejected update is traced and the pipeline carries on.
    pub(crate) fn record(&self, job_id: &JobId, update: ProgressUpdate) {
        if let Err(e) = self.progress.apply(job_id, update) {
            tracing::debug!(job_id = %job_id, error = %e, "progress update not recorded");
        }
    }

    /// Resolve metadata, fetch, and convert when the format needs it
    async fn produce(&self, spec: &JobSpec, scratch: &Scratch) -> Result<Produced> {
        let collaborators = &self.collaborators;
        let budget = self.config.bypass.strategy_budget;

        let (metadata, profile) =
            try_strategies(&collaborators.rotator, spec.client_ip, budget, |profile| {
                let source = collaborators.source.clone();
                let url = spec.url.clone();
                let format = spec.format;
                async move { source.fetch_metadata(&url, Some(format), &profile).await }
            })
            .await?;

        let display_name = format!(
            "{}.{}",
            sanitize_filename(&metadata.title),
            spec.format.extension()
        );
        let transcode = spec.format == OutputFormat::Audio
            && collaborators.transcoder.capabilities().can_transcode;
        tracing::debug!(
            job_id = %spec.id,
            strategy = ?profile.strategy,
            title = %metadata.title,
            transcode,
            "metadata resolved"
        );

        // fetch
        let fetch_ceiling = if transcode { FETCH_SHARE_WITH_TRANSCODE } else { 99 };
        let fetch_progress = ScaledProgress::new(0, fetch_ceiling);
        let mut stream = collaborators
            .source
            .open_stream(&spec.url, spec.format, &profile)
            .await?;
        let total = stream.total_bytes.or(metadata.filesize).unwrap_or(0);

        let mut file = tokio::fs::File::create(&scratch.fetched).await?;
        let mut written = 0u64;
        while let Some(chunk) = stream.body.next().await {
            let chunk = chunk.map_err(stream_error)?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            if let Some(percent) = fetch_progress.advance(written, total) {
                self.record(&spec.id, ProgressUpdate::progress(percent));
            }
        }
        file.flush().await?;
        drop(file);
        tracing::debug!(job_id = %spec.id, bytes = written, "fetch finished");

        if written == 0 {
            return Err(Error::UpstreamUnavailable("source returned no data".into()));
        }

        // convert
        let output = if transcode {
            self.record(
                &spec.id,
                ProgressUpdate::status(JobStatus::Converting, FETCH_SHARE_WITH_TRANSCODE),
            );
            let convert_progress = ScaledProgress::new(FETCH_SHARE_WITH_TRANSCODE, 99);
            let on_progress = |percent: u8| {
                if let Some(scaled) = convert_progress.advance(u64::from(percent), 100) {
                    self.record(&spec.id, ProgressUpdate::progress(scaled));
                }
            };
            collaborators
                .transcoder
                .transcode(
                    TranscodeRequest {
                        input: &scratch.fetched,
                        output: &scratch.converted,
                        format: spec.format,
                        duration: metadata.duration_secs.map(Duration::from_secs),
                    },
                    &on_progress,
                )
                .await?;
            scratch.converted.clone()
        } else {
            scratch.fetched.clone()
        };

        Ok(Produced {
            display_name,
            output,
        })
    }
}

/// Move `source` into `dir` as `name`, appending ` (n)` on collision
///
/// The destination is reserved with `create_new` first, so two jobs finishing
/// with the same title never overwrite each other.
async fn place_unique(source: &Path, dir: &Path, name: &str) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let destination = reserve_unique_path(&dir.join(name)).await?;

    if tokio::fs::rename(source, &destination).await.is_err() {
        // different filesystems
        if let Err(e) = tokio::fs::copy(source, &destination).await {
            let _ = tokio::fs::remove_file(&destination).await;
            return Err(e.into());
        }
        let _ = tokio::fs::remove_file(source).await;
    }
    Ok(destination)
}
