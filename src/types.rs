//! Core types for media-dl

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use utoipa::ToSchema;

use crate::error::{Error, Result};
use crate::utils::{format_duration, format_view_count};

static LAST_JOB_ID: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a job
///
/// Opaque to clients. Generated from the wall clock in milliseconds and kept
/// strictly increasing within the process.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Allocate a fresh id
    pub fn generate() -> Self {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        let mut last = LAST_JOB_ID.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match LAST_JOB_ID.compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return Self(next.to_string()),
                Err(actual) => last = actual,
            }
        }
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Handle naming a temp artifact
///
/// Handles end up in file names, so only `[A-Za-z0-9_-]` is accepted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct ArtifactHandle(String);

impl ArtifactHandle {
    /// Generate `<millis>_<random base36>`
    pub fn generate() -> Self {
        const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let mut rng = rand::thread_rng();
        let suffix: String = (0..9)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(format!("{}_{}", Utc::now().timestamp_millis(), suffix))
    }

    /// Validate a caller-supplied handle
    pub fn parse(raw: &str) -> Result<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= 128
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(Error::Validation(format!("invalid artifact handle: {raw:?}")))
        }
    }

    /// Borrow the handle as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&JobId> for ArtifactHandle {
    fn from(id: &JobId) -> Self {
        // job ids are decimal digits
        Self(id.0.clone())
    }
}

impl std::fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Requested output format
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum OutputFormat {
    /// Audio only, delivered as MP3
    #[serde(rename = "AUDIO", alias = "MP3", alias = "audio", alias = "mp3")]
    Audio,
    /// Video with audio, delivered as MP4
    #[serde(rename = "VIDEO", alias = "MP4", alias = "video", alias = "mp4")]
    Video,
}

impl OutputFormat {
    /// File extension of the delivered artifact
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Audio => "mp3",
            OutputFormat::Video => "mp4",
        }
    }

    /// MIME type used when serving the artifact
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Audio => "audio/mpeg",
            OutputFormat::Video => "video/mp4",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "AUDIO" | "MP3" => Ok(OutputFormat::Audio),
            "VIDEO" | "MP4" => Ok(OutputFormat::Video),
            _ => Err(Error::Validation(format!(
                "unknown format {s:?}, expected AUDIO or VIDEO"
            ))),
        }
    }
}

/// Job status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Fetching bytes from the source
    Downloading,
    /// Transcoding the fetched bytes
    Converting,
    /// Finished; artifact or file is available
    Completed,
    /// Failed; see the snapshot's error message
    Error,
}

impl JobStatus {
    /// Completed and error accept no further updates
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    /// Whether a snapshot in `self` may move to `next`
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            JobStatus::Downloading => true,
            JobStatus::Converting => next != JobStatus::Downloading,
            JobStatus::Completed | JobStatus::Error => false,
        }
    }

    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Downloading => "downloading",
            JobStatus::Converting => "converting",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a job, as returned by the progress endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    /// Job this snapshot belongs to
    pub job_id: JobId,
    /// 0-100
    pub progress: u8,
    /// Current status
    pub status: JobStatus,
    /// Display filename, set on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Human-readable failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Temp artifact handle for jobs created via the artifact flow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_handle: Option<ArtifactHandle>,
}

impl ProgressSnapshot {
    /// Initial snapshot written at submission time
    pub fn seeded(job_id: JobId, artifact_handle: Option<ArtifactHandle>) -> Self {
        Self {
            job_id,
            progress: 0,
            status: JobStatus::Downloading,
            filename: None,
            error: None,
            artifact_handle,
        }
    }

    /// Snapshot reported for ids the store does not know
    pub fn not_found(job_id: JobId) -> Self {
        Self {
            job_id,
            progress: 0,
            status: JobStatus::Error,
            filename: None,
            error: Some("not found".to_string()),
            artifact_handle: None,
        }
    }
}

/// Temp artifact record
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TempArtifact {
    /// Handle
    pub handle: ArtifactHandle,
    /// Location inside the temp directory
    #[schema(value_type = String)]
    pub path: PathBuf,
    /// Sanitized name used for downloads and redemption
    pub display_name: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// When the expiry timer fires
    pub expires_at: DateTime<Utc>,
}

/// Metadata reported by a source adapter
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    /// Title
    pub title: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Thumbnail URL
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Uploader / channel
    #[serde(default)]
    pub channel_name: Option<String>,
    /// Upload date as reported by the source (YYYYMMDD or ISO)
    #[serde(default)]
    pub publish_date: Option<String>,
    /// Length in seconds
    #[serde(default)]
    pub duration_secs: Option<u64>,
    /// View count
    #[serde(default)]
    pub view_count: Option<u64>,
    /// Source-side identifier
    #[serde(default)]
    pub video_id: Option<String>,
    /// Expected byte size of the selected format, when known
    #[serde(default)]
    pub filesize: Option<u64>,
}

/// Metadata formatted for display
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreviewInfo {
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Thumbnail URL (empty if unknown)
    pub thumbnail: String,
    /// Channel name or "Unknown Channel"
    pub channel_name: String,
    /// Publish date or "Unknown"
    pub publish_date: String,
    /// `H:MM:SS` or `M:SS`
    pub duration: String,
    /// e.g. "1.2M views"
    pub view_count: String,
    /// Source-side identifier (empty if unknown)
    pub video_id: String,
}

impl From<MediaMetadata> for PreviewInfo {
    fn from(meta: MediaMetadata) -> Self {
        Self {
            title: meta.title,
            description: meta.description,
            thumbnail: meta.thumbnail.unwrap_or_default(),
            channel_name: meta
                .channel_name
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| "Unknown Channel".to_string()),
            publish_date: meta.publish_date.unwrap_or_else(|| "Unknown".to_string()),
            duration: format_duration(meta.duration_secs.unwrap_or(0)),
            view_count: format_view_count(meta.view_count.unwrap_or(0)),
            video_id: meta.video_id.unwrap_or_default(),
        }
    }
}

/// Health of the configured proxy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProxyHealthRecord {
    /// `error_count < max_errors` after the latest probe
    pub is_healthy: bool,
    /// Latency of the latest probe in milliseconds
    pub response_time_ms: u64,
    /// When the latest probe finished
    pub last_check_time: Option<DateTime<Utc>>,
    /// Decays by one per success
    pub error_count: u32,
    /// Successful probes so far
    pub success_count: u64,
    /// Exit IP reported by the probe endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_ip: Option<String>,
}

impl Default for ProxyHealthRecord {
    fn default() -> Self {
        // unhealthy until the first probe
        Self {
            is_healthy: false,
            response_time_ms: 0,
            last_check_time: None,
            error_count: 0,
            success_count: 0,
            current_ip: None,
        }
    }
}

/// Rate limiter counters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStats {
    /// Requests currently inside the window
    pub current_requests: u32,
    /// Window capacity
    pub max_requests: u32,
    /// Until the oldest request leaves the window (0 if empty)
    pub time_until_reset_ms: u64,
}

/// Combined proxy and rate limit report
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProxyStatus {
    /// `null` when no proxy is configured
    pub proxy: Option<ProxyHealthRecord>,
    /// Limiter counters
    pub rate_limit: RateLimitStats,
}

/// What the running instance can do
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    /// Audio jobs are transcoded to MP3
    pub transcoding: bool,
    /// Name of the transcoder in use
    pub transcoder: String,
    /// Name of the source adapter in use
    pub source: String,
}
