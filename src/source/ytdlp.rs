//! yt-dlp backed source adapter

use super::traits::{MediaStream, SourceAdapter};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::io::ReaderStream;
use url::Url;

use crate::bypass::RequestProfile;
use crate::error::Error;
use crate::types::{MediaMetadata, OutputFormat};

/// Number of stderr lines kept for error messages
const STDERR_TAIL_LINES: usize = 8;

/// Stderr fragments meaning the media itself is gone
const UNAVAILABLE_MARKERS: &[&str] = &[
    "Video unavailable",
    "Private video",
    "This video is private",
    "This video has been removed",
    "This video is no longer available",
];

/// Source adapter that drives the external `yt-dlp` binary
///
/// Metadata comes from `yt-dlp -J`; bytes are streamed from `yt-dlp -o -`.
/// Each request profile is translated to `--user-agent`, `--add-header`,
/// `--proxy` and `--source-address` flags.
///
/// ```no_run
/// use media_dl::source::{SourceAdapter, YtDlpSource};
///
/// let source = YtDlpSource::from_path().expect("yt-dlp not found in PATH");
/// assert_eq!(source.name(), "yt-dlp");
/// ```
pub struct YtDlpSource {
    binary_path: PathBuf,
}

impl YtDlpSource {
    /// Create an adapter with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find yt-dlp in PATH
    pub fn from_path() -> Option<Self> {
        which::which("yt-dlp").ok().map(Self::new)
    }

    fn base_command(&self, profile: &RequestProfile) -> Command {
        let mut command = Command::new(&self.binary_path);
        command
            .args(profile_args(profile))
            .args(["--no-warnings", "--no-playlist", "--no-progress"])
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

/// Track selector passed to `-f`
pub(crate) fn format_selector(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Audio => "bestaudio[ext=m4a]/bestaudio",
        OutputFormat::Video => "best[ext=mp4][vcodec!=none][acodec!=none]/best",
    }
}

/// Command-line flags presenting `profile` upstream
pub(crate) fn profile_args(profile: &RequestProfile) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    for (name, value) in &profile.headers {
        if name.eq_ignore_ascii_case("User-Agent") {
            args.push("--user-agent".into());
            args.push(value.into());
        } else {
            args.push("--add-header".into());
            args.push(format!("{name}:{value}").into());
        }
    }
    if let Some(proxy) = &profile.proxy {
        args.push("--proxy".into());
        args.push(proxy.into());
    }
    if let Some(address) = profile.local_address {
        args.push("--source-address".into());
        args.push(address.to_string().into());
    }
    args
}

/// Map yt-dlp's stderr to an error kind
pub(crate) fn classify_failure(stderr: &str) -> Error {
    if UNAVAILABLE_MARKERS.iter().any(|m| stderr.contains(m)) {
        return Error::NotFound("Video unavailable".into());
    }
    let detail = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("yt-dlp exited with an error");
    Error::UpstreamUnavailable(detail.to_string())
}

#[derive(Deserialize)]
struct InfoJson {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    upload_date: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    view_count: Option<u64>,
    #[serde(default)]
    filesize: Option<u64>,
    #[serde(default)]
    filesize_approx: Option<u64>,
}

/// `20240131` becomes `2024-01-31`; anything else passes through
fn format_upload_date(raw: String) -> String {
    if raw.len() == 8 && raw.bytes().all(|b| b.is_ascii_digit()) {
        format!("{}-{}-{}", &raw[0..4], &raw[4..6], &raw[6..8])
    } else {
        raw
    }
}

/// Parse the JSON printed by `yt-dlp -J`
pub(crate) fn parse_info_json(raw: &[u8]) -> crate::Result<MediaMetadata> {
    let info: InfoJson = serde_json::from_slice(raw)?;
    Ok(MediaMetadata {
        title: info.title.unwrap_or_else(|| "Unknown Title".to_string()),
        description: info.description.unwrap_or_default(),
        thumbnail: info.thumbnail,
        channel_name: info.channel.or(info.uploader),
        publish_date: info.upload_date.map(format_upload_date),
        duration_secs: info.duration.filter(|d| *d >= 0.0).map(|d| d.round() as u64),
        view_count: info.view_count,
        video_id: info.id,
        filesize: info.filesize.or(info.filesize_approx),
    })
}

#[async_trait]
impl SourceAdapter for YtDlpSource {
    async fn fetch_metadata(
        &self,
        url: &Url,
        format: Option<OutputFormat>,
        profile: &RequestProfile,
    ) -> crate::Result<MediaMetadata> {
        let mut command = self.base_command(profile);
        command.arg("-J");
        if let Some(format) = format {
            command.args(["-f", format_selector(format)]);
        }
        let output = command
            .arg(url.as_str())
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }
        parse_info_json(&output.stdout)
    }

    async fn open_stream(
        &self,
        url: &Url,
        format: OutputFormat,
        profile: &RequestProfile,
    ) -> crate::Result<MediaStream> {
        let mut child = self
            .base_command(profile)
            .args(["--no-part", "-f", format_selector(format), "-o", "-"])
            .arg(url.as_str())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ExternalTool("yt-dlp stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::ExternalTool("yt-dlp stderr not captured".into()))?;

        // drained concurrently so a chatty yt-dlp never blocks on a full pipe
        let stderr_task = tokio::spawn(async move {
            let mut tail: Vec<String> = Vec::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.remove(0);
                }
                tail.push(line);
            }
            tail.join("\n")
        });

        // dropping the stream early drops `child`, which kills yt-dlp
        let exit_check = futures::stream::once(async move {
            let status = child.wait().await;
            let stderr = stderr_task.await.unwrap_or_default();
            match status {
                Ok(status) if status.success() => None,
                Ok(_) => Some(Err(std::io::Error::other(classify_failure(&stderr)))),
                Err(e) => Some(Err(e)),
            }
        })
        .filter_map(|item| async move { item });

        Ok(MediaStream {
            total_bytes: None,
            body: ReaderStream::new(stdout).chain(exit_check).boxed(),
        })
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}
