//! ffmpeg-backed transcoder

use super::traits::{TranscodeRequest, Transcoder, TranscoderCapabilities};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::types::OutputFormat;

/// Number of stderr lines kept for error messages
const STDERR_TAIL_LINES: usize = 8;

/// Transcoder that runs the external `ffmpeg` binary
///
/// Audio is encoded with libmp3lame at the configured constant bitrate.
/// Progress comes from ffmpeg's machine-readable `-progress pipe:1` output.
///
/// ```no_run
/// use media_dl::codec::{FfmpegTranscoder, Transcoder};
/// use std::path::PathBuf;
///
/// let ffmpeg = FfmpegTranscoder::new(PathBuf::from("/usr/bin/ffmpeg"), 320);
/// assert!(ffmpeg.capabilities().can_transcode);
/// ```
pub struct FfmpegTranscoder {
    binary_path: PathBuf,
    audio_bitrate_kbps: u32,
}

impl FfmpegTranscoder {
    /// Create a transcoder with an explicit binary path
    pub fn new(binary_path: PathBuf, audio_bitrate_kbps: u32) -> Self {
        Self {
            binary_path,
            audio_bitrate_kbps,
        }
    }

    /// Attempt to find ffmpeg in PATH
    pub fn from_path(audio_bitrate_kbps: u32) -> Option<Self> {
        which::which("ffmpeg")
            .ok()
            .map(|path| Self::new(path, audio_bitrate_kbps))
    }

    fn arguments(&self, request: &TranscodeRequest<'_>) -> crate::Result<Vec<std::ffi::OsString>> {
        if request.format != OutputFormat::Audio {
            return Err(crate::Error::NotSupported(
                "only audio output is transcoded".into(),
            ));
        }
        let mut args: Vec<std::ffi::OsString> = vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-y".into(),
            "-i".into(),
            request.input.as_os_str().to_owned(),
            "-vn".into(),
            "-codec:a".into(),
            "libmp3lame".into(),
            "-b:a".into(),
            format!("{}k", self.audio_bitrate_kbps).into(),
            "-f".into(),
            "mp3".into(),
            "-progress".into(),
            "pipe:1".into(),
            "-nostats".into(),
        ];
        args.push(request.output.as_os_str().to_owned());
        Ok(args)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        request: TranscodeRequest<'_>,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> crate::Result<()> {
        let args = self.arguments(&request)?;
        let mut child = Command::new(&self.binary_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| crate::Error::ExternalTool(format!("Failed to execute ffmpeg: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| crate::Error::ExternalTool("ffmpeg stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| crate::Error::ExternalTool("ffmpeg stderr not captured".into()))?;

        // 0 = unknown; filled from the request or from ffmpeg's own banner
        let duration_us = Arc::new(AtomicU64::new(
            request
                .duration
                .map(|d| d.as_micros() as u64)
                .unwrap_or(0),
        ));

        let stderr_task = {
            let duration_us = duration_us.clone();
            tokio::spawn(async move {
                let mut tail: Vec<String> = Vec::with_capacity(STDERR_TAIL_LINES);
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if duration_us.load(Ordering::Relaxed) == 0
                        && let Some(d) = parse_banner_duration(&line)
                    {
                        duration_us.store(d.as_micros() as u64, Ordering::Relaxed);
                    }
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.remove(0);
                    }
                    tail.push(line);
                }
                tail.join("\n")
            })
        };

        let mut last_percent = 0u8;
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            let total = duration_us.load(Ordering::Relaxed);
            if let Some(percent) = parse_progress_line(&line, total)
                && percent > last_percent
            {
                last_percent = percent;
                on_progress(percent);
            }
        }

        let status = child.wait().await?;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            tracing::warn!(
                status = %status,
                input = %request.input.display(),
                stderr = %stderr_tail,
                "ffmpeg failed"
            );
            return Err(crate::Error::Codec(format!(
                "ffmpeg exited with {status}: {stderr_tail}"
            )));
        }

        if last_percent < 100 {
            on_progress(100);
        }
        Ok(())
    }

    fn capabilities(&self) -> TranscoderCapabilities {
        TranscoderCapabilities {
            can_transcode: true,
        }
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

/// Percent complete for one `key=value` line of `-progress` output
///
/// `out_time_ms` is microseconds despite its name.
fn parse_progress_line(line: &str, total_us: u64) -> Option<u8> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "progress" if value == "end" => Some(100),
        "out_time_us" | "out_time_ms" if total_us > 0 => {
            let done: u64 = value.parse().ok()?;
            Some(((done.saturating_mul(100) / total_us).min(99)) as u8)
        }
        _ => None,
    }
}

/// Media duration from the `Duration: HH:MM:SS.cc` banner line on stderr
fn parse_banner_duration(line: &str) -> Option<Duration> {
    let rest = line.trim().strip_prefix("Duration:")?.trim();
    let stamp = rest.split(',').next()?.trim();
    let mut parts = stamp.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    Some(Duration::from_secs(hours * 3600 + minutes * 60) + Duration::from_secs_f64(seconds))
}
