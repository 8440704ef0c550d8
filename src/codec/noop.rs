//! No-op transcoder for graceful degradation

use super::traits::{TranscodeRequest, Transcoder, TranscoderCapabilities};
use async_trait::async_trait;

/// Transcoder used when no `ffmpeg` binary is available
///
/// Reports `can_transcode: false`, so the pipeline skips the conversion
/// step. Calling it anyway returns `Error::NotSupported`.
pub struct NoOpTranscoder;

#[async_trait]
impl Transcoder for NoOpTranscoder {
    async fn transcode(
        &self,
        _request: TranscodeRequest<'_>,
        _on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> crate::Result<()> {
        Err(crate::Error::NotSupported(
            "Transcoding requires an external ffmpeg binary. \
             Configure ffmpeg_path in config or ensure ffmpeg is in PATH."
                .into(),
        ))
    }

    fn capabilities(&self) -> TranscoderCapabilities {
        TranscoderCapabilities {
            can_transcode: false,
        }
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
