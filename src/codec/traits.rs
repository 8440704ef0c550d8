//! Traits and types for transcoding

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::types::OutputFormat;

/// Capabilities of a transcoder implementation
#[derive(Debug, Clone, Copy)]
pub struct TranscoderCapabilities {
    /// Can convert audio to MP3
    pub can_transcode: bool,
}

/// One conversion job
#[derive(Debug, Clone, Copy)]
pub struct TranscodeRequest<'a> {
    /// Fetched media file
    pub input: &'a Path,
    /// Where the converted file is written
    pub output: &'a Path,
    /// Requested output format
    pub format: OutputFormat,
    /// Media length, if known, for progress reporting
    pub duration: Option<Duration>,
}

/// Trait for media transcoding
///
/// Implementations report progress as a 0-100 percentage through
/// `on_progress`. A failed conversion may leave a partial file at
/// `request.output`; the caller is responsible for removing it.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Convert `request.input` into `request.output`
    ///
    /// # Errors
    ///
    /// - [`Error::Codec`](crate::Error::Codec) when the conversion fails
    /// - [`Error::ExternalTool`](crate::Error::ExternalTool) when the binary cannot be run
    /// - [`Error::NotSupported`](crate::Error::NotSupported) for stub implementations
    async fn transcode(
        &self,
        request: TranscodeRequest<'_>,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> crate::Result<()>;

    /// Query capabilities of this transcoder
    fn capabilities(&self) -> TranscoderCapabilities;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
