//! Source used when no extractor binary is available

use super::traits::{MediaStream, SourceAdapter};
use async_trait::async_trait;
use url::Url;

use crate::bypass::RequestProfile;
use crate::types::{MediaMetadata, OutputFormat};

const MISSING_EXTRACTOR: &str = "Fetching media requires an external yt-dlp binary. \
     Configure yt_dlp_path in config or ensure yt-dlp is in PATH.";

/// Source that refuses every request with `Error::ExternalTool`
///
/// Lets the service start (and serve previews of its own state) on hosts
/// without yt-dlp; every job then fails with a clear message.
pub struct NoOpSource;

#[async_trait]
impl SourceAdapter for NoOpSource {
    async fn fetch_metadata(
        &self,
        _url: &Url,
        _format: Option<OutputFormat>,
        _profile: &RequestProfile,
    ) -> crate::Result<MediaMetadata> {
        Err(crate::Error::ExternalTool(MISSING_EXTRACTOR.into()))
    }

    async fn open_stream(
        &self,
        _url: &Url,
        _format: OutputFormat,
        _profile: &RequestProfile,
    ) -> crate::Result<MediaStream> {
        Err(crate::Error::ExternalTool(MISSING_EXTRACTOR.into()))
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
