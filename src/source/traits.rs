//! Traits and types for media sources

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use url::Url;

use crate::bypass::RequestProfile;
use crate::types::{MediaMetadata, OutputFormat};

/// Byte stream for one selected track
pub struct MediaStream {
    /// Expected length, when the source knows it up front
    pub total_bytes: Option<u64>,
    /// Media bytes; an `Err` item ends the transfer
    pub body: BoxStream<'static, std::io::Result<Bytes>>,
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("total_bytes", &self.total_bytes)
            .finish_non_exhaustive()
    }
}

/// Trait for talking to the upstream media host
///
/// Every call carries the [`RequestProfile`] it should present upstream.
/// Implementations must map "this media does not exist or is private" to
/// [`Error::NotFound`](crate::Error::NotFound) so callers stop rotating
/// identities, and other upstream rejections to
/// [`Error::UpstreamUnavailable`](crate::Error::UpstreamUnavailable).
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Look up metadata; `format` narrows size information to one track
    async fn fetch_metadata(
        &self,
        url: &Url,
        format: Option<OutputFormat>,
        profile: &RequestProfile,
    ) -> crate::Result<MediaMetadata>;

    /// Open the byte stream of the best track for `format`
    async fn open_stream(
        &self,
        url: &Url,
        format: OutputFormat,
        profile: &RequestProfile,
    ) -> crate::Result<MediaStream>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
