//! Upstream media sources
//!
//! A [`SourceAdapter`] turns a page URL into metadata and a byte stream,
//! presenting whatever [`RequestProfile`](crate::bypass::RequestProfile) it
//! is handed. Implementations:
//!
//! - [`YtDlpSource`]: drives an external `yt-dlp` binary
//! - [`NoOpSource`]: used when no binary is available
//!
//! Stream items are `std::io::Result`; adapters that know *why* a transfer
//! failed wrap a [`crate::Error`] inside the `io::Error`, and
//! [`stream_error`] recovers it. Any other read failure counts as the
//! upstream going away.

mod noop;
mod traits;
mod ytdlp;

pub use noop::NoOpSource;
pub use traits::{MediaStream, SourceAdapter};
pub use ytdlp::YtDlpSource;

use crate::error::Error;

/// Recover the crate error carried by a failed stream item
pub fn stream_error(err: std::io::Error) -> Error {
    if !err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
        return Error::UpstreamUnavailable(format!("media stream failed: {err}"));
    }
    match err.into_inner().map(|inner| inner.downcast::<Error>()) {
        Some(Ok(inner)) => *inner,
        _ => Error::UpstreamUnavailable("media stream failed".into()),
    }
}
