//! Transcoding collaborators
//!
//! The pipeline only needs one operation from a codec: turn a downloaded
//! media file into the requested output format while reporting progress.
//! Which implementation is used is decided once at startup:
//!
//! - [`FfmpegTranscoder`]: drives an external `ffmpeg` binary
//! - [`NoOpTranscoder`]: used when no binary is available; audio jobs then
//!   keep the fetched bytes under the `.mp3` name
//!
//! ```no_run
//! use media_dl::codec::{FfmpegTranscoder, NoOpTranscoder, Transcoder};
//! use std::sync::Arc;
//!
//! let codec: Arc<dyn Transcoder> = match FfmpegTranscoder::from_path(320) {
//!     Some(ffmpeg) => Arc::new(ffmpeg),
//!     None => Arc::new(NoOpTranscoder),
//! };
//! println!("transcoding available: {}", codec.capabilities().can_transcode);
//! ```

mod ffmpeg;
mod noop;
mod traits;

pub use ffmpeg::FfmpegTranscoder;
pub use noop::NoOpTranscoder;
pub use traits::{TranscodeRequest, Transcoder, TranscoderCapabilities};
