//! Frame ingestion sources.
//!
//! Every source is a rewindable stream of decoded `Frame`s:
//! - `MediaSource`: local media (synthetic `stub://`, directory of stills,
//!   video file behind the `ingest-file-ffmpeg` feature)
//! - `MemorySource`: a fixed list of frames, for tests and demos
//!
//! `next_frame` returns `Ok(None)` at end of stream; the processing loop is
//! responsible for calling `rewind` and continuing playback.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
mod memory;

use anyhow::Result;

use crate::frame::Frame;

pub use file::{MediaConfig, MediaSource};
pub use memory::MemorySource;

/// Rewindable frame producer owned by a single processing loop.
pub trait FrameSource: Send {
    /// Human-readable location for logs.
    fn location(&self) -> &str;

    /// Frame rate the media was authored at, when known.
    fn native_fps(&self) -> Option<f64>;

    /// Next frame, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Seek back to the first frame.
    fn rewind(&mut self) -> Result<()>;

    fn stats(&self) -> SourceStats;
}

/// Counters for a frame source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_read: u64,
    pub rewinds: u64,
    pub location: String,
}

impl SourceStats {
    pub fn new(location: &str) -> Self {
        Self {
            frames_read: 0,
            rewinds: 0,
            location: location.to_string(),
        }
    }
}
