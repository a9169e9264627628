use anyhow::{anyhow, Result};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

/// Plays a fixed list of frames, then reports end of stream until rewound.
#[derive(Clone, Debug)]
pub struct MemorySource {
    frames: Vec<Frame>,
    position: usize,
    fps: Option<f64>,
    stats: SourceStats,
}

impl MemorySource {
    pub fn new(name: &str, frames: Vec<Frame>, fps: Option<f64>) -> Result<Self> {
        if frames.is_empty() {
            return Err(anyhow!("memory source '{}' needs at least one frame", name));
        }
        Ok(Self {
            frames,
            position: 0,
            fps,
            stats: SourceStats::new(&format!("memory://{name}")),
        })
    }
}

impl FrameSource for MemorySource {
    fn location(&self) -> &str {
        &self.stats.location
    }

    fn native_fps(&self) -> Option<f64> {
        self.fps
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(frame) = self.frames.get(self.position) else {
            return Ok(None);
        };
        let frame = frame.clone();
        self.position += 1;
        self.stats.frames_read += 1;
        Ok(Some(frame))
    }

    fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        self.stats.rewinds += 1;
        Ok(())
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}
