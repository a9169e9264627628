//! Local media sources.
//!
//! `MediaSource` plays one local media location as a rewindable frame stream:
//! - `stub://<name>`: synthetic scene, always available
//! - a directory: still images (`.jpg`, `.jpeg`, `.png`) played in name order
//! - any other path: a video file decoded with FFmpeg (feature `ingest-file-ffmpeg`)
//!
//! URL schemes other than `stub://` are rejected.

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use std::path::{Path, PathBuf};

use super::{FrameSource, SourceStats};
#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use crate::frame::Frame;

const SYNTHETIC_WIDTH: u32 = 640;
const SYNTHETIC_HEIGHT: u32 = 360;
const SYNTHETIC_FRAMES: u64 = 150;
const SYNTHETIC_FPS: f64 = 25.0;
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Configuration for a local media source.
#[derive(Clone, Debug, Default)]
pub struct MediaConfig {
    /// `stub://name`, a directory of stills, or a video file path.
    pub location: String,
    /// Frame rate override; when absent the media's own rate is used.
    pub fps: Option<f64>,
}

/// Rewindable local media source.
pub struct MediaSource {
    backend: MediaBackend,
    fps_override: Option<f64>,
}

enum MediaBackend {
    Synthetic(SyntheticSource),
    Stills(StillSequenceSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl MediaSource {
    pub fn new(config: MediaConfig) -> Result<Self> {
        if !is_local_location(&config.location) {
            return Err(anyhow!(
                "media source only supports local paths or stub:// (got '{}')",
                config.location
            ));
        }
        let backend = if config.location.starts_with("stub://") {
            MediaBackend::Synthetic(SyntheticSource::new(config.location.clone()))
        } else if Path::new(&config.location).is_dir() {
            MediaBackend::Stills(StillSequenceSource::new(&config.location)?)
        } else {
            Self::video_backend(&config)?
        };
        Ok(Self {
            backend,
            fps_override: config.fps,
        })
    }

    #[cfg(feature = "ingest-file-ffmpeg")]
    fn video_backend(config: &MediaConfig) -> Result<MediaBackend> {
        Ok(MediaBackend::Ffmpeg(FfmpegFileSource::new(&config.location)?))
    }

    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    fn video_backend(config: &MediaConfig) -> Result<MediaBackend> {
        if !Path::new(&config.location).exists() {
            return Err(anyhow!("media file not found: {}", config.location));
        }
        Err(anyhow!(
            "video file '{}' requires the ingest-file-ffmpeg feature",
            config.location
        ))
    }

    /// Open the underlying media and log its properties.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            MediaBackend::Synthetic(source) => source.connect(),
            MediaBackend::Stills(source) => source.connect(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            MediaBackend::Ffmpeg(source) => source.connect(),
        }
    }
}

impl FrameSource for MediaSource {
    fn location(&self) -> &str {
        match &self.backend {
            MediaBackend::Synthetic(source) => &source.location,
            MediaBackend::Stills(source) => &source.location,
            #[cfg(feature = "ingest-file-ffmpeg")]
            MediaBackend::Ffmpeg(source) => source.location(),
        }
    }

    fn native_fps(&self) -> Option<f64> {
        if self.fps_override.is_some() {
            return self.fps_override;
        }
        match &self.backend {
            MediaBackend::Synthetic(_) => Some(SYNTHETIC_FPS),
            MediaBackend::Stills(_) => None,
            #[cfg(feature = "ingest-file-ffmpeg")]
            MediaBackend::Ffmpeg(source) => source.native_fps(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            MediaBackend::Synthetic(source) => source.next_frame(),
            MediaBackend::Stills(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            MediaBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn rewind(&mut self) -> Result<()> {
        match &mut self.backend {
            MediaBackend::Synthetic(source) => source.rewind(),
            MediaBackend::Stills(source) => source.rewind(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            MediaBackend::Ffmpeg(source) => source.rewind(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            MediaBackend::Synthetic(source) => source.stats.clone(),
            MediaBackend::Stills(source) => source.stats.clone(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            MediaBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

/// A row of parked "cars" that come and go over a fixed-length clip.
struct SyntheticSource {
    location: String,
    position: u64,
    stats: SourceStats,
}

impl SyntheticSource {
    fn new(location: String) -> Self {
        Self {
            stats: SourceStats::new(&location),
            location,
            position: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("MediaSource: connected to {} (synthetic)", self.location);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.position >= SYNTHETIC_FRAMES {
            return Ok(None);
        }
        let frame = synthetic_scene(self.position);
        self.position += 1;
        self.stats.frames_read += 1;
        Ok(Some(frame))
    }

    fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        self.stats.rewinds += 1;
        Ok(())
    }
}

/// Six bays along the bottom half; bay `i` holds a textured car while
/// `(frame / 25 + i) % 3 != 0`.
fn synthetic_scene(frame: u64) -> Frame {
    let mut image = RgbImage::from_pixel(SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT, Rgb([96, 96, 96]));
    for bay in 0..6u64 {
        let parked = (frame / 25 + bay) % 3 != 0;
        if !parked {
            continue;
        }
        let x0 = 20 + bay as u32 * 100;
        for y in 200..260 {
            for x in x0..x0 + 80 {
                let dark = ((x / 4) + (y / 4)) % 2 == 0;
                let v = if dark { 20 } else { 230 };
                image.put_pixel(x, y, Rgb([v, v / 2, v / 3]));
            }
        }
    }
    Frame::new(image)
}

// ----------------------------------------------------------------------------
// Directory of still images
// ----------------------------------------------------------------------------

struct StillSequenceSource {
    location: String,
    files: Vec<PathBuf>,
    position: usize,
    stats: SourceStats,
}

impl StillSequenceSource {
    fn new(dir: &str) -> Result<Self> {
        let mut files = Vec::new();
        let entries =
            std::fs::read_dir(dir).with_context(|| format!("read media directory {dir}"))?;
        for entry in entries {
            let path = entry?.path();
            if has_image_extension(&path) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(anyhow!("media directory {} contains no images", dir));
        }
        files.sort();
        Ok(Self {
            location: dir.to_string(),
            files,
            position: 0,
            stats: SourceStats::new(dir),
        })
    }

    fn connect(&mut self) -> Result<()> {
        log::info!(
            "MediaSource: connected to {} ({} stills)",
            self.location,
            self.files.len()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.position) else {
            return Ok(None);
        };
        // advance first so a corrupt file is skipped on the next read
        self.position += 1;
        let image = image::open(path)
            .with_context(|| format!("decode {}", path.display()))?
            .to_rgb8();
        self.stats.frames_read += 1;
        Ok(Some(Frame::new(image)))
    }

    fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        self.stats.rewinds += 1;
        Ok(())
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

fn is_local_location(location: &str) -> bool {
    if location.trim().is_empty() {
        return false;
    }
    if location.starts_with("stub://") {
        return true;
    }
    !location.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_remote_urls() {
        let err = MediaSource::new(MediaConfig {
            location: "rtsp://camera/stream".into(),
            fps: None,
        })
        .err()
        .unwrap();
        assert!(err.to_string().contains("local paths"));
        assert!(MediaSource::new(MediaConfig::default()).is_err());
    }

    #[test]
    fn synthetic_source_ends_and_rewinds() {
        let mut source = MediaSource::new(MediaConfig {
            location: "stub://lot".into(),
            fps: None,
        })
        .unwrap();
        source.connect().unwrap();
        assert_eq!(source.native_fps(), Some(SYNTHETIC_FPS));

        for _ in 0..SYNTHETIC_FRAMES {
            assert!(source.next_frame().unwrap().is_some());
        }
        assert!(source.next_frame().unwrap().is_none());
        source.rewind().unwrap();
        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first, synthetic_scene(0));

        let stats = source.stats();
        assert_eq!(stats.frames_read, SYNTHETIC_FRAMES + 1);
        assert_eq!(stats.rewinds, 1);
    }

    #[test]
    fn fps_override_wins() {
        let source = MediaSource::new(MediaConfig {
            location: "stub://lot".into(),
            fps: Some(12.5),
        })
        .unwrap();
        assert_eq!(source.native_fps(), Some(12.5));
    }

    #[test]
    fn plays_a_directory_of_stills_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for (name, shade) in [("b.png", 200u8), ("a.png", 10u8)] {
            RgbImage::from_pixel(4, 4, Rgb([shade, shade, shade]))
                .save(dir.path().join(name))
                .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let mut source = MediaSource::new(MediaConfig {
            location: dir.path().to_string_lossy().to_string(),
            fps: None,
        })
        .unwrap();
        source.connect().unwrap();
        assert_eq!(source.native_fps(), None);

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.image().get_pixel(0, 0), &Rgb([10, 10, 10]));
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.image().get_pixel(0, 0), &Rgb([200, 200, 200]));
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn empty_directory_is_a_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = MediaSource::new(MediaConfig {
            location: dir.path().to_string_lossy().to_string(),
            fps: None,
        });
        assert!(result.is_err());
    }

    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    #[test]
    fn missing_video_file_is_a_setup_error() {
        let err = MediaSource::new(MediaConfig {
            location: "/nonexistent/video-1.mp4".into(),
            fps: None,
        })
        .err()
        .unwrap();
        assert!(err.to_string().contains("not found"));
    }
}
