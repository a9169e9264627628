//! Local video file source using FFmpeg.
//!
//! Frames are decoded in-memory and converted to RGB24. End of file is
//! reported as end of stream; `rewind` seeks back to the first frame.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;

use super::SourceStats;
use crate::frame::Frame;

pub(crate) struct FfmpegFileSource {
    location: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    native_fps: Option<f64>,
    stats: SourceStats,
}

impl FfmpegFileSource {
    pub(crate) fn new(location: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&location)
            .with_context(|| format!("failed to open video file '{}' with ffmpeg", location))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let rate = f64::from(input_stream.avg_frame_rate());
        let native_fps = (rate.is_finite() && rate > 0.0).then_some(rate);
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            location: location.to_string(),
            input,
            stream_index,
            decoder,
            scaler,
            native_fps,
            stats: SourceStats::new(location),
        })
    }

    pub(crate) fn connect(&mut self) -> Result<()> {
        log::info!(
            "MediaSource: connected to {} (ffmpeg, {}x{}, fps={:?})",
            self.location,
            self.decoder.width(),
            self.decoder.height(),
            self.native_fps
        );
        Ok(())
    }

    pub(crate) fn location(&self) -> &str {
        &self.location
    }

    pub(crate) fn native_fps(&self) -> Option<f64> {
        self.native_fps
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();

        // frames still buffered in the decoder from the previous packet
        if self.decoder.receive_frame(&mut decoded).is_ok() {
            return self.convert(&decoded).map(Some);
        }

        let mut received = false;
        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                received = true;
                break;
            }
        }
        if received {
            return self.convert(&decoded).map(Some);
        }

        // drain whatever the decoder still holds at end of file
        let _ = self.decoder.send_eof();
        if self.decoder.receive_frame(&mut decoded).is_ok() {
            return self.convert(&decoded).map(Some);
        }
        Ok(None)
    }

    pub(crate) fn rewind(&mut self) -> Result<()> {
        self.input
            .seek(0, ..)
            .with_context(|| format!("seek to start of {}", self.location))?;
        self.decoder.flush();
        self.stats.rewinds += 1;
        Ok(())
    }

    pub(crate) fn stats(&self) -> SourceStats {
        self.stats.clone()
    }

    fn convert(&mut self, decoded: &ffmpeg::frame::Video) -> Result<Frame> {
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgb_frame)
            .context("scale frame to RGB")?;
        let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
        self.stats.frames_read += 1;
        Frame::from_rgb(pixels, width, height)
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let pixels = data
            .get(..row_bytes * height as usize)
            .context("ffmpeg frame is shorter than its dimensions")?;
        return Ok((pixels.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
