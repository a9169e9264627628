//! Decoded frames and the transport encoding used for streaming.
//!
//! - `Frame`: one decoded RGB picture produced by a `FrameSource`.
//! - `encode_jpeg`: turns an annotated frame into the bytes published to viewers.
//! - `placeholder_jpeg`: the frame viewers see before a source has published anything.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, Rgb, RgbImage};

use crate::overlay;

pub const DEFAULT_JPEG_QUALITY: u8 = 80;
pub const PLACEHOLDER_WIDTH: u32 = 640;
pub const PLACEHOLDER_HEIGHT: u32 = 480;

/// One decoded RGB24 frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// Build a frame from packed RGB24 bytes.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = width
            .checked_mul(height)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))? as usize;
        let actual = pixels.len();
        let image = RgbImage::from_raw(width, height, pixels).ok_or_else(|| {
            anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                actual
            )
        })?;
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

/// Encode an RGB image as baseline JPEG.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )
        .context("encode jpeg")?;
    Ok(out)
}

/// Black frame with a "Loading Lot <id>..." caption.
pub fn placeholder_jpeg(source_id: &str) -> Result<Vec<u8>> {
    let mut image = RgbImage::from_pixel(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, Rgb([0, 0, 0]));
    let caption = format!("Loading Lot {source_id}...");
    let scale = 3;
    let text_width = overlay::text_width(&caption, scale);
    let x = PLACEHOLDER_WIDTH.saturating_sub(text_width) / 2;
    overlay::draw_text(&mut image, &caption, x, PLACEHOLDER_HEIGHT / 2 - 10, scale, Rgb([255, 255, 255]));
    encode_jpeg(&image, DEFAULT_JPEG_QUALITY)
}
