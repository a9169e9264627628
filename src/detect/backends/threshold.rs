use anyhow::{anyhow, Result};
use image::GrayImage;

use crate::detect::backend::{is_occupied, RegionClassifier};
use crate::detect::result::{ClassificationResult, Region};
use crate::frame::Frame;

pub const DEFAULT_BLOCK_SIZE: u32 = 25;
pub const DEFAULT_OFFSET: f32 = 16.0;

/// Busy-pixel map produced by the preprocessing chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusyMask {
    width: u32,
    height: u32,
    busy: Vec<bool>,
}

impl BusyMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            busy: vec![false; (width as usize) * (height as usize)],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.busy[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, busy: bool) {
        let idx = self.index(x, y);
        self.busy[idx] = busy;
    }

    /// Busy pixels inside `region`, clipped to the mask bounds.
    pub fn count_in(&self, region: &Region) -> u32 {
        let x_end = region.right().min(self.width);
        let y_end = region.bottom().min(self.height);
        let mut count = 0;
        for y in region.y.min(y_end)..y_end {
            for x in region.x.min(x_end)..x_end {
                if self.get(x, y) {
                    count += 1;
                }
            }
        }
        count
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + (x as usize)
    }

    /// Binary 3x3 median: a pixel stays busy when at least 5 of its 9
    /// neighbours (itself included) are busy.
    pub fn majority_3x3(&self) -> Self {
        self.map_neighbourhood(|hits| hits >= 5)
    }

    /// 3x3 dilation.
    pub fn dilate_3x3(&self) -> Self {
        self.map_neighbourhood(|hits| hits > 0)
    }

    /// 3x3 neighbourhood fold with edge clamping.
    fn map_neighbourhood(&self, f: impl Fn(usize) -> bool) -> Self {
        let mut out = Self::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let mut hits = 0;
                for (nx, ny) in neighbours(x, y, self.width, self.height) {
                    if self.get(nx, ny) {
                        hits += 1;
                    }
                }
                out.set(x, y, f(hits));
            }
        }
        out
    }
}

/// Decide occupancy for each region from a precomputed mask.
///
/// The ratio denominator is the region's nominal area; zero-area regions are free.
pub fn classify_mask(
    mask: &BusyMask,
    regions: &[Region],
    threshold_ratio: f32,
) -> Vec<ClassificationResult> {
    regions
        .iter()
        .map(|region| {
            let raw_statistic = mask.count_in(region);
            let area = region.area();
            let ratio = if area == 0 {
                0.0
            } else {
                raw_statistic as f32 / area as f32
            };
            ClassificationResult {
                occupied: is_occupied(ratio, threshold_ratio),
                raw_statistic,
                ratio,
            }
        })
        .collect()
}

/// Grayscale, 3x3 box blur, inverted adaptive mean threshold, binary 3x3
/// median and 3x3 dilation.
///
/// A pixel is busy when its blurred intensity is at or below the mean of its
/// `block_size` window minus `offset` (`blurred <= mean - offset`).
#[derive(Clone, Debug)]
pub struct AdaptiveThresholdClassifier {
    block_size: u32,
    offset: f32,
}

impl AdaptiveThresholdClassifier {
    pub fn new(block_size: u32, offset: f32) -> Result<Self> {
        if block_size < 3 || block_size % 2 == 0 {
            return Err(anyhow!(
                "adaptive threshold block size must be odd and >= 3, got {}",
                block_size
            ));
        }
        Ok(Self { block_size, offset })
    }

    pub fn busy_mask(&self, frame: &Frame) -> BusyMask {
        let gray = image::imageops::grayscale(frame.image());
        let blurred = box_blur_3x3(&gray);
        let thresholded = self.adaptive_threshold(&blurred);
        thresholded.majority_3x3().dilate_3x3()
    }

    fn adaptive_threshold(&self, gray: &GrayImage) -> BusyMask {
        let (width, height) = gray.dimensions();
        let integral = integral_image(gray);
        let stride = width as usize + 1;
        let radius = self.block_size / 2;
        let mut mask = BusyMask::new(width, height);
        for y in 0..height {
            let y0 = y.saturating_sub(radius) as usize;
            let y1 = (y + radius + 1).min(height) as usize;
            for x in 0..width {
                let x0 = x.saturating_sub(radius) as usize;
                let x1 = (x + radius + 1).min(width) as usize;
                let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                    - integral[y0 * stride + x1]
                    - integral[y1 * stride + x0];
                let count = ((x1 - x0) * (y1 - y0)) as f32;
                let mean = sum as f32 / count;
                let value = f32::from(gray.get_pixel(x, y).0[0]);
                mask.set(x, y, value <= mean - self.offset);
            }
        }
        mask
    }
}

impl Default for AdaptiveThresholdClassifier {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            offset: DEFAULT_OFFSET,
        }
    }
}

impl RegionClassifier for AdaptiveThresholdClassifier {
    fn name(&self) -> &'static str {
        "adaptive-threshold"
    }

    fn classify(
        &self,
        frame: &Frame,
        regions: &[Region],
        threshold_ratio: f32,
    ) -> Result<Vec<ClassificationResult>> {
        if regions.is_empty() {
            return Ok(Vec::new());
        }
        let mask = self.busy_mask(frame);
        Ok(classify_mask(&mask, regions, threshold_ratio))
    }
}

fn neighbours(x: u32, y: u32, width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
    let xs = [x.saturating_sub(1), x, (x + 1).min(width - 1)];
    let ys = [y.saturating_sub(1), y, (y + 1).min(height - 1)];
    ys.into_iter()
        .flat_map(move |ny| xs.into_iter().map(move |nx| (nx, ny)))
}

fn box_blur_3x3(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let sum: u32 = neighbours(x, y, width, height)
            .map(|(nx, ny)| u32::from(gray.get_pixel(nx, ny).0[0]))
            .sum();
        image::Luma([((sum + 4) / 9) as u8])
    })
}

/// Summed-area table with a leading zero row and column.
fn integral_image(gray: &GrayImage) -> Vec<u64> {
    let (width, height) = gray.dimensions();
    let stride = width as usize + 1;
    let mut table = vec![0u64; stride * (height as usize + 1)];
    for y in 0..height as usize {
        let mut row_sum = 0u64;
        for x in 0..width as usize {
            row_sum += u64::from(gray.get_pixel(x as u32, y as u32).0[0]);
            table[(y + 1) * stride + x + 1] = table[y * stride + x + 1] + row_sum;
        }
    }
    table
}
