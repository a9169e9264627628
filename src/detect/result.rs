use serde::{Deserialize, Serialize};

/// Rectangular region of interest in source pixel coordinates.
///
/// Serialized as a 4-element array `[x, y, width, height]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u32, u32, u32, u32)", into = "(u32, u32, u32, u32)")]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Nominal area, independent of how much of the region lies inside a frame.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }
}

impl From<(u32, u32, u32, u32)> for Region {
    fn from((x, y, width, height): (u32, u32, u32, u32)) -> Self {
        Self::new(x, y, width, height)
    }
}

impl From<Region> for (u32, u32, u32, u32) {
    fn from(region: Region) -> Self {
        (region.x, region.y, region.width, region.height)
    }
}

/// Per-region outcome of one classification pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClassificationResult {
    pub occupied: bool,
    /// Busy pixel count inside the region.
    pub raw_statistic: u32,
    /// `raw_statistic` divided by the region's nominal area.
    pub ratio: f32,
}

/// Number of occupied entries in a classification pass.
pub fn occupied_count(results: &[ClassificationResult]) -> usize {
    results.iter().filter(|r| r.occupied).count()
}
