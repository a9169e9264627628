use anyhow::Result;

use crate::detect::result::{ClassificationResult, Region};
use crate::frame::Frame;

/// Region occupancy classifier.
///
/// Implementations must be deterministic for identical pixel input and must
/// treat the frame as read-only. Results are positional: entry `i` describes
/// `regions[i]`.
///
/// A region is occupied when its busy-pixel ratio is strictly greater than
/// `threshold_ratio`. A ratio equal to the threshold is free.
pub trait RegionClassifier: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn classify(
        &self,
        frame: &Frame,
        regions: &[Region],
        threshold_ratio: f32,
    ) -> Result<Vec<ClassificationResult>>;
}

/// Shared occupancy decision used by every backend.
pub fn is_occupied(ratio: f32, threshold_ratio: f32) -> bool {
    ratio > threshold_ratio
}
