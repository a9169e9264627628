//! Region occupancy classification.
//!
//! `RegionClassifier` is the seam between the processing loop and the image
//! processing that decides whether a region is occupied. The loop only needs a
//! positional occupied/free decision and a busy-pixel statistic per region.

mod backend;
mod backends;
mod result;

pub use backend::{is_occupied, RegionClassifier};
pub use backends::{
    classify_mask, AdaptiveThresholdClassifier, BusyMask, DEFAULT_BLOCK_SIZE, DEFAULT_OFFSET,
};
pub use result::{occupied_count, ClassificationResult, Region};
