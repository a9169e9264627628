pub mod threshold;

pub use threshold::{
    classify_mask, AdaptiveThresholdClassifier, BusyMask, DEFAULT_BLOCK_SIZE, DEFAULT_OFFSET,
};
