//! Parking occupancy monitor
//!
//! Loops local video sources, classifies fixed regions of each frame as
//! occupied or free, and serves the live counts, a short rolling history and
//! an annotated MJPEG feed per source.
//!
//! # Concurrency model
//!
//! - One OS thread per source runs a [`SourceLoop`]: read, classify, record,
//!   annotate, publish, pace. End of stream rewinds; per-frame errors retry
//!   after a short backoff.
//! - Each source owns a [`LotState`] and a [`FramePublisher`], each behind its
//!   own lock. Sources never contend with each other.
//! - The HTTP API reads counts directly and gives every stream viewer its own
//!   [`StreamGenerator`] that pulls the latest frame at a fixed cadence.
//!
//! # Module Structure
//!
//! - `detect`: region classification (adaptive threshold backend)
//! - `ingest`: rewindable frame sources (synthetic, stills, video files)
//! - `lot`, `publish`, `registry`: per-source shared state
//! - `source_loop`, `pacing`: the processing loop and its timing
//! - `overlay`, `frame`: annotation and JPEG encoding
//! - `api`, `config`, `supervisor`: HTTP surface and startup wiring

pub mod api;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod lot;
pub mod overlay;
pub mod pacing;
pub mod publish;
pub mod registry;
pub mod source_loop;
pub mod supervisor;

pub use api::stream::StreamGenerator;
pub use api::{ApiConfig, ApiHandle, ApiServer};
pub use config::{load_regions, MonitorConfig, RegionSet, SourceSettings};
pub use detect::{
    AdaptiveThresholdClassifier, ClassificationResult, Region, RegionClassifier,
};
pub use frame::{encode_jpeg, placeholder_jpeg, Frame};
pub use ingest::{FrameSource, MediaConfig, MediaSource, MemorySource, SourceStats};
pub use lot::{HistoryEntry, LotCounts, LotSnapshot, LotState, HISTORY_CAPACITY};
pub use pacing::{Clock, FramePacer, ManualClock, RetryPolicy, SystemClock};
pub use publish::FramePublisher;
pub use registry::{SourceEntry, SourceRegistry, SourceStatus};
pub use source_loop::{LoopReport, LoopSettings, SourceLoop};
pub use supervisor::{Supervisor, SupervisorHandle};
