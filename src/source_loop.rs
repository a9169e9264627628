//! Per-source playback and detection loop.
//!
//! One `SourceLoop` owns one frame source and is the only writer of its
//! registry entry. Each iteration reads a frame (rewinding at end of stream),
//! classifies the regions, records the counts, publishes an annotated JPEG and
//! then paces itself to the source's nominal frame interval.
//!
//! Failures inside an iteration never escape `run` unless a bounded retry
//! policy was configured and exhausted.

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::detect::{occupied_count, Region, RegionClassifier};
use crate::frame::{encode_jpeg, Frame, DEFAULT_JPEG_QUALITY};
use crate::ingest::FrameSource;
use crate::lot::HistoryEntry;
use crate::overlay;
use crate::pacing::{Clock, FramePacer, RetryDecision, RetryPolicy, SystemClock};
use crate::registry::{SourceEntry, SourceStatus};

pub const DEFAULT_OCCUPANCY_THRESHOLD: f32 = 0.2;
pub const DEFAULT_FPS: f64 = 30.0;
const FPS_LOG_EVERY: u64 = 100;

/// Tunables shared by every loop.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoopSettings {
    /// Busy-pixel ratio above which a region is occupied.
    pub threshold_ratio: f32,
    pub jpeg_quality: u8,
    /// Used when the source does not report a frame rate.
    pub fallback_fps: f64,
    pub retry: RetryPolicy,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            threshold_ratio: DEFAULT_OCCUPANCY_THRESHOLD,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            fallback_fps: DEFAULT_FPS,
            retry: RetryPolicy::default(),
        }
    }
}

/// Counters returned by a bounded run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopReport {
    pub processed: u64,
    pub failures: u64,
}

pub struct SourceLoop {
    entry: Arc<SourceEntry>,
    source: Box<dyn FrameSource>,
    regions: Vec<Region>,
    classifier: Arc<dyn RegionClassifier>,
    settings: LoopSettings,
    clock: Arc<dyn Clock>,
    pacer: FramePacer,
    consecutive_failures: u32,
    report: LoopReport,
    fps_window_start: Option<Instant>,
}

impl SourceLoop {
    pub fn new(
        entry: Arc<SourceEntry>,
        source: Box<dyn FrameSource>,
        regions: Vec<Region>,
        classifier: Arc<dyn RegionClassifier>,
        settings: LoopSettings,
    ) -> Result<Self> {
        if entry.lot().capacity() != regions.len() {
            return Err(anyhow!(
                "source {}: capacity {} does not match {} configured regions",
                entry.id(),
                entry.lot().capacity(),
                regions.len()
            ));
        }
        let pacer = FramePacer::from_fps(
            source.native_fps().unwrap_or(settings.fallback_fps),
            settings.fallback_fps,
        )
        .with_context(|| format!("source {}: invalid frame rate", entry.id()))?;
        Ok(Self {
            entry,
            source,
            regions,
            classifier,
            settings,
            clock: Arc::new(SystemClock),
            pacer,
            consecutive_failures: 0,
            report: LoopReport::default(),
            fps_window_start: None,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn id(&self) -> &str {
        self.entry.id()
    }

    pub fn frame_interval(&self) -> Duration {
        self.pacer.interval()
    }

    /// Run until the process exits. Returns only when a bounded retry policy
    /// gives up.
    pub fn run(mut self) -> Result<()> {
        self.drive(None).map(|_| ())
    }

    /// Run at most `iterations` attempts (successful or failed).
    pub fn run_for(&mut self, iterations: u64) -> Result<LoopReport> {
        self.drive(Some(iterations))
    }

    /// Process exactly one frame without pacing or retrying.
    pub fn step(&mut self) -> Result<HistoryEntry> {
        let frame = self.read_frame()?;
        let results = self
            .classifier
            .classify(&frame, &self.regions, self.settings.threshold_ratio)
            .with_context(|| format!("classify frame with {}", self.classifier.name()))?;
        if results.len() != self.regions.len() {
            return Err(anyhow!(
                "classifier {} returned {} results for {} regions",
                self.classifier.name(),
                results.len(),
                self.regions.len()
            ));
        }

        let occupied = occupied_count(&results);
        let entry = self.entry.lot().record(occupied, self.clock.time_of_day())?;

        let annotated = overlay::annotate(frame.image(), &self.regions, &results);
        let jpeg = encode_jpeg(&annotated, self.settings.jpeg_quality)?;
        self.entry.frames().publish(jpeg);
        Ok(entry)
    }

    fn drive(&mut self, limit: Option<u64>) -> Result<LoopReport> {
        self.entry.set_status(SourceStatus::Running);
        log::info!(
            "source {}: running {} at {:.1} fps over {} regions",
            self.entry.id(),
            self.source.location(),
            1.0 / self.pacer.interval().as_secs_f64(),
            self.regions.len()
        );
        self.pacer.start(self.clock.as_ref());
        let mut attempts = 0u64;
        while limit.map_or(true, |limit| attempts < limit) {
            attempts += 1;
            match self.step() {
                Ok(_) => {
                    self.consecutive_failures = 0;
                    self.report.processed += 1;
                    self.log_fps();
                    self.pacer.pace(self.clock.as_ref());
                }
                Err(err) => {
                    self.consecutive_failures += 1;
                    self.report.failures += 1;
                    log::warn!(
                        "source {}: frame failed ({} in a row): {:#}",
                        self.entry.id(),
                        self.consecutive_failures,
                        err
                    );
                    match self.settings.retry.decide(self.consecutive_failures) {
                        RetryDecision::Retry(backoff) => self.clock.sleep(backoff),
                        RetryDecision::GiveUp => {
                            self.entry.set_status(SourceStatus::Terminated);
                            log::error!(
                                "source {}: giving up after {} consecutive failures",
                                self.entry.id(),
                                self.consecutive_failures
                            );
                            return Err(err.context(format!(
                                "source {} exhausted its retry budget",
                                self.entry.id()
                            )));
                        }
                    }
                }
            }
        }
        Ok(self.report)
    }

    fn read_frame(&mut self) -> Result<Frame> {
        if let Some(frame) = self.source.next_frame()? {
            return Ok(frame);
        }
        log::debug!("source {}: end of stream, rewinding", self.entry.id());
        self.source.rewind()?;
        self.source
            .next_frame()?
            .ok_or_else(|| anyhow!("source {} produced no frame after rewind", self.entry.id()))
    }

    fn log_fps(&mut self) {
        let now = self.clock.now();
        let window_start = *self.fps_window_start.get_or_insert(now);
        if self.report.processed % FPS_LOG_EVERY != 0 {
            return;
        }
        let elapsed = now.saturating_duration_since(window_start).as_secs_f64();
        if elapsed > 0.0 {
            log::debug!(
                "source {}: target {:.1} fps, actual {:.1} fps",
                self.entry.id(),
                1.0 / self.pacer.interval().as_secs_f64(),
                FPS_LOG_EVERY as f64 / elapsed
            );
        }
        self.fps_window_start = Some(now);
    }
}
