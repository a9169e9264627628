//! Startup wiring: one `SourceLoop` thread per configured source.
//!
//! Setup happens once. A source whose media or region list cannot be opened
//! is registered with capacity zero and status `Terminated`; the remaining
//! sources start normally. Loop threads are detached and live as long as the
//! process.

use anyhow::{anyhow, Result};
use std::sync::Arc;

use crate::config::{MonitorConfig, SourceSettings};
use crate::detect::{AdaptiveThresholdClassifier, Region, RegionClassifier};
use crate::ingest::{FrameSource, MediaConfig, MediaSource};
use crate::pacing::frame_interval;
use crate::registry::{SourceEntry, SourceRegistry, SourceStatus};
use crate::source_loop::SourceLoop;

pub struct Supervisor {
    cfg: MonitorConfig,
    classifier: Arc<dyn RegionClassifier>,
}

/// What `Supervisor::start` leaves behind.
#[derive(Debug)]
pub struct SupervisorHandle {
    pub registry: Arc<SourceRegistry>,
    /// Sources whose loop thread was started.
    pub ready: usize,
}

struct PreparedSource {
    id: String,
    media: MediaSource,
    regions: Vec<Region>,
}

impl Supervisor {
    pub fn new(cfg: MonitorConfig) -> Result<Self> {
        let classifier =
            AdaptiveThresholdClassifier::new(cfg.detection.block_size, cfg.detection.offset)?;
        Ok(Self {
            cfg,
            classifier: Arc::new(classifier),
        })
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn RegionClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn start(self) -> Result<SupervisorHandle> {
        let max = self.cfg.max_sources;
        if self.cfg.sources.len() > max {
            let ignored: Vec<&str> = self.cfg.sources[max..]
                .iter()
                .map(|source| source.id.as_str())
                .collect();
            log::warn!(
                "only {} sources are monitored; ignoring {}",
                max,
                ignored.join(", ")
            );
        }

        let mut entries = Vec::new();
        let mut prepared = Vec::new();
        for source in self.cfg.sources.iter().take(max) {
            match prepare(source, self.cfg.default_fps) {
                Ok(ready) => {
                    entries.push(SourceEntry::new(ready.id.clone(), ready.regions.len()));
                    prepared.push(ready);
                }
                Err(err) => {
                    log::error!("source {} failed setup: {:#}", source.id, err);
                    let entry = SourceEntry::new(source.id.clone(), 0);
                    entry.set_status(SourceStatus::Terminated);
                    entries.push(entry);
                }
            }
        }
        let registry = Arc::new(SourceRegistry::new(entries)?);

        let settings = self.cfg.loop_settings();
        let mut ready = 0;
        for source in prepared {
            let entry = registry
                .get(&source.id)
                .ok_or_else(|| anyhow!("source {} missing from registry", source.id))?;
            let source_loop = match SourceLoop::new(
                entry.clone(),
                Box::new(source.media),
                source.regions,
                self.classifier.clone(),
                settings,
            ) {
                Ok(source_loop) => source_loop,
                Err(err) => {
                    log::error!("source {} failed setup: {:#}", source.id, err);
                    entry.set_status(SourceStatus::Terminated);
                    continue;
                }
            };
            let spawned = std::thread::Builder::new()
                .name(format!("source-{}", source.id))
                .spawn(move || {
                    let id = source_loop.id().to_string();
                    if let Err(err) = source_loop.run() {
                        log::error!("source {} stopped: {:#}", id, err);
                    }
                });
            match spawned {
                Ok(_detached) => ready += 1,
                Err(err) => {
                    log::error!("source {}: could not spawn loop thread: {}", source.id, err);
                    entry.set_status(SourceStatus::Terminated);
                }
            }
        }

        log::info!(
            "{} of {} sources running",
            ready,
            registry.len()
        );
        Ok(SupervisorHandle { registry, ready })
    }
}

fn prepare(source: &SourceSettings, fallback_fps: f64) -> Result<PreparedSource> {
    let regions = source.regions.load()?;
    if regions.is_empty() {
        log::warn!("source {} has no regions; counts stay at zero", source.id);
    }
    let mut media = MediaSource::new(MediaConfig {
        location: source.media.clone(),
        fps: source.fps,
    })?;
    media.connect()?;
    frame_interval(media.native_fps().unwrap_or(fallback_fps), fallback_fps)?;
    log::info!(
        "source {}: {} regions from {}",
        source.id,
        regions.len(),
        media.location()
    );
    Ok(PreparedSource {
        id: source.id.clone(),
        media,
        regions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegionSet;
    use crate::detect::ClassificationResult;
    use crate::frame::Frame;
    use std::time::{Duration, Instant};

    struct EverythingOccupied;

    impl RegionClassifier for EverythingOccupied {
        fn name(&self) -> &'static str {
            "everything-occupied"
        }

        fn classify(
            &self,
            _frame: &Frame,
            regions: &[Region],
            _threshold_ratio: f32,
        ) -> Result<Vec<ClassificationResult>> {
            Ok(regions
                .iter()
                .map(|region| ClassificationResult {
                    occupied: true,
                    raw_statistic: region.area() as u32,
                    ratio: 1.0,
                })
                .collect())
        }
    }

    fn source(id: &str, media: &str, regions: RegionSet) -> SourceSettings {
        SourceSettings {
            id: id.to_string(),
            media: media.to_string(),
            regions,
            fps: None,
        }
    }

    #[test]
    fn setup_failure_is_registered_as_terminated() {
        let mut cfg = MonitorConfig::default();
        cfg.sources = vec![
            source("1", "stub://lot1", RegionSet::Inline(vec![Region::new(20, 200, 80, 60)])),
            source(
                "2",
                "stub://lot2",
                RegionSet::File("/nonexistent/regions.json".into()),
            ),
        ];
        let handle = Supervisor::new(cfg).unwrap().start().unwrap();

        assert_eq!(handle.ready, 1);
        let broken = handle.registry.get("2").unwrap();
        assert_eq!(broken.status(), SourceStatus::Terminated);
        assert_eq!(broken.lot().capacity(), 0);
        assert!(broken.frames().read().is_none());

        let running = handle.registry.get("1").unwrap();
        assert_eq!(running.lot().capacity(), 1);
        let deadline = Instant::now() + Duration::from_secs(10);
        while running.frames().read().is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(running.frames().read().is_some());
        assert_eq!(running.status(), SourceStatus::Running);
    }

    #[test]
    fn extra_sources_are_ignored() {
        let mut cfg = MonitorConfig::default();
        cfg.max_sources = 1;
        cfg.sources = vec![
            source("a", "https://example.invalid/feed", RegionSet::Inline(Vec::new())),
            source("b", "stub://b", RegionSet::Inline(Vec::new())),
        ];
        let handle = Supervisor::new(cfg).unwrap().start().unwrap();
        assert_eq!(handle.registry.len(), 1);
        assert_eq!(handle.ready, 0);
        assert!(handle.registry.get("b").is_none());
    }

    #[test]
    fn unusable_frame_rate_is_a_setup_failure_not_a_crash() {
        let mut cfg = MonitorConfig::default();
        let mut slow = source("1", "stub://slow", RegionSet::Inline(vec![Region::new(0, 0, 4, 4)]));
        slow.fps = Some(5e-324);
        cfg.sources = vec![
            slow,
            source("2", "stub://ok", RegionSet::Inline(vec![Region::new(0, 0, 4, 4)])),
        ];
        let handle = Supervisor::new(cfg)
            .unwrap()
            .with_classifier(Arc::new(EverythingOccupied))
            .start()
            .unwrap();

        assert_eq!(handle.ready, 1);
        let broken = handle.registry.get("1").unwrap();
        assert_eq!(broken.status(), SourceStatus::Terminated);
        assert_eq!(broken.lot().capacity(), 0);

        let running = handle.registry.get("2").unwrap();
        let deadline = Instant::now() + Duration::from_secs(10);
        while running.lot().history_len() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        let counts = running.lot().counts();
        assert_eq!((counts.total, counts.occupied, counts.available), (1, 1, 0));
    }
}
