use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::ApiConfig;
use crate::detect::{Region, DEFAULT_BLOCK_SIZE, DEFAULT_OFFSET};
use crate::frame::DEFAULT_JPEG_QUALITY;
use crate::pacing::{fps_in_range, RetryPolicy, DEFAULT_RETRY_BACKOFF, MAX_FPS, MIN_FPS};
use crate::source_loop::{LoopSettings, DEFAULT_FPS, DEFAULT_OCCUPANCY_THRESHOLD};

const DEFAULT_API_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_STREAM_INTERVAL_MS: u64 = 33;
const DEFAULT_MAX_SOURCES: usize = 2;
const DEFAULT_SOURCE_IDS: [&str; 2] = ["1", "2"];
const SYNTHETIC_BAYS: u32 = 6;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MonitorConfigFile {
    api: Option<ApiConfigFile>,
    detection: Option<DetectionConfigFile>,
    output: Option<OutputConfigFile>,
    retry: Option<RetryConfigFile>,
    max_sources: Option<usize>,
    sources: Option<Vec<SourceConfigFile>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ApiConfigFile {
    addr: Option<String>,
    stream_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectionConfigFile {
    occupancy_threshold: Option<f32>,
    block_size: Option<u32>,
    offset: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OutputConfigFile {
    jpeg_quality: Option<u8>,
    default_fps: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RetryConfigFile {
    backoff_ms: Option<u64>,
    max_consecutive: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SourceConfigFile {
    id: String,
    media: String,
    regions_path: Option<PathBuf>,
    regions: Option<Vec<Region>>,
    fps: Option<f64>,
}

/// Where a source's regions come from.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionSet {
    Inline(Vec<Region>),
    /// JSON array of `[x, y, width, height]`, read when the source starts.
    File(PathBuf),
}

impl RegionSet {
    pub fn load(&self) -> Result<Vec<Region>> {
        match self {
            RegionSet::Inline(regions) => Ok(regions.clone()),
            RegionSet::File(path) => load_regions(path),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    pub id: String,
    /// `stub://name`, a directory of stills or a video file.
    pub media: String,
    pub regions: RegionSet,
    pub fps: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSettings {
    pub occupancy_threshold: f32,
    pub block_size: u32,
    pub offset: f32,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub api_addr: String,
    pub stream_interval: Duration,
    pub detection: DetectionSettings,
    pub jpeg_quality: u8,
    pub default_fps: f64,
    pub retry: RetryPolicy,
    pub max_sources: usize,
    pub sources: Vec<SourceSettings>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::from_file(MonitorConfigFile::default())
    }
}

impl MonitorConfig {
    /// File named by `LOTMON_CONFIG` (if set), then `LOTMON_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LOTMON_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        Self::load_with(config_path.as_deref())
    }

    /// Like `load`, with the config file chosen by the caller.
    pub fn load_with(config_path: Option<&Path>) -> Result<Self> {
        let file_cfg = match config_path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a config file without consulting the environment.
    pub fn from_path(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Self {
        let api = file.api.unwrap_or_default();
        let detection = file.detection.unwrap_or_default();
        let output = file.output.unwrap_or_default();
        let retry = file.retry.unwrap_or_default();

        let sources = match file.sources {
            Some(sources) => sources
                .into_iter()
                .map(|source| SourceSettings {
                    regions: match (source.regions, source.regions_path) {
                        (Some(regions), _) => RegionSet::Inline(regions),
                        (None, Some(path)) => RegionSet::File(path),
                        (None, None) => RegionSet::Inline(Vec::new()),
                    },
                    id: source.id,
                    media: source.media,
                    fps: source.fps,
                })
                .collect(),
            None => default_sources(),
        };

        Self {
            api_addr: api.addr.unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            stream_interval: Duration::from_millis(
                api.stream_interval_ms.unwrap_or(DEFAULT_STREAM_INTERVAL_MS),
            ),
            detection: DetectionSettings {
                occupancy_threshold: detection
                    .occupancy_threshold
                    .unwrap_or(DEFAULT_OCCUPANCY_THRESHOLD),
                block_size: detection.block_size.unwrap_or(DEFAULT_BLOCK_SIZE),
                offset: detection.offset.unwrap_or(DEFAULT_OFFSET),
            },
            jpeg_quality: output.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            default_fps: output.default_fps.unwrap_or(DEFAULT_FPS),
            retry: RetryPolicy {
                backoff: retry
                    .backoff_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_RETRY_BACKOFF),
                max_consecutive: retry.max_consecutive,
            },
            max_sources: file.max_sources.unwrap_or(DEFAULT_MAX_SOURCES),
            sources,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("LOTMON_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(threshold) = std::env::var("LOTMON_OCCUPANCY_THRESHOLD") {
            self.detection.occupancy_threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("LOTMON_OCCUPANCY_THRESHOLD must be a number"))?;
        }
        if let Ok(max) = std::env::var("LOTMON_MAX_SOURCES") {
            self.max_sources = max
                .trim()
                .parse()
                .map_err(|_| anyhow!("LOTMON_MAX_SOURCES must be a non-negative integer"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let threshold = self.detection.occupancy_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!(
                "occupancy threshold must be within [0, 1] (got {})",
                threshold
            ));
        }
        if self.detection.block_size < 3 || self.detection.block_size % 2 == 0 {
            return Err(anyhow!(
                "block size must be odd and at least 3 (got {})",
                self.detection.block_size
            ));
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(anyhow!("jpeg quality must be within 1..=100"));
        }
        if !fps_in_range(self.default_fps) {
            return Err(anyhow!(
                "default fps must be within {}..={} (got {})",
                MIN_FPS,
                MAX_FPS,
                self.default_fps
            ));
        }
        if self.retry.max_consecutive == Some(0) {
            return Err(anyhow!("retry.max_consecutive must be at least 1 when set"));
        }

        let mut seen = HashSet::new();
        for source in &mut self.sources {
            source.id = source.id.trim().to_string();
            if source.id.is_empty() {
                return Err(anyhow!("source id must not be empty"));
            }
            if !seen.insert(source.id.clone()) {
                return Err(anyhow!("duplicate source id '{}'", source.id));
            }
            if source.media.trim().is_empty() {
                return Err(anyhow!("source {}: media must not be empty", source.id));
            }
            if let Some(fps) = source.fps {
                if !fps_in_range(fps) {
                    return Err(anyhow!(
                        "source {}: fps must be within {}..={} (got {})",
                        source.id,
                        MIN_FPS,
                        MAX_FPS,
                        fps
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            addr: self.api_addr.clone(),
            stream_interval: self.stream_interval,
        }
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            threshold_ratio: self.detection.occupancy_threshold,
            jpeg_quality: self.jpeg_quality,
            fallback_fps: self.default_fps,
            retry: self.retry,
        }
    }
}

/// Read a region list: a JSON array of `[x, y, width, height]` entries.
pub fn load_regions(path: &Path) -> Result<Vec<Region>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read region file {}", path.display()))?;
    let regions: Vec<Region> = serde_json::from_str(&raw)
        .with_context(|| format!("invalid region file {}", path.display()))?;
    Ok(regions)
}

/// Two synthetic sources whose regions match the stub's six bays.
fn default_sources() -> Vec<SourceSettings> {
    let bays: Vec<Region> = (0..SYNTHETIC_BAYS)
        .map(|bay| Region::new(20 + bay * 100, 200, 80, 60))
        .collect();
    DEFAULT_SOURCE_IDS
        .iter()
        .map(|id| SourceSettings {
            id: id.to_string(),
            media: format!("stub://lot{}", id),
            regions: RegionSet::Inline(bays.clone()),
            fps: None,
        })
        .collect()
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
