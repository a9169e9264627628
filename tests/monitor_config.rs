use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use lot_monitor::config::{load_regions, MonitorConfig, RegionSet};
use lot_monitor::Region;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "LOTMON_CONFIG",
        "LOTMON_API_ADDR",
        "LOTMON_OCCUPANCY_THRESHOLD",
        "LOTMON_MAX_SOURCES",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut regions = NamedTempFile::new().expect("temp regions");
    regions
        .write_all(b"[[10, 20, 30, 40], [50, 60, 70, 80]]")
        .expect("write regions");

    let mut file = NamedTempFile::new().expect("temp config");
    let json = format!(
        r#"{{
            "api": {{ "addr": "127.0.0.1:9000", "stream_interval_ms": 50 }},
            "detection": {{ "occupancy_threshold": 0.3, "block_size": 15, "offset": 10.0 }},
            "output": {{ "jpeg_quality": 70, "default_fps": 24.0 }},
            "retry": {{ "backoff_ms": 250, "max_consecutive": 5 }},
            "max_sources": 3,
            "sources": [
                {{ "id": "north", "media": "stub://north", "regions_path": "{}" }},
                {{ "id": "south", "media": "/srv/south.mp4", "regions": [[1, 2, 3, 4]], "fps": 12.5 }}
            ]
        }}"#,
        regions.path().display()
    );
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("LOTMON_CONFIG", file.path());
    std::env::set_var("LOTMON_OCCUPANCY_THRESHOLD", "0.25");
    std::env::set_var("LOTMON_MAX_SOURCES", "1");

    let cfg = MonitorConfig::load().expect("load config");

    assert_eq!(cfg.api_addr, "127.0.0.1:9000");
    assert_eq!(cfg.stream_interval, Duration::from_millis(50));
    assert_eq!(cfg.detection.occupancy_threshold, 0.25);
    assert_eq!(cfg.detection.block_size, 15);
    assert_eq!(cfg.jpeg_quality, 70);
    assert_eq!(cfg.default_fps, 24.0);
    assert_eq!(cfg.retry.backoff, Duration::from_millis(250));
    assert_eq!(cfg.retry.max_consecutive, Some(5));
    assert_eq!(cfg.max_sources, 1);
    assert_eq!(cfg.sources.len(), 2);
    assert_eq!(
        cfg.sources[0].regions.load().unwrap(),
        vec![Region::new(10, 20, 30, 40), Region::new(50, 60, 70, 80)]
    );
    assert_eq!(
        cfg.sources[1].regions,
        RegionSet::Inline(vec![Region::new(1, 2, 3, 4)])
    );
    assert_eq!(cfg.sources[1].fps, Some(12.5));

    let settings = cfg.loop_settings();
    assert_eq!(settings.threshold_ratio, 0.25);
    assert_eq!(settings.fallback_fps, 24.0);

    clear_env();
}

#[test]
fn toml_config_is_detected_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp toml");
    file.write_all(
        br#"
max_sources = 1

[api]
addr = "127.0.0.1:5055"

[[sources]]
id = "7"
media = "stub://seven"
regions = [[0, 0, 10, 10]]
"#,
    )
    .expect("write toml");

    let cfg = MonitorConfig::from_path(file.path()).expect("load toml");
    assert_eq!(cfg.api_addr, "127.0.0.1:5055");
    assert_eq!(cfg.sources.len(), 1);
    assert_eq!(cfg.sources[0].id, "7");
    assert_eq!(cfg.detection.occupancy_threshold, 0.2);
}

#[test]
fn rejects_invalid_env_override() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("LOTMON_OCCUPANCY_THRESHOLD", "high");
    assert!(MonitorConfig::load().is_err());

    std::env::set_var("LOTMON_OCCUPANCY_THRESHOLD", "1.2");
    let err = MonitorConfig::load().unwrap_err();
    assert!(err.to_string().contains("occupancy threshold"));

    clear_env();
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = MonitorConfig::load().expect("defaults");
    assert_eq!(cfg.api_addr, "0.0.0.0:5000");
    assert_eq!(cfg.stream_interval, Duration::from_millis(33));
    assert_eq!(cfg.max_sources, 2);
    assert_eq!(
        cfg.sources.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
        vec!["1", "2"]
    );
    assert_eq!(cfg.retry.max_consecutive, None);
}

#[test]
fn region_file_must_hold_four_element_entries() {
    let mut file = NamedTempFile::new().expect("temp regions");
    file.write_all(b"[[1, 2, 3]]").expect("write");
    assert!(load_regions(file.path()).is_err());

    let missing = load_regions(std::path::Path::new("/nonexistent/regions.json")).unwrap_err();
    assert!(missing.to_string().contains("failed to read region file"));
}

#[test]
fn rejects_frame_rate_too_small_to_pace() {
    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(
        br#"{"sources":[{"id":"1","media":"stub://a","regions":[[0,0,4,4]],"fps":5e-324}]}"#,
    )
    .expect("write config");

    let err = MonitorConfig::from_path(file.path()).unwrap_err();
    assert!(err.to_string().contains("fps must be within"));
}
