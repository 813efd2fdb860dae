use std::time::Duration;

use screenlog_node::config::{self, CaptureSource};
use screenlog_node::recorder::{Granularity, Timescale};

#[test]
fn test_bundled_config_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/screenlog.toml");
    let cfg = config::load(path).unwrap();

    assert_eq!(cfg.capture.timescale, Timescale::Minute);
    assert_eq!(cfg.capture.per_unit, 15);
    assert_eq!(cfg.capture.source, CaptureSource::Screen);
    assert_eq!(cfg.bucket.granularity, Granularity::Day);
    assert_eq!(cfg.schedule().interval(), Duration::from_secs(4));
    assert_eq!(cfg.tick(), Duration::from_millis(250));
    assert_eq!(cfg.retention().limit, 2);
    assert!(cfg.monitoring.metrics_file.is_none());
}

#[test]
fn test_missing_file_names_path() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("nope.toml");
    let err = config::load(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("nope.toml"));
}

#[test]
fn test_partial_file_keeps_defaults() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("screenlog.toml");
    std::fs::write(
        &path,
        "root_dir = \"/var/lib/screenlog\"\n[bucket]\ngranularity = \"hour\"\n[capture]\nsource = \"pattern\"\n",
    )
    .unwrap();

    let cfg = config::load(&path).unwrap();
    assert_eq!(cfg.root().to_str(), Some("/var/lib/screenlog"));
    assert_eq!(cfg.bucket.granularity, Granularity::Hour);
    assert_eq!(cfg.capture.source, CaptureSource::Pattern);
    assert_eq!(cfg.archive.limit, 1);
    assert_eq!(cfg.video.height, 512);
    assert_eq!(cfg.retry().max_attempts, 5);
}

#[test]
fn test_rejects_zero_limit_and_unknown_granularity() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("bad.toml");

    std::fs::write(&path, "[archive]\nlimit = 0\n").unwrap();
    assert!(config::load(&path).is_err());

    std::fs::write(&path, "[bucket]\ngranularity = \"week\"\n").unwrap();
    assert!(config::load(&path).is_err());
}
