use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::ConfigError;
use crate::recorder::bucket::Granularity;
use crate::recorder::retention_fs::RetentionPolicy;
use crate::recorder::retry::RetryPolicy;
use crate::recorder::schedule::{Schedule, Timescale};
use crate::recorder::sink_video::VideoSettings;

// ---------- Capture ----------
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
    #[default]
    Screen,
    Pattern,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CaptureConfig {
    pub timescale: Timescale,
    pub per_unit: u32,
    pub tick_ms: u64,
    pub source: CaptureSource,
    pub monitor: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            timescale: Timescale::Second,
            per_unit: 1,
            tick_ms: 250,
            source: CaptureSource::Screen,
            monitor: 0,
        }
    }
}

// ---------- Bucket ----------
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct BucketConfig {
    pub granularity: Granularity,
}

// ---------- Video ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct VideoConfig {
    pub height: u32,
    pub bitrate_kbps: u32,
    pub fps: u32,
    pub encoder: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            height: 512,
            bitrate_kbps: 1024,
            fps: 1,
            encoder: "ffmpeg".into(),
        }
    }
}

// ---------- Archive ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ArchiveConfig {
    pub limit: usize,
    pub sweep_interval_secs: u64,
    pub max_attempts: u32,
    pub retry_base_secs: u64,
    pub retry_max_secs: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            limit: 1,
            sweep_interval_secs: 3600,
            max_attempts: 5,
            retry_base_secs: 60,
            retry_max_secs: 3600,
        }
    }
}

// ---------- Monitoring ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct MonitoringConfig {
    pub metrics_file: Option<String>,
    pub stats_interval_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_file: None,
            stats_interval_secs: 60,
        }
    }
}

// ---------- Root ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct Config {
    pub root_dir: String,
    pub capture: CaptureConfig,
    pub bucket: BucketConfig,
    pub video: VideoConfig,
    pub archive: ArchiveConfig,
    pub monitoring: MonitoringConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: ".".into(),
            capture: CaptureConfig::default(),
            bucket: BucketConfig::default(),
            video: VideoConfig::default(),
            archive: ArchiveConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

// ---------- Loader ----------
pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let txt = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::with_context(format!("reading {}", path.display()), e))?;
    let cfg = Config::from_toml_str(&txt)?;
    Ok(cfg)
}

impl Config {
    pub fn from_toml_str(txt: &str) -> Result<Self, ConfigError> {
        let cfg: Config =
            toml::from_str(txt).map_err(|e| ConfigError::with_context("parsing config", e))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root_dir.trim().is_empty() {
            return Err(ConfigError::message("root_dir must not be empty"));
        }
        if self.capture.per_unit == 0 {
            return Err(ConfigError::message("capture.per_unit must be > 0"));
        }
        if self.capture.tick_ms == 0 {
            return Err(ConfigError::message("capture.tick_ms must be > 0"));
        }
        if self.video.height == 0 {
            return Err(ConfigError::message("video.height must be > 0"));
        }
        if self.video.bitrate_kbps == 0 {
            return Err(ConfigError::message("video.bitrate_kbps must be > 0"));
        }
        if self.video.fps == 0 {
            return Err(ConfigError::message("video.fps must be > 0"));
        }
        if self.video.encoder.trim().is_empty() {
            return Err(ConfigError::message("video.encoder must not be empty"));
        }
        if self.archive.limit == 0 {
            return Err(ConfigError::message(
                "archive.limit must be >= 1 (the open bucket counts)",
            ));
        }
        if self.archive.sweep_interval_secs == 0 {
            return Err(ConfigError::message("archive.sweep_interval_secs must be > 0"));
        }
        if self.archive.max_attempts == 0 {
            return Err(ConfigError::message("archive.max_attempts must be > 0"));
        }
        if self.archive.retry_base_secs > self.archive.retry_max_secs {
            return Err(ConfigError::message(
                "archive.retry_base_secs must not exceed archive.retry_max_secs",
            ));
        }
        Ok(())
    }

    pub fn root(&self) -> PathBuf {
        PathBuf::from(&self.root_dir)
    }

    pub fn schedule(&self) -> Schedule {
        Schedule::new(self.capture.timescale, self.capture.per_unit)
    }

    pub fn tick(&self) -> Duration {
        // Never tick slower than the capture interval.
        Duration::from_millis(self.capture.tick_ms).min(self.schedule().interval())
    }

    pub fn video_settings(&self) -> VideoSettings {
        VideoSettings {
            height: self.video.height,
            bitrate_kbps: self.video.bitrate_kbps,
            fps: self.video.fps,
            encoder: PathBuf::from(&self.video.encoder),
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.archive.limit)
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.archive.max_attempts,
            base: Duration::from_secs(self.archive.retry_base_secs),
            max: Duration::from_secs(self.archive.retry_max_secs),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.archive.sweep_interval_secs)
    }
}
