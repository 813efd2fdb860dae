// src/recorder/mod.rs

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDateTime;
use image::RgbaImage;

use crate::core::CaptureError;

pub struct RecorderConfig {
    /// Sleep between ticks.
    pub tick: Duration,
    /// Archive pass cadence besides rollover and startup.
    pub sweep_interval: Duration,
}

/// One captured frame and when it was taken.
pub struct CaptureEvent {
    pub image: RgbaImage,
    pub captured_at: NaiveDateTime,
}

/// Receives frames for the open bucket.
pub trait FrameSink: Send {
    /// Persists a frame into `key`'s bucket, opening it first if needed.
    fn on_frame(&mut self, key: BucketKey, event: &CaptureEvent) -> Result<PathBuf, CaptureError>;
    /// Closes `sealed` to further frames and hands it back, if it was open.
    fn on_rollover(&mut self, sealed: BucketKey) -> Option<Bucket>;
}

pub mod archiver;
pub mod bucket;
pub mod layout;
pub mod recorder;
pub mod retention_fs;
pub mod retry;
pub mod schedule;
pub mod scheduler;
pub mod sink_png;
pub mod sink_video;
pub mod worker;

pub use archiver::{Archiver, PassReport};
pub use bucket::{Bucket, BucketKey, BucketResolver, BucketState, Granularity, Transition};
pub use layout::StorageLayout;
pub use recorder::{Recorder, TickOutcome, run_recorder};
pub use retention_fs::{FsRetention, RetentionPolicy};
pub use retry::RetryPolicy;
pub use schedule::{Schedule, Timescale};
pub use scheduler::CaptureScheduler;
pub use sink_png::PngSink;
pub use sink_video::{EncodeJob, FfmpegEncoder, VideoEncoder, VideoSettings};
pub use worker::{ArchiveTrigger, ArchiveWorker, InlineArchive, PassReason};
