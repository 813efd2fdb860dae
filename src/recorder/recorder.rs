// src/recorder/recorder.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::bucket::{BucketKey, BucketResolver, Transition};
use super::layout::StorageLayout;
use super::scheduler::CaptureScheduler;
use super::worker::{ArchiveTrigger, PassReason};
use super::{CaptureEvent, FrameSink, RecorderConfig};
use crate::core::{Clock, StorageResult};
use crate::monitoring::Metrics;

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    /// Bucket receiving captures after this tick.
    pub key: BucketKey,
    /// Bucket sealed by this tick, if the clock rolled over.
    pub sealed: Option<BucketKey>,
    /// Frame written by this tick.
    pub frame: Option<PathBuf>,
    /// A capture was due but failed.
    pub capture_failed: bool,
    /// The wall clock is behind the open bucket.
    pub regressed: bool,
}

/// The capture-bucket-archive state machine. Owns the only mutable
/// "current bucket" state; everything time-related comes from the clock so
/// it can be driven with synthetic timestamps.
pub struct Recorder {
    clock: Arc<dyn Clock>,
    layout: StorageLayout,
    resolver: BucketResolver,
    scheduler: CaptureScheduler,
    sink: Box<dyn FrameSink>,
    archive: Box<dyn ArchiveTrigger>,
    metrics: Arc<Metrics>,
    sweep_interval: Duration,
    last_sweep: Duration,
    regressed: bool,
}

impl Recorder {
    pub fn new(
        clock: Arc<dyn Clock>,
        layout: StorageLayout,
        scheduler: CaptureScheduler,
        sink: Box<dyn FrameSink>,
        archive: Box<dyn ArchiveTrigger>,
        metrics: Arc<Metrics>,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            clock,
            resolver: BucketResolver::new(layout.granularity()),
            layout,
            scheduler,
            sink,
            archive,
            metrics,
            sweep_interval,
            last_sweep: Duration::ZERO,
            regressed: false,
        }
    }

    pub fn current(&self) -> Option<BucketKey> {
        self.resolver.current()
    }

    /// Prepares storage and catches up on work left by a previous run.
    /// Fails only when the root directory is unusable.
    pub fn start(&mut self) -> StorageResult<BucketKey> {
        self.layout.ensure_root()?;

        match self.layout.clean_partials() {
            Ok(0) => {}
            Ok(n) => log::info!("[screenlog] removed {} partial file(s) from a previous run", n),
            Err(e) => log::warn!("[screenlog] partial cleanup failed: {}", e),
        }

        // Never reopen or write behind a bucket that already exists on disk.
        match self.layout.highest_key() {
            Ok(Some(key)) => self.resolver.seed(key),
            Ok(None) => {}
            Err(e) => log::warn!("[screenlog] scanning existing buckets failed: {}", e),
        }

        let open = self.resolver.observe(self.clock.wall()).key();
        self.last_sweep = self.clock.monotonic();
        self.archive.request_pass(Some(open), PassReason::Startup);

        log::info!(
            "[screenlog] recording into {} (every {:?})",
            self.layout.bucket_dir(&open).display(),
            self.scheduler.interval()
        );
        Ok(open)
    }

    pub fn tick(&mut self) -> TickOutcome {
        let wall = self.clock.wall();
        let now = self.clock.monotonic();

        let transition = self.resolver.observe(wall);
        let key = transition.key();
        let mut out = TickOutcome {
            key,
            sealed: None,
            frame: None,
            capture_failed: false,
            regressed: false,
        };

        match transition {
            Transition::Rollover {
                sealed: Some(prev),
                opened,
            } => {
                self.metrics.rollovers.fetch_add(1, Ordering::Relaxed);
                match self.sink.on_rollover(prev) {
                    Some(bucket) => log::info!(
                        "[screenlog] sealed {} ({} frames), now {}",
                        prev,
                        bucket.images().len(),
                        opened
                    ),
                    None => log::info!("[screenlog] sealed {}, now {}", prev, opened),
                }
                self.archive.request_pass(Some(opened), PassReason::Rollover);
                self.last_sweep = now;
                self.regressed = false;
                out.sealed = Some(prev);
            }
            Transition::Rollover { sealed: None, .. } => {}
            Transition::Regressed { observed, current } => {
                if !self.regressed {
                    log::warn!(
                        "[screenlog] clock moved back into {}, staying in {}",
                        observed,
                        current
                    );
                    self.regressed = true;
                }
                out.regressed = true;
            }
            Transition::Same(_) => self.regressed = false,
        }

        if self.scheduler.is_due(now) {
            match self.scheduler.capture() {
                Ok(image) => {
                    let event = CaptureEvent {
                        image,
                        captured_at: wall,
                    };
                    match self.sink.on_frame(key, &event) {
                        Ok(path) => {
                            self.scheduler.mark_captured(now);
                            self.metrics.captures_ok.fetch_add(1, Ordering::Relaxed);
                            self.metrics.frames_written.fetch_add(1, Ordering::Relaxed);
                            out.frame = Some(path);
                        }
                        Err(e) => {
                            self.scheduler.write_failed(&e);
                            self.metrics.captures_failed.fetch_add(1, Ordering::Relaxed);
                            out.capture_failed = true;
                        }
                    }
                }
                Err(_) => {
                    self.metrics.captures_failed.fetch_add(1, Ordering::Relaxed);
                    out.capture_failed = true;
                }
            }
        }

        if now.saturating_sub(self.last_sweep) >= self.sweep_interval {
            self.archive.request_pass(Some(key), PassReason::Sweep);
            self.last_sweep = now;
        }

        out
    }
}

/// Ticks until `running` is cleared.
pub fn run_recorder(
    mut recorder: Recorder,
    cfg: RecorderConfig,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    while running.load(Ordering::Relaxed) {
        let started = Instant::now();
        recorder.tick();
        std::thread::sleep(cfg.tick.saturating_sub(started.elapsed()));
    }

    if let Some(key) = recorder.current() {
        log::info!("[screenlog] recorder stopped (open bucket {})", key);
    }
    Ok(())
}
