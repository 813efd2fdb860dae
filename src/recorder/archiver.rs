// src/recorder/archiver.rs
use std::fs;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Context;

use super::bucket::{BucketKey, BucketState};
use super::layout::StorageLayout;
use super::retention_fs::{FsRetention, RetentionPolicy};
use super::retry::{FailureOutcome, FailureTracker, RetryPolicy};
use super::sink_video::{EncodeJob, VideoEncoder, VideoSettings};
use crate::core::{ComponentLogger, EncodeError, LogContext};
use crate::monitoring::Metrics;

/// Outcome of one archiving pass. Errors are per bucket; a failing bucket
/// never stops the others.
#[derive(Debug, Default)]
pub struct PassReport {
    pub archived: Vec<BucketKey>,
    pub evicted: Vec<BucketKey>,
    pub failed: Vec<(BucketKey, EncodeError)>,
    /// Skipped this pass because a previous failure is still backing off.
    pub deferred: Vec<BucketKey>,
    /// Gave up during this pass.
    pub flagged: Vec<BucketKey>,
    /// Beyond the retention limit but kept because encoding gave up.
    pub pinned: Vec<BucketKey>,
    /// Beyond the retention limit, kept until a retry archives them.
    pub awaiting_archive: Vec<BucketKey>,
}

impl PassReport {
    pub fn is_idle(&self) -> bool {
        self.archived.is_empty()
            && self.evicted.is_empty()
            && self.failed.is_empty()
            && self.flagged.is_empty()
    }
}

/// Turns sealed buckets into videos and evicts source images beyond the
/// retention limit. State is re-derived from disk on every pass.
pub struct Archiver {
    layout: StorageLayout,
    encoder: Box<dyn VideoEncoder>,
    settings: VideoSettings,
    retention: RetentionPolicy,
    fs_retention: FsRetention,
    failures: FailureTracker,
    metrics: Arc<Metrics>,
    newest_open: Option<BucketKey>,
}

impl Archiver {
    pub fn new(
        layout: StorageLayout,
        encoder: Box<dyn VideoEncoder>,
        settings: VideoSettings,
        retention: RetentionPolicy,
        retry: RetryPolicy,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            fs_retention: FsRetention::new(layout.clone()),
            layout,
            encoder,
            settings,
            retention,
            failures: FailureTracker::new(retry),
            metrics,
            newest_open: None,
        }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// `open` and anything newer is never touched. `now` is monotonic time,
    /// used for backoff.
    pub fn run_pass(&mut self, open: Option<BucketKey>, now: Duration) -> anyhow::Result<PassReport> {
        let mut report = PassReport::default();
        self.metrics.archive_passes.fetch_add(1, Ordering::Relaxed);

        // Requests can arrive out of order; the open key never moves back.
        if open < self.newest_open {
            self.debug(&format!(
                "stale open key {:?}, keeping {:?}",
                open.map(|k| k.to_string()),
                self.newest_open.map(|k| k.to_string())
            ));
        }
        let open = open.max(self.newest_open);
        self.newest_open = open;

        let statuses = self.layout.scan(open).context("scanning buckets")?;

        for status in statuses.iter().filter(|s| s.state == BucketState::Sealed) {
            if status.flagged {
                continue;
            }
            if status.image_count == 0 {
                // Nothing was ever captured into it.
                if let Err(e) = self.layout.evict(&status.key) {
                    self.bucket_error(&status.key.to_string(), &format!("removing empty bucket: {}", e));
                }
                continue;
            }
            if !self.failures.may_attempt(&status.key, now) {
                report.deferred.push(status.key);
                continue;
            }
            self.archive_bucket(status.key, now, &mut report);
        }

        let statuses = self.layout.scan(open).context("rescanning buckets")?;
        let plan = self.retention.plan(&statuses, open);

        if !plan.archive_first.is_empty() {
            let keys: Vec<String> = plan.archive_first.iter().map(|k| k.to_string()).collect();
            self.warn(&format!(
                "keeping {} unarchived bucket(s) beyond the retention limit until encoded: {}",
                keys.len(),
                keys.join(", ")
            ));
        }
        report.awaiting_archive = plan.archive_first;

        for key in plan.evict {
            match self.fs_retention.evict(&key) {
                Ok(true) => {
                    self.metrics.buckets_evicted.fetch_add(1, Ordering::Relaxed);
                    report.evicted.push(key);
                }
                Ok(false) => {}
                Err(e) => self.bucket_error(&key.to_string(), &format!("eviction failed: {}", e)),
            }
        }

        if !plan.pinned.is_empty() {
            let keys: Vec<String> = plan.pinned.iter().map(|k| k.to_string()).collect();
            self.warn(&format!(
                "keeping {} failed bucket(s) beyond the retention limit: {}",
                keys.len(),
                keys.join(", ")
            ));
        }
        report.pinned = plan.pinned;

        Ok(report)
    }

    fn archive_bucket(&mut self, key: BucketKey, now: Duration, report: &mut PassReport) {
        let name = key.to_string();
        let video = self.layout.video_path(&key);
        let partial = self.layout.partial_video_path(&key);

        let images = match self.layout.list_images(&key) {
            Ok(images) => images,
            Err(e) => {
                self.bucket_error(&name, &format!("listing images: {}", e));
                report.failed.push((key, EncodeError::io("listing images", e)));
                return;
            }
        };

        let _ = fs::remove_file(&partial);
        let job = EncodeJob {
            key: name.clone(),
            images,
            output: partial.clone(),
            settings: self.settings.clone(),
        };

        self.bucket_info(&name, &format!("encoding {} frames", job.images.len()));

        let result = self.encoder.encode(&job).and_then(|()| {
            if !partial.is_file() {
                return Err(EncodeError::MissingOutput { key: name.clone() });
            }
            fs::rename(&partial, &video)
                .map_err(|e| EncodeError::io(format!("renaming {:?}", partial), e))
        });

        match result {
            Ok(()) => {
                self.failures.record_success(&key);
                self.metrics.encodes_ok.fetch_add(1, Ordering::Relaxed);
                self.bucket_info(&name, &format!("archived -> {}", video.display()));
                report.archived.push(key);
            }
            Err(err) => {
                let _ = fs::remove_file(&partial);
                self.metrics.encodes_failed.fetch_add(1, Ordering::Relaxed);

                match self.failures.record_failure(key, now) {
                    FailureOutcome::RetryAfter(wait) => {
                        self.bucket_error(&name, &format!("encode failed: {} (retry in {:?})", err, wait));
                    }
                    FailureOutcome::GiveUp { failures } => {
                        self.bucket_error(
                            &name,
                            &format!("encode failed {} times, giving up: {}", failures, err),
                        );
                        let reason = format!("{} consecutive failures, last: {}\n", failures, err);
                        if let Err(e) = self.layout.mark_failed(&key, &reason) {
                            self.bucket_error(&name, &format!("writing failure marker: {}", e));
                        }
                        report.flagged.push(key);
                    }
                }
                report.failed.push((key, err));
            }
        }
    }
}

impl ComponentLogger for Archiver {
    fn log_context(&self) -> LogContext {
        LogContext::new("archive", &self.layout.root().display().to_string())
    }
}
