// src/recorder/worker.rs
//
// Encoding runs off the tick loop. The loop only sends requests; a single
// worker thread processes them in order, which also guarantees that at most
// one encode per bucket is in flight.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam::channel::{Receiver, Sender, unbounded};

use super::archiver::{Archiver, PassReport};
use super::bucket::BucketKey;
use crate::core::{Clock, lock_mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
    Startup,
    Rollover,
    Sweep,
}

impl fmt::Display for PassReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PassReason::Startup => "startup",
            PassReason::Rollover => "rollover",
            PassReason::Sweep => "sweep",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub enum ArchiveRequest {
    Pass {
        open: Option<BucketKey>,
        reason: PassReason,
    },
    Shutdown,
}

/// Where the recorder hands off archiving work.
pub trait ArchiveTrigger: Send {
    fn request_pass(&self, open: Option<BucketKey>, reason: PassReason);
}

pub struct ArchiveWorker {
    tx: Sender<ArchiveRequest>,
    handle: Option<JoinHandle<()>>,
}

impl ArchiveWorker {
    pub fn spawn(archiver: Archiver, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let (tx, rx) = unbounded();
        let handle = std::thread::Builder::new()
            .name("archive".into())
            .spawn(move || run_worker(archiver, clock, rx))?;

        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// Lets the worker finish what is queued, then joins it.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.tx.send(ArchiveRequest::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("[archive] worker panicked");
            }
        }
    }
}

impl Drop for ArchiveWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl ArchiveTrigger for ArchiveWorker {
    fn request_pass(&self, open: Option<BucketKey>, reason: PassReason) {
        if self.tx.send(ArchiveRequest::Pass { open, reason }).is_err() {
            log::error!("[archive] worker gone, {} pass dropped", reason);
        }
    }
}

fn run_worker(mut archiver: Archiver, clock: Arc<dyn Clock>, rx: Receiver<ArchiveRequest>) {
    log::info!("[archive] worker started");

    while let Ok(first) = rx.recv() {
        // Coalesce a backlog into one pass; the newest open key wins.
        let mut pending: Option<(Option<BucketKey>, PassReason)> = None;
        let mut shutdown = false;
        for req in std::iter::once(first).chain(rx.try_iter()) {
            match req {
                ArchiveRequest::Pass { open, reason } => pending = Some((open, reason)),
                ArchiveRequest::Shutdown => shutdown = true,
            }
        }

        if let Some((open, reason)) = pending {
            run_logged(&mut archiver, open, reason, clock.as_ref());
        }
        if shutdown {
            break;
        }
    }

    log::info!("[archive] worker stopped");
}

fn run_logged(
    archiver: &mut Archiver,
    open: Option<BucketKey>,
    reason: PassReason,
    clock: &dyn Clock,
) -> Option<PassReport> {
    log::debug!("[archive] {} pass (open={:?})", reason, open.map(|k| k.to_string()));
    match archiver.run_pass(open, clock.monotonic()) {
        Ok(report) => {
            if !report.is_idle() {
                log::info!(
                    "[archive] {} pass: archived={} evicted={} failed={} deferred={}",
                    reason,
                    report.archived.len(),
                    report.evicted.len(),
                    report.failed.len(),
                    report.deferred.len()
                );
            }
            Some(report)
        }
        Err(e) => {
            log::error!("[archive] {} pass aborted: {:#}", reason, e);
            None
        }
    }
}

/// Runs passes on the calling thread. Used where determinism matters more
/// than keeping the tick loop free (tests, one-shot runs).
pub struct InlineArchive {
    archiver: Mutex<Archiver>,
    clock: Arc<dyn Clock>,
    reports: Mutex<Vec<PassReport>>,
}

impl InlineArchive {
    pub fn new(archiver: Archiver, clock: Arc<dyn Clock>) -> Self {
        Self {
            archiver: Mutex::new(archiver),
            clock,
            reports: Mutex::new(Vec::new()),
        }
    }

    pub fn take_reports(&self) -> Vec<PassReport> {
        std::mem::take(&mut *lock_mutex(&self.reports, "inline_archive.reports"))
    }
}

impl ArchiveTrigger for InlineArchive {
    fn request_pass(&self, open: Option<BucketKey>, reason: PassReason) {
        let mut archiver = lock_mutex(&self.archiver, "inline_archive");
        if let Some(report) = run_logged(&mut archiver, open, reason, self.clock.as_ref()) {
            lock_mutex(&self.reports, "inline_archive.reports").push(report);
        }
    }
}

impl<T: ArchiveTrigger + Sync> ArchiveTrigger for Arc<T> {
    fn request_pass(&self, open: Option<BucketKey>, reason: PassReason) {
        (**self).request_pass(open, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::Metrics;
    use crate::recorder::bucket::Granularity;
    use crate::recorder::layout::{StorageLayout, image_file_name};
    use crate::recorder::retention_fs::RetentionPolicy;
    use crate::recorder::retry::RetryPolicy;
    use crate::recorder::sink_video::VideoSettings;
    use crate::testing::mocks::{ManualClock, MockEncoder};
    use std::path::PathBuf;

    fn archiver(layout: &StorageLayout, encoder: &MockEncoder) -> Archiver {
        Archiver::new(
            layout.clone(),
            Box::new(encoder.clone()),
            VideoSettings {
                height: 240,
                bitrate_kbps: 256,
                fps: 1,
                encoder: PathBuf::from("ffmpeg"),
            },
            RetentionPolicy::new(1),
            RetryPolicy::default(),
            Arc::new(Metrics::new()),
        )
    }

    fn seed(layout: &StorageLayout, key: &str) -> BucketKey {
        let k = Granularity::Day.parse_key(key).unwrap();
        let dir = layout.bucket_dir(&k);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(image_file_name(0, k.start())), b"png").unwrap();
        k
    }

    #[test]
    fn test_worker_processes_before_shutdown() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(tmp.path(), Granularity::Day);
        layout.ensure_root().unwrap();
        let encoder = MockEncoder::new();
        let sealed = seed(&layout, "2024-05-01");
        let open = Granularity::Day.parse_key("2024-05-02").unwrap();

        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at("2024-05-02 00:00:01"));
        let worker = ArchiveWorker::spawn(archiver(&layout, &encoder), clock).unwrap();
        worker.request_pass(Some(open), PassReason::Rollover);
        worker.request_pass(Some(open), PassReason::Sweep);
        worker.shutdown();

        assert!(layout.is_archived(&sealed));
        assert!(!layout.bucket_dir(&sealed).exists());
        assert_eq!(encoder.jobs().len(), 1);
    }

    #[test]
    fn test_inline_archive_collects_reports() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(tmp.path(), Granularity::Day);
        layout.ensure_root().unwrap();
        let encoder = MockEncoder::new();
        seed(&layout, "2024-05-01");

        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at("2024-05-02 00:00:01"));
        let inline = InlineArchive::new(archiver(&layout, &encoder), clock);
        inline.request_pass(Granularity::Day.parse_key("2024-05-02"), PassReason::Startup);

        let reports = inline.take_reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].archived.len(), 1);
        assert!(inline.take_reports().is_empty());
    }
}
