use std::fmt::Write;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::timestamp::{format_utc_ns, utc_ns_now};

#[derive(Debug, Default)]
pub struct Metrics {
    pub captures_ok: AtomicU64,
    pub captures_failed: AtomicU64,
    pub frames_written: AtomicU64,
    pub rollovers: AtomicU64,
    pub archive_passes: AtomicU64,
    pub encodes_ok: AtomicU64,
    pub encodes_failed: AtomicU64,
    pub buckets_evicted: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub captures_ok: u64,
    pub captures_failed: u64,
    pub frames_written: u64,
    pub rollovers: u64,
    pub archive_passes: u64,
    pub encodes_ok: u64,
    pub encodes_failed: u64,
    pub buckets_evicted: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            captures_ok: self.captures_ok.load(Ordering::Relaxed),
            captures_failed: self.captures_failed.load(Ordering::Relaxed),
            frames_written: self.frames_written.load(Ordering::Relaxed),
            rollovers: self.rollovers.load(Ordering::Relaxed),
            archive_passes: self.archive_passes.load(Ordering::Relaxed),
            encodes_ok: self.encodes_ok.load(Ordering::Relaxed),
            encodes_failed: self.encodes_failed.load(Ordering::Relaxed),
            buckets_evicted: self.buckets_evicted.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    pub fn summary(&self) -> String {
        format!(
            "captures ok={} failed={} | encodes ok={} failed={} | evicted={}",
            self.captures_ok,
            self.captures_failed,
            self.encodes_ok,
            self.encodes_failed,
            self.buckets_evicted
        )
    }
}

pub fn build_metrics(snapshot: &MetricsSnapshot) -> String {
    let mut output = String::new();
    let counters: [(&str, &str, u64); 8] = [
        ("screenlog_captures_total", "Successful screen captures.", snapshot.captures_ok),
        (
            "screenlog_capture_failures_total",
            "Capture attempts that failed.",
            snapshot.captures_failed,
        ),
        (
            "screenlog_frames_written_total",
            "Frames persisted into bucket directories.",
            snapshot.frames_written,
        ),
        ("screenlog_rollovers_total", "Bucket rollovers observed.", snapshot.rollovers),
        (
            "screenlog_archive_passes_total",
            "Archiving passes executed.",
            snapshot.archive_passes,
        ),
        ("screenlog_encodes_total", "Buckets encoded into videos.", snapshot.encodes_ok),
        (
            "screenlog_encode_failures_total",
            "Encoder invocations that failed.",
            snapshot.encodes_failed,
        ),
        (
            "screenlog_buckets_evicted_total",
            "Bucket directories removed after archiving.",
            snapshot.buckets_evicted,
        ),
    ];

    for (name, help, value) in counters {
        let _ = writeln!(output, "# HELP {} {}", name, help);
        let _ = writeln!(output, "# TYPE {} counter", name);
        let _ = writeln!(output, "{} {}", name, value);
    }

    let _ = writeln!(output, "# generated at {}", format_utc_ns(utc_ns_now()));
    output
}

/// Writes the Prometheus text exposition atomically (node_exporter textfile style).
pub fn write_metrics_file(path: &Path, metrics: &Metrics) -> anyhow::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, build_metrics(&metrics.snapshot()))?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let m = Metrics::new();
        m.captures_ok.fetch_add(3, Ordering::Relaxed);
        m.encodes_failed.fetch_add(1, Ordering::Relaxed);

        let s = m.snapshot();
        assert_eq!(s.captures_ok, 3);
        assert_eq!(s.encodes_failed, 1);
        assert!(s.summary().contains("captures ok=3"));
    }

    #[test]
    fn test_build_metrics_format() {
        let m = Metrics::new();
        m.buckets_evicted.fetch_add(2, Ordering::Relaxed);
        let text = build_metrics(&m.snapshot());
        assert!(text.contains("# TYPE screenlog_buckets_evicted_total counter"));
        assert!(text.contains("screenlog_buckets_evicted_total 2\n"));
    }

    #[test]
    fn test_write_metrics_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("screenlog.prom");
        write_metrics_file(&path, &Metrics::new()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("screenlog_captures_total 0"));
        assert!(!tmp.path().join("screenlog.prom.tmp").exists());
    }
}
