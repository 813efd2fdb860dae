use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{Local, NaiveDateTime};

/// Time source for the recorder. Wall time drives bucket keys, monotonic
/// time drives the capture cadence, so a clock jump never bursts captures.
pub trait Clock: Send + Sync {
    /// Local wall-clock time.
    fn wall(&self) -> NaiveDateTime;
    /// Time elapsed since the clock was created. Never goes backwards.
    fn monotonic(&self) -> Duration;
}

pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn wall(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn monotonic(&self) -> Duration {
        self.started.elapsed()
    }
}

pub fn utc_ns_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

pub fn format_utc_ns(utc_ns: u64) -> String {
    let seconds = utc_ns / 1_000_000_000;
    let nanos = utc_ns % 1_000_000_000;
    format!("{}.{:09}", seconds, nanos)
}
