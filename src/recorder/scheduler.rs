// src/recorder/scheduler.rs
use std::time::Duration;

use image::RgbaImage;

use super::schedule::Schedule;
use crate::core::{CaptureError, ComponentLogger, LogContext};
use crate::producers::ScreenSource;

// Log the first failure of a streak, then every Nth.
const FAILURE_LOG_EVERY: u64 = 100;

/// Decides when a capture is due and invokes the screen source.
///
/// Slots are anchored: after a capture in slot `s`, the next one is due at
/// `s + interval`, so a tick that runs late does not shift every later
/// capture. When more than one interval behind, the schedule re-anchors on
/// the current instant instead of catching up in a burst.
pub struct CaptureScheduler {
    source: Box<dyn ScreenSource>,
    interval: Duration,
    slot: Option<Duration>,
    attempts: u64,
    failure_streak: u64,
}

impl CaptureScheduler {
    pub fn new(source: Box<dyn ScreenSource>, schedule: Schedule) -> Self {
        Self {
            source,
            interval: schedule.interval(),
            slot: None,
            attempts: 0,
            failure_streak: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Capture attempts made so far, successful or not.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn is_due(&self, now: Duration) -> bool {
        match self.slot {
            None => true,
            Some(slot) => now >= slot + self.interval,
        }
    }

    /// Consecutive attempts that did not end in a persisted frame.
    pub fn failure_streak(&self) -> u64 {
        self.failure_streak
    }

    /// Invokes the source once. Does not advance the schedule; a failed
    /// attempt is retried on the next tick.
    pub fn capture(&mut self) -> Result<RgbaImage, CaptureError> {
        self.attempts += 1;
        self.source.capture().inspect_err(|err| self.note_failure(err))
    }

    /// A captured frame could not be persisted. Counts towards the same
    /// streak as source failures.
    pub fn write_failed(&mut self, err: &CaptureError) {
        self.note_failure(err);
    }

    fn note_failure(&mut self, err: &CaptureError) {
        self.failure_streak += 1;
        if self.failure_streak == 1 || self.failure_streak % FAILURE_LOG_EVERY == 0 {
            self.warn(&format!(
                "capture failed ({} in a row): {}",
                self.failure_streak, err
            ));
        }
    }

    /// Records a persisted capture at `now` and moves to the next slot.
    pub fn mark_captured(&mut self, now: Duration) {
        if self.failure_streak > 0 {
            self.info(&format!(
                "capture recovered after {} failed attempts",
                self.failure_streak
            ));
            self.failure_streak = 0;
        }
        self.slot = Some(match self.slot {
            Some(slot) if now < slot + self.interval * 2 => slot + self.interval,
            _ => now,
        });
    }
}

impl ComponentLogger for CaptureScheduler {
    fn log_context(&self) -> LogContext {
        LogContext::new("capture", self.source.name())
    }
}
