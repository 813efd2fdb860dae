use std::collections::HashSet;
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDateTime;
use image::{Rgba, RgbaImage};

use crate::core::{CaptureError, Clock, EncodeError, lock_mutex};
use crate::producers::ScreenSource;
use crate::recorder::{EncodeJob, VideoEncoder};

/// Clock moved by hand. Clones share the same time.
#[derive(Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<(NaiveDateTime, Duration)>>,
}

impl ManualClock {
    pub fn new(wall: NaiveDateTime) -> Self {
        Self {
            inner: Arc::new(Mutex::new((wall, Duration::ZERO))),
        }
    }

    /// `"YYYY-MM-DD HH:MM:SS"`. Panics on malformed input.
    pub fn at(wall: &str) -> Self {
        Self::new(parse_wall(wall))
    }

    /// Moves wall and monotonic time forward together.
    pub fn advance(&self, by: Duration) {
        let mut guard = lock_mutex(&self.inner, "manual_clock");
        guard.0 += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        guard.1 += by;
    }

    /// Jumps the wall clock only, like an NTP step or a manual change.
    pub fn set_wall(&self, wall: &str) {
        lock_mutex(&self.inner, "manual_clock").0 = parse_wall(wall);
    }
}

impl Clock for ManualClock {
    fn wall(&self) -> NaiveDateTime {
        lock_mutex(&self.inner, "manual_clock").0
    }

    fn monotonic(&self) -> Duration {
        lock_mutex(&self.inner, "manual_clock").1
    }
}

fn parse_wall(s: &str) -> NaiveDateTime {
    match NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        Ok(t) => t,
        Err(e) => panic!("bad wall time {:?}: {}", s, e),
    }
}

#[derive(Default)]
struct ScreenScript {
    fail_next: u32,
    captures: u64,
    attempts: u64,
}

/// Screen that returns a tiny frame, or fails on demand.
#[derive(Clone, Default)]
pub struct MockScreen {
    inner: Arc<Mutex<ScreenScript>>,
}

impl MockScreen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, n: u32) {
        lock_mutex(&self.inner, "mock_screen").fail_next = n;
    }

    pub fn captures(&self) -> u64 {
        lock_mutex(&self.inner, "mock_screen").captures
    }

    pub fn attempts(&self) -> u64 {
        lock_mutex(&self.inner, "mock_screen").attempts
    }
}

impl ScreenSource for MockScreen {
    fn name(&self) -> &str {
        "mock"
    }

    fn capture(&mut self) -> Result<RgbaImage, CaptureError> {
        let mut s = lock_mutex(&self.inner, "mock_screen");
        s.attempts += 1;
        if s.fail_next > 0 {
            s.fail_next -= 1;
            return Err(CaptureError::NoDisplay);
        }
        s.captures += 1;
        let shade = (s.captures % 256) as u8;
        Ok(RgbaImage::from_pixel(4, 4, Rgba([shade, shade, shade, 255])))
    }
}

#[derive(Default)]
struct EncoderScript {
    jobs: Vec<EncodeJob>,
    failing: HashSet<String>,
    skip_output: bool,
}

/// Encoder that writes a small placeholder file and records every job.
#[derive(Clone, Default)]
pub struct MockEncoder {
    inner: Arc<Mutex<EncoderScript>>,
}

impl MockEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, key: &str) {
        lock_mutex(&self.inner, "mock_encoder")
            .failing
            .insert(key.to_string());
    }

    pub fn succeed_for(&self, key: &str) {
        lock_mutex(&self.inner, "mock_encoder").failing.remove(key);
    }

    /// Report success without producing a file.
    pub fn skip_output(&self, skip: bool) {
        lock_mutex(&self.inner, "mock_encoder").skip_output = skip;
    }

    pub fn jobs(&self) -> Vec<EncodeJob> {
        lock_mutex(&self.inner, "mock_encoder").jobs.clone()
    }
}

impl VideoEncoder for MockEncoder {
    fn encode(&self, job: &EncodeJob) -> Result<(), EncodeError> {
        let mut s = lock_mutex(&self.inner, "mock_encoder");
        s.jobs.push(job.clone());

        if s.failing.contains(&job.key) {
            return Err(EncodeError::Failed {
                key: job.key.clone(),
                status: "exit status: 1".into(),
                stderr: "mock failure".into(),
            });
        }
        if job.images.is_empty() {
            return Err(EncodeError::NoImages(job.key.clone()));
        }
        if s.skip_output {
            return Ok(());
        }

        let body = format!("mock-video {} frames={}\n", job.key, job.images.len());
        fs::write(&job.output, body).map_err(|e| EncodeError::io("writing mock video", e))
    }
}
