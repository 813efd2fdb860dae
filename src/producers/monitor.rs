// src/producers/monitor.rs
use std::time::Instant;

use image::RgbaImage;
use xcap::Monitor;

use super::ScreenSource;
use crate::core::CaptureError;

/// Grabs one monitor through `xcap`. Monitors are enumerated on every
/// capture so a display that appears later (login, hotplug) is picked up.
pub struct MonitorScreen {
    index: usize,
    name: String,
}

impl MonitorScreen {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            name: format!("monitor{}", index),
        }
    }
}

impl ScreenSource for MonitorScreen {
    fn name(&self) -> &str {
        &self.name
    }

    fn capture(&mut self) -> Result<RgbaImage, CaptureError> {
        let start = Instant::now();

        let monitors = Monitor::all()
            .map_err(|e| CaptureError::backend(format!("enumerating monitors: {}", e)))?;
        if monitors.is_empty() {
            return Err(CaptureError::NoDisplay);
        }
        let monitor = monitors.get(self.index).unwrap_or(&monitors[0]);

        let raw = monitor
            .capture_image()
            .map_err(|e| CaptureError::backend(format!("capturing {}: {}", self.name, e)))?;

        let (w, h) = (raw.width(), raw.height());
        if w == 0 || h == 0 {
            return Err(CaptureError::NoDisplay);
        }

        // Rebuild from raw bytes so xcap's `image` version does not leak out.
        let img = RgbaImage::from_raw(w, h, raw.into_raw())
            .ok_or_else(|| CaptureError::backend("unexpected frame buffer size"))?;

        log::trace!("[capture] {} {}x{} in {:?}", self.name, w, h, start.elapsed());
        Ok(img)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "requires a graphical display"]
    fn test_capture_primary_monitor() {
        let mut screen = MonitorScreen::new(0);
        let img = screen.capture().expect("capture failed");
        assert!(img.width() > 0 && img.height() > 0);
    }
}
