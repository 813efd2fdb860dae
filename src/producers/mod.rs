// src/producers/mod.rs
//
// Screen capture collaborators.

use image::RgbaImage;

use crate::config::{CaptureConfig, CaptureSource};
use crate::core::CaptureError;

#[cfg(feature = "screen")]
pub mod monitor;
pub mod pattern;

#[cfg(feature = "screen")]
pub use monitor::MonitorScreen;
pub use pattern::PatternScreen;

/// Something that can grab one frame of the screen.
pub trait ScreenSource: Send {
    fn name(&self) -> &str;
    fn capture(&mut self) -> Result<RgbaImage, CaptureError>;
}

pub fn build_source(cfg: &CaptureConfig) -> anyhow::Result<Box<dyn ScreenSource>> {
    if cfg!(feature = "mock-screen") {
        log::info!("[capture] mock-screen build, using test pattern");
        return Ok(Box::new(PatternScreen::new(
            pattern::DEFAULT_WIDTH,
            pattern::DEFAULT_HEIGHT,
        )));
    }

    match cfg.source {
        CaptureSource::Pattern => Ok(Box::new(PatternScreen::new(
            pattern::DEFAULT_WIDTH,
            pattern::DEFAULT_HEIGHT,
        ))),
        #[cfg(feature = "screen")]
        CaptureSource::Screen => Ok(Box::new(MonitorScreen::new(cfg.monitor))),
        #[cfg(not(feature = "screen"))]
        CaptureSource::Screen => {
            anyhow::bail!("capture.source = \"screen\" requires the `screen` feature")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_pattern_source() {
        let cfg = CaptureConfig {
            source: CaptureSource::Pattern,
            ..CaptureConfig::default()
        };
        let mut source = build_source(&cfg).unwrap();
        assert_eq!(source.name(), "pattern");
        let frame = source.capture().unwrap();
        assert_eq!(frame.width(), pattern::DEFAULT_WIDTH);
    }
}
