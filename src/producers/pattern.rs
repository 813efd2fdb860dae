// src/producers/pattern.rs
use image::{Rgba, RgbaImage};

use super::ScreenSource;
use crate::core::CaptureError;

pub const DEFAULT_WIDTH: u32 = 320;
pub const DEFAULT_HEIGHT: u32 = 180;

const BAR_WIDTH: u32 = 16;
const BAR_STEP: u32 = 8;

/// Synthetic screen: a static gradient with a bar that moves on every
/// frame. Useful without a display (CI, containers).
pub struct PatternScreen {
    width: u32,
    height: u32,
    frame: u64,
}

impl PatternScreen {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            frame: 0,
        }
    }
}

impl ScreenSource for PatternScreen {
    fn name(&self) -> &str {
        "pattern"
    }

    fn capture(&mut self) -> Result<RgbaImage, CaptureError> {
        let (w, h) = (self.width, self.height);
        let bar = ((self.frame * u64::from(BAR_STEP)) % u64::from(w)) as u32;

        let img = RgbaImage::from_fn(w, h, |x, y| {
            if x >= bar && x < bar + BAR_WIDTH {
                return Rgba([255, 255, 255, 255]);
            }
            let r = (x * 255 / w) as u8;
            let g = (y * 255 / h) as u8;
            Rgba([r, g, 96, 255])
        });

        self.frame += 1;
        Ok(img)
    }
}
