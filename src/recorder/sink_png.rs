// src/recorder/sink_png.rs
use std::fs::{self, create_dir_all};
use std::path::PathBuf;

use image::ImageFormat;

use super::bucket::{Bucket, BucketKey};
use super::layout::{StorageLayout, image_file_name};
use super::{CaptureEvent, FrameSink};
use crate::core::CaptureError;

/// Writes frames into the open bucket's directory, one PNG per capture.
pub struct PngSink {
    layout: StorageLayout,
    current: Option<Bucket>,
    next_seq: u64,
}

impl PngSink {
    pub fn new(layout: StorageLayout) -> Self {
        Self {
            layout,
            current: None,
            next_seq: 0,
        }
    }

    pub fn current(&self) -> Option<&Bucket> {
        self.current.as_ref()
    }

    fn open_bucket(&mut self, key: BucketKey) -> Result<(), CaptureError> {
        let dir = self.layout.bucket_dir(&key);
        create_dir_all(&dir).map_err(|e| CaptureError::write(&dir, e))?;

        // Continue numbering after a restart inside the same bucket.
        let existing = self
            .layout
            .list_images(&key)
            .map_err(|e| CaptureError::write(&dir, e))?;
        self.next_seq = self
            .layout
            .next_sequence(&key)
            .map_err(|e| CaptureError::write(&dir, e))?;

        log::info!(
            "[capture] bucket {} open ({} existing frames)",
            key,
            existing.len()
        );
        self.current = Some(Bucket::open(key, dir, existing));
        Ok(())
    }
}

impl FrameSink for PngSink {
    fn on_frame(&mut self, key: BucketKey, event: &CaptureEvent) -> Result<PathBuf, CaptureError> {
        if self.current.as_ref().map(|b| b.key) != Some(key) {
            self.open_bucket(key)?;
        }

        let bucket = match self.current.as_mut() {
            Some(b) => b,
            None => return Err(CaptureError::backend("no open bucket")),
        };

        let path = bucket
            .dir
            .join(image_file_name(self.next_seq, event.captured_at));
        let mut partial = path.clone().into_os_string();
        partial.push(".partial");
        let partial = PathBuf::from(partial);

        event
            .image
            .save_with_format(&partial, ImageFormat::Png)
            .map_err(|e| CaptureError::write(&partial, e))?;
        fs::rename(&partial, &path).map_err(|e| CaptureError::write(&path, e))?;

        self.next_seq += 1;
        bucket.push(path.clone());
        log::debug!("[capture] wrote {:?}", path);
        Ok(path)
    }

    fn on_rollover(&mut self, sealed: BucketKey) -> Option<Bucket> {
        match self.current.take() {
            Some(bucket) if bucket.key == sealed => Some(bucket.seal()),
            other => {
                self.current = other;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::bucket::{BucketState, Granularity};
    use chrono::NaiveDate;
    use image::RgbaImage;

    fn event(h: u32, m: u32, s: u32) -> CaptureEvent {
        CaptureEvent {
            image: RgbaImage::new(2, 2),
            captured_at: NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(h, m, s)
                .unwrap(),
        }
    }

    #[test]
    fn test_creates_directory_on_first_frame() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(tmp.path(), Granularity::Day);
        let key = Granularity::Day.parse_key("2024-05-01").unwrap();
        let mut sink = PngSink::new(layout.clone());

        assert!(!layout.bucket_dir(&key).exists());
        let path = sink.on_frame(key, &event(8, 0, 0)).unwrap();
        assert!(path.is_file());
        assert_eq!(path.file_name().unwrap(), "00000000_080000.png");

        sink.on_frame(key, &event(8, 0, 1)).unwrap();
        assert_eq!(sink.current().unwrap().images().len(), 2);
        assert_eq!(layout.list_images(&key).unwrap().len(), 2);
    }

    #[test]
    fn test_sequence_continues_after_restart() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(tmp.path(), Granularity::Day);
        let key = Granularity::Day.parse_key("2024-05-01").unwrap();

        let mut first = PngSink::new(layout.clone());
        first.on_frame(key, &event(8, 0, 0)).unwrap();
        first.on_frame(key, &event(8, 0, 1)).unwrap();
        drop(first);

        let mut second = PngSink::new(layout.clone());
        let path = second.on_frame(key, &event(9, 0, 0)).unwrap();
        assert_eq!(path.file_name().unwrap(), "00000002_090000.png");
        assert_eq!(second.current().unwrap().images().len(), 3);
    }

    #[test]
    fn test_rollover_seals_matching_bucket() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(tmp.path(), Granularity::Day);
        let key = Granularity::Day.parse_key("2024-05-01").unwrap();
        let other = Granularity::Day.parse_key("2024-04-30").unwrap();
        let mut sink = PngSink::new(layout);

        assert!(sink.on_rollover(key).is_none());
        sink.on_frame(key, &event(8, 0, 0)).unwrap();

        assert!(sink.on_rollover(other).is_none());
        let sealed = sink.on_rollover(key).unwrap();
        assert_eq!(sealed.state(), BucketState::Sealed);
        assert_eq!(sealed.images().len(), 1);
        assert!(sink.current().is_none());
    }
}
