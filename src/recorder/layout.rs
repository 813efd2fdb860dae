// src/recorder/layout.rs
//
// On-disk layout:
//   <root>/<bucket_key>/NNNNNNNN_HHMMSS.png
//   <root>/archive/<bucket_key>.mp4

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use super::bucket::{BucketKey, BucketState, Granularity};
use crate::core::{StorageError, StorageResult};

pub const ARCHIVE_DIR: &str = "archive";
pub const IMAGE_EXT: &str = "png";
pub const VIDEO_EXT: &str = "mp4";
pub const PARTIAL_EXT: &str = "partial";
pub const FAILED_MARKER: &str = ".archive-failed";

const SEQUENCE_DIGITS: usize = 8;
const PROBE_FILE: &str = ".screenlog-probe";

/// `00000042_134207.png`
pub fn image_file_name(sequence: u64, captured_at: NaiveDateTime) -> String {
    format!(
        "{:0width$}_{}.{}",
        sequence,
        captured_at.format("%H%M%S"),
        IMAGE_EXT,
        width = SEQUENCE_DIGITS
    )
}

pub fn parse_image_sequence(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(".png")?;
    let (seq, time) = stem.split_once('_')?;
    if seq.len() < SEQUENCE_DIGITS || time.len() != 6 || !time.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    seq.parse::<u64>().ok()
}

/// Per-bucket facts re-derived from the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketStatus {
    pub key: BucketKey,
    pub state: BucketState,
    pub image_count: usize,
    pub has_dir: bool,
    pub archived: bool,
    pub flagged: bool,
}

#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
    granularity: Granularity,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>, granularity: Granularity) -> Self {
        Self {
            root: root.into(),
            granularity,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn bucket_dir(&self, key: &BucketKey) -> PathBuf {
        self.root.join(key.to_string())
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join(ARCHIVE_DIR)
    }

    pub fn video_path(&self, key: &BucketKey) -> PathBuf {
        self.archive_dir().join(format!("{}.{}", key, VIDEO_EXT))
    }

    pub fn partial_video_path(&self, key: &BucketKey) -> PathBuf {
        self.archive_dir()
            .join(format!("{}.{}.{}", key, VIDEO_EXT, PARTIAL_EXT))
    }

    pub fn failed_marker(&self, key: &BucketKey) -> PathBuf {
        self.bucket_dir(key).join(FAILED_MARKER)
    }

    /// Creates the root and archive directories and proves the root is
    /// writable. The only storage failure that is fatal.
    pub fn ensure_root(&self) -> StorageResult<()> {
        let unwritable = |source| StorageError::RootUnwritable {
            path: self.root.clone(),
            source,
        };

        fs::create_dir_all(&self.root).map_err(unwritable)?;
        fs::create_dir_all(self.archive_dir()).map_err(unwritable)?;

        let probe = self.root.join(PROBE_FILE);
        fs::write(&probe, b"ok").map_err(unwritable)?;
        fs::remove_file(&probe).map_err(unwritable)?;
        Ok(())
    }

    /// Image files of a bucket in capture order. A missing directory is an
    /// empty bucket.
    pub fn list_images(&self, key: &BucketKey) -> io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(self.bucket_dir(key)) {
            Ok(e) => e,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut images: Vec<(u64, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            let Some(seq) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_image_sequence)
            else {
                continue;
            };
            images.push((seq, path));
        }

        // Directory listing order is unspecified; the sequence is authoritative.
        images.sort();
        Ok(images.into_iter().map(|(_, p)| p).collect())
    }

    pub fn next_sequence(&self, key: &BucketKey) -> io::Result<u64> {
        let last = self
            .list_images(key)?
            .last()
            .and_then(|p| p.file_name().and_then(|n| n.to_str()).and_then(parse_image_sequence));
        Ok(last.map_or(0, |s| s + 1))
    }

    /// Bucket directories under the root, ascending.
    pub fn bucket_keys(&self) -> io::Result<BTreeSet<BucketKey>> {
        let mut keys = BTreeSet::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(key) = entry
                .file_name()
                .to_str()
                .and_then(|n| self.granularity.parse_key(n))
            {
                keys.insert(key);
            }
        }
        Ok(keys)
    }

    /// Buckets with a finished video in the archive directory.
    pub fn archived_keys(&self) -> io::Result<BTreeSet<BucketKey>> {
        let mut keys = BTreeSet::new();
        let entries = match fs::read_dir(self.archive_dir()) {
            Ok(e) => e,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(stem) = name
                .to_str()
                .and_then(|n| n.strip_suffix(".mp4"))
            else {
                continue;
            };
            if let Some(key) = self.granularity.parse_key(stem) {
                keys.insert(key);
            }
        }
        Ok(keys)
    }

    pub fn is_archived(&self, key: &BucketKey) -> bool {
        self.video_path(key).is_file()
    }

    pub fn is_flagged(&self, key: &BucketKey) -> bool {
        self.failed_marker(key).exists()
    }

    /// Every known bucket with its derived state, ascending by key.
    pub fn scan(&self, open: Option<BucketKey>) -> io::Result<Vec<BucketStatus>> {
        let dirs = self.bucket_keys()?;
        let archived = self.archived_keys()?;

        let mut out = Vec::with_capacity(dirs.len() + archived.len());
        for key in dirs.union(&archived) {
            let has_dir = dirs.contains(key);
            let is_archived = archived.contains(key);
            let image_count = if has_dir {
                self.list_images(key)?.len()
            } else {
                0
            };
            // Anything at or after the open key may still be receiving frames.
            let state = if open.is_some_and(|o| *key >= o) {
                BucketState::Open
            } else if !has_dir {
                BucketState::Evicted
            } else if is_archived {
                BucketState::Archived
            } else {
                BucketState::Sealed
            };
            out.push(BucketStatus {
                key: *key,
                state,
                image_count,
                has_dir,
                archived: is_archived,
                flagged: has_dir && self.is_flagged(key),
            });
        }
        Ok(out)
    }

    /// Highest key present on disk, as a bucket directory or a video.
    pub fn highest_key(&self) -> io::Result<Option<BucketKey>> {
        let dirs = self.bucket_keys()?;
        let archived = self.archived_keys()?;
        Ok(dirs.last().copied().max(archived.last().copied()))
    }

    pub fn mark_failed(&self, key: &BucketKey, reason: &str) -> io::Result<()> {
        fs::write(self.failed_marker(key), reason.as_bytes())
    }

    /// Removes a bucket directory with everything in it.
    pub fn evict(&self, key: &BucketKey) -> io::Result<()> {
        match fs::remove_dir_all(self.bucket_dir(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Deletes leftovers of interrupted writes: partial videos and concat
    /// lists in the archive, partial frames in bucket directories.
    pub fn clean_partials(&self) -> io::Result<usize> {
        let mut removed = 0;

        let mut dirs = vec![self.archive_dir()];
        dirs.extend(self.bucket_keys()?.iter().map(|k| self.bucket_dir(k)));

        for dir in dirs {
            let entries = match fs::read_dir(&dir) {
                Ok(e) => e,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            for entry in entries.flatten() {
                let path = entry.path();
                let stale = matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some(PARTIAL_EXT) | Some("ffconcat")
                );
                if stale && fs::remove_file(&path).is_ok() {
                    log::info!("[retention] removed stale {:?}", path);
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }
}
