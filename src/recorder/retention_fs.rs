// src/recorder/retention_fs.rs
use std::io;

use super::bucket::BucketKey;
use super::layout::{BucketStatus, StorageLayout};

/// How many of the most recent buckets may keep their source images. The
/// open bucket counts towards the limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub limit: usize,
}

/// What to do with the buckets that fall outside the limit.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetentionPlan {
    /// Archived, images can go.
    pub evict: Vec<BucketKey>,
    /// Not archived yet, must be encoded before the images can go.
    pub archive_first: Vec<BucketKey>,
    /// Encoding gave up on these; their images are the only copy.
    pub pinned: Vec<BucketKey>,
}

impl RetentionPolicy {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn plan(&self, statuses: &[BucketStatus], open: Option<BucketKey>) -> RetentionPlan {
        let mut holding: Vec<&BucketStatus> = statuses.iter().filter(|s| s.has_dir).collect();
        holding.sort_by(|a, b| b.key.cmp(&a.key));

        // The open bucket may not have a directory yet but still takes a slot.
        let open_slot = usize::from(open.is_some_and(|k| !holding.iter().any(|s| s.key == k)));
        let keep = self.limit.saturating_sub(open_slot);

        let mut plan = RetentionPlan::default();
        for status in holding.into_iter().skip(keep) {
            if open.is_some_and(|o| status.key >= o) {
                continue;
            }
            if status.archived {
                plan.evict.push(status.key);
            } else if status.flagged {
                plan.pinned.push(status.key);
            } else {
                plan.archive_first.push(status.key);
            }
        }

        // Oldest first.
        plan.evict.reverse();
        plan.archive_first.reverse();
        plan.pinned.reverse();
        plan
    }
}

/// Applies eviction decisions to the filesystem.
pub struct FsRetention {
    layout: StorageLayout,
}

impl FsRetention {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    /// Removes a bucket's source images. Refuses when no video exists.
    pub fn evict(&self, key: &BucketKey) -> io::Result<bool> {
        if !self.layout.is_archived(key) {
            log::warn!("[retention] refusing to evict {}: no archived video", key);
            return Ok(false);
        }

        let dir = self.layout.bucket_dir(key);
        match self.layout.evict(key) {
            Ok(()) => {
                log::info!("[retention] removed {:?}", dir);
                Ok(true)
            }
            Err(err) => {
                log::error!("[retention] failed {:?}: {}", dir, err);
                Err(err)
            }
        }
    }
}
