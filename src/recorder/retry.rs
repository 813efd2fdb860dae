// src/recorder/retry.rs
use std::collections::HashMap;
use std::time::Duration;

use super::bucket::BucketKey;

/// Exponential backoff for buckets whose encode keeps failing, with a hard
/// stop after `max_attempts` consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    /// Wait before the next attempt after `failures` consecutive failures.
    pub fn backoff(&self, failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base: Duration::from_secs(60),
            max: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    RetryAfter(Duration),
    GiveUp { failures: u32 },
}

#[derive(Debug, Clone, Copy)]
struct FailureEntry {
    failures: u32,
    retry_at: Duration,
}

/// In-memory failure bookkeeping, keyed by bucket. Times are monotonic.
#[derive(Debug, Default)]
pub struct FailureTracker {
    policy: RetryPolicy,
    entries: HashMap<BucketKey, FailureEntry>,
}

impl FailureTracker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            entries: HashMap::new(),
        }
    }

    pub fn may_attempt(&self, key: &BucketKey, now: Duration) -> bool {
        self.entries.get(key).is_none_or(|e| now >= e.retry_at)
    }

    pub fn record_failure(&mut self, key: BucketKey, now: Duration) -> FailureOutcome {
        let entry = self.entries.entry(key).or_insert(FailureEntry {
            failures: 0,
            retry_at: now,
        });
        entry.failures += 1;

        if entry.failures >= self.policy.max_attempts {
            let failures = entry.failures;
            self.entries.remove(&key);
            return FailureOutcome::GiveUp { failures };
        }

        let wait = self.policy.backoff(entry.failures);
        entry.retry_at = now + wait;
        FailureOutcome::RetryAfter(wait)
    }

    pub fn record_success(&mut self, key: &BucketKey) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::bucket::Granularity;

    fn key() -> BucketKey {
        Granularity::Day.parse_key("2024-05-01").unwrap()
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = RetryPolicy {
            max_attempts: 10,
            base: Duration::from_secs(60),
            max: Duration::from_secs(300),
        };
        assert_eq!(p.backoff(1), Duration::from_secs(60));
        assert_eq!(p.backoff(2), Duration::from_secs(120));
        assert_eq!(p.backoff(3), Duration::from_secs(240));
        assert_eq!(p.backoff(4), Duration::from_secs(300));
        assert_eq!(p.backoff(40), Duration::from_secs(300));
    }

    #[test]
    fn test_tracker_waits_then_allows() {
        let mut t = FailureTracker::new(RetryPolicy::default());
        let k = key();
        assert!(t.may_attempt(&k, Duration::ZERO));

        let outcome = t.record_failure(k, Duration::from_secs(10));
        assert_eq!(outcome, FailureOutcome::RetryAfter(Duration::from_secs(60)));
        assert!(!t.may_attempt(&k, Duration::from_secs(69)));
        assert!(t.may_attempt(&k, Duration::from_secs(70)));

        t.record_failure(k, Duration::from_secs(70));
        assert!(!t.may_attempt(&k, Duration::from_secs(100)));
        t.record_success(&k);
        assert!(t.may_attempt(&k, Duration::from_secs(100)));
    }

    #[test]
    fn test_tracker_gives_up() {
        let mut t = FailureTracker::new(RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        });
        let k = key();
        assert!(matches!(t.record_failure(k, Duration::ZERO), FailureOutcome::RetryAfter(_)));
        assert!(matches!(t.record_failure(k, Duration::ZERO), FailureOutcome::RetryAfter(_)));
        assert_eq!(
            t.record_failure(k, Duration::ZERO),
            FailureOutcome::GiveUp { failures: 3 }
        );
    }
}
