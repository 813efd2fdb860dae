// src/recorder/bucket.rs
//
// Time bucket keys and rollover detection.

use std::fmt;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

/// Width of one bucket.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    #[default]
    Day,
    Hour,
}

impl Granularity {
    fn pattern(self) -> &'static str {
        match self {
            Granularity::Day => "%Y-%m-%d",
            Granularity::Hour => "%Y-%m-%d_%H",
        }
    }

    /// Start of the bucket containing `t`.
    fn truncate(self, t: NaiveDateTime) -> NaiveDateTime {
        let day = t.date().and_hms_opt(0, 0, 0).unwrap_or(t);
        match self {
            Granularity::Day => day,
            Granularity::Hour => t.date().and_hms_opt(t.hour(), 0, 0).unwrap_or(day),
        }
    }

    /// Parses a directory or file stem back into a key. Only the canonical
    /// rendering is accepted, so `2024-5-1` or `2024-05-01_7` are rejected.
    pub fn parse_key(self, name: &str) -> Option<BucketKey> {
        let start = match self {
            Granularity::Day => NaiveDate::parse_from_str(name, "%Y-%m-%d")
                .ok()?
                .and_hms_opt(0, 0, 0)?,
            Granularity::Hour => {
                NaiveDateTime::parse_from_str(&format!("{name}:00"), "%Y-%m-%d_%H:%M").ok()?
            }
        };
        let key = BucketKey {
            start,
            granularity: self,
        };
        (key.to_string() == name).then_some(key)
    }
}

/// Identifier of a time bucket. Ordering follows time, and the textual form
/// sorts the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    start: NaiveDateTime,
    granularity: Granularity,
}

impl BucketKey {
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start.format(self.granularity.pattern()))
    }
}

/// Pure mapping from wall-clock time to a bucket key.
pub fn resolve(t: NaiveDateTime, granularity: Granularity) -> BucketKey {
    BucketKey {
        start: granularity.truncate(t),
        granularity,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketState {
    Open,
    Sealed,
    Archived,
    Evicted,
}

impl fmt::Display for BucketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BucketState::Open => "open",
            BucketState::Sealed => "sealed",
            BucketState::Archived => "archived",
            BucketState::Evicted => "evicted",
        };
        f.write_str(s)
    }
}

/// In-memory view of the bucket currently receiving captures.
#[derive(Debug, Clone)]
pub struct Bucket {
    pub key: BucketKey,
    pub dir: PathBuf,
    images: Vec<PathBuf>,
    state: BucketState,
}

impl Bucket {
    pub fn open(key: BucketKey, dir: PathBuf, existing: Vec<PathBuf>) -> Self {
        Self {
            key,
            dir,
            images: existing,
            state: BucketState::Open,
        }
    }

    pub fn images(&self) -> &[PathBuf] {
        &self.images
    }

    pub fn state(&self) -> BucketState {
        self.state
    }

    /// Appends a frame. Returns false once the bucket is sealed.
    pub fn push(&mut self, image: PathBuf) -> bool {
        if self.state != BucketState::Open {
            return false;
        }
        self.images.push(image);
        true
    }

    pub fn seal(mut self) -> Self {
        self.state = BucketState::Sealed;
        self
    }
}

/// What the resolver concluded for one observed timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Still in the current bucket.
    Same(BucketKey),
    /// The clock moved past the current bucket. `sealed` is `None` for the
    /// very first observation.
    Rollover {
        sealed: Option<BucketKey>,
        opened: BucketKey,
    },
    /// The clock went backwards into an older bucket; the current bucket
    /// stays open.
    Regressed {
        observed: BucketKey,
        current: BucketKey,
    },
}

impl Transition {
    /// Bucket that should receive captures now.
    pub fn key(&self) -> BucketKey {
        match self {
            Transition::Same(k) => *k,
            Transition::Rollover { opened, .. } => *opened,
            Transition::Regressed { current, .. } => *current,
        }
    }
}

/// Tracks the highest key seen so far so that keys never go backwards.
#[derive(Debug, Clone)]
pub struct BucketResolver {
    granularity: Granularity,
    highest: Option<BucketKey>,
}

impl BucketResolver {
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            highest: None,
        }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn current(&self) -> Option<BucketKey> {
        self.highest
    }

    /// Raises the high-water mark without reporting a rollover, e.g. from
    /// buckets found on disk at startup.
    pub fn seed(&mut self, key: BucketKey) {
        if self.highest.is_none_or(|h| key > h) {
            self.highest = Some(key);
        }
    }

    pub fn observe(&mut self, t: NaiveDateTime) -> Transition {
        let observed = resolve(t, self.granularity);
        match self.highest {
            Some(current) if observed == current => Transition::Same(current),
            Some(current) if observed < current => Transition::Regressed { observed, current },
            previous => {
                self.highest = Some(observed);
                Transition::Rollover {
                    sealed: previous,
                    opened: observed,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_day_and_hour_keys() {
        let t = at("2024-05-01 13:42:07");
        assert_eq!(resolve(t, Granularity::Day).to_string(), "2024-05-01");
        assert_eq!(resolve(t, Granularity::Hour).to_string(), "2024-05-01_13");
    }

    #[test]
    fn test_same_bucket_same_key() {
        let a = at("2024-05-01 00:00:00");
        let b = at("2024-05-01 23:59:59");
        assert_eq!(resolve(a, Granularity::Day), resolve(b, Granularity::Day));

        let c = at("2024-05-01 13:00:00");
        let d = at("2024-05-01 13:59:59");
        assert_eq!(resolve(c, Granularity::Hour), resolve(d, Granularity::Hour));
    }

    #[test]
    fn test_later_bucket_sorts_later() {
        let pairs = [
            ("2024-05-01 23:59:59", "2024-05-02 00:00:00"),
            ("2024-12-31 10:00:00", "2025-01-01 09:00:00"),
            ("2024-05-09 08:00:00", "2024-05-10 08:00:00"),
        ];
        for granularity in [Granularity::Day, Granularity::Hour] {
            for (a, b) in pairs {
                let ka = resolve(at(a), granularity);
                let kb = resolve(at(b), granularity);
                assert!(ka < kb, "{ka} < {kb}");
                assert!(ka.to_string() < kb.to_string());
            }
        }
    }

    #[test]
    fn test_parse_key_is_strict() {
        let key = Granularity::Day.parse_key("2024-05-01").unwrap();
        assert_eq!(key.to_string(), "2024-05-01");
        assert!(Granularity::Day.parse_key("2024-5-1").is_none());
        assert!(Granularity::Day.parse_key("archive").is_none());
        assert!(Granularity::Day.parse_key("2024-05-01_13").is_none());

        let hour = Granularity::Hour.parse_key("2024-05-01_07").unwrap();
        assert_eq!(hour.start(), at("2024-05-01 07:00:00"));
        assert!(Granularity::Hour.parse_key("2024-05-01_7").is_none());
        assert!(Granularity::Hour.parse_key("2024-05-01").is_none());
    }

    #[test]
    fn test_resolver_rollover_sequence() {
        let mut r = BucketResolver::new(Granularity::Hour);

        let first = r.observe(at("2024-05-01 10:15:00"));
        assert!(matches!(first, Transition::Rollover { sealed: None, .. }));

        assert!(matches!(
            r.observe(at("2024-05-01 10:59:00")),
            Transition::Same(_)
        ));

        match r.observe(at("2024-05-01 11:00:00")) {
            Transition::Rollover { sealed, opened } => {
                assert_eq!(sealed.unwrap().to_string(), "2024-05-01_10");
                assert_eq!(opened.to_string(), "2024-05-01_11");
            }
            other => panic!("expected rollover, got {other:?}"),
        }
    }

    #[test]
    fn test_clock_regression_keeps_current_bucket() {
        let mut r = BucketResolver::new(Granularity::Day);
        r.observe(at("2024-05-02 00:10:00"));

        let t = r.observe(at("2024-05-01 23:30:00"));
        assert!(matches!(t, Transition::Regressed { .. }));
        assert_eq!(t.key().to_string(), "2024-05-02");
        assert_eq!(r.current().unwrap().to_string(), "2024-05-02");

        // Coming back to the same day is not a rollover.
        assert!(matches!(
            r.observe(at("2024-05-02 00:11:00")),
            Transition::Same(_)
        ));
    }

    #[test]
    fn test_seed_only_raises() {
        let mut r = BucketResolver::new(Granularity::Day);
        r.seed(Granularity::Day.parse_key("2024-05-03").unwrap());
        r.seed(Granularity::Day.parse_key("2024-05-01").unwrap());
        assert_eq!(r.current().unwrap().to_string(), "2024-05-03");

        let t = r.observe(at("2024-05-02 12:00:00"));
        assert_eq!(t.key().to_string(), "2024-05-03");
    }

    #[test]
    fn test_sealed_bucket_rejects_frames() {
        let key = Granularity::Day.parse_key("2024-05-01").unwrap();
        let mut bucket = Bucket::open(key, PathBuf::from("/tmp/x"), Vec::new());
        assert!(bucket.push(PathBuf::from("a.png")));

        let mut sealed = bucket.seal();
        assert_eq!(sealed.state(), BucketState::Sealed);
        assert!(!sealed.push(PathBuf::from("b.png")));
        assert_eq!(sealed.images().len(), 1);
    }
}
