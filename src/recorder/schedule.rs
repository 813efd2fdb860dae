// src/recorder/schedule.rs
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Timescale {
    #[default]
    Second,
    Minute,
    Hour,
    Day,
}

impl Timescale {
    pub fn unit(self) -> Duration {
        match self {
            Timescale::Second => Duration::from_secs(1),
            Timescale::Minute => Duration::from_secs(60),
            Timescale::Hour => Duration::from_secs(3600),
            Timescale::Day => Duration::from_secs(86_400),
        }
    }
}

/// Capture cadence: `per_unit` frames every `timescale` unit. Fixed for the
/// lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub timescale: Timescale,
    pub per_unit: u32,
}

impl Schedule {
    pub fn new(timescale: Timescale, per_unit: u32) -> Self {
        Self {
            timescale,
            per_unit,
        }
    }

    /// Time between two captures. A zero count is treated as one.
    pub fn interval(&self) -> Duration {
        let unit = self.timescale.unit().as_nanos();
        let nanos = unit / u128::from(self.per_unit.max(1));
        Duration::from_nanos(nanos as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_derivation() {
        assert_eq!(
            Schedule::new(Timescale::Minute, 15).interval(),
            Duration::from_secs(4)
        );
        assert_eq!(
            Schedule::new(Timescale::Second, 4).interval(),
            Duration::from_millis(250)
        );
        assert_eq!(
            Schedule::new(Timescale::Hour, 1).interval(),
            Duration::from_secs(3600)
        );
        assert_eq!(
            Schedule::new(Timescale::Day, 24).interval(),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn test_zero_count_clamped() {
        assert_eq!(
            Schedule::new(Timescale::Second, 0).interval(),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_timescale_from_toml() {
        #[derive(Deserialize)]
        struct Wrap {
            t: Timescale,
        }
        let w: Wrap = toml::from_str("t = \"minute\"").unwrap();
        assert_eq!(w.t, Timescale::Minute);
    }
}
