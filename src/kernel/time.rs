//! Simulated time.
//!
//! `SimTime` is an absolute instant measured in nanoseconds from the scenario epoch. It is totally
//! ordered by its numeric value and only ever projected to floating point for physics sub-stepping.

use serde::{Deserialize, Serialize};
use std::fmt;

const NANOS_PER_MICRO: u64 = 1_000;
const NANOS_PER_MILLI: u64 = 1_000_000;
const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Unit of a signed time delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
}

impl TimeUnit {
    fn nanos(self) -> i128 {
        match self {
            TimeUnit::Nanoseconds => 1,
            TimeUnit::Microseconds => NANOS_PER_MICRO as i128,
            TimeUnit::Milliseconds => NANOS_PER_MILLI as i128,
            TimeUnit::Seconds => NANOS_PER_SEC as i128,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimTime(u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);
    pub const MAX: SimTime = SimTime(u64::MAX);

    /// Build an instant from `base` shifted by a signed `delta` expressed in `unit`.
    ///
    /// The result saturates at the epoch and at `SimTime::MAX`.
    pub fn new(base: SimTime, delta: i64, unit: TimeUnit) -> SimTime {
        let nanos = base.0 as i128 + delta as i128 * unit.nanos();
        SimTime(nanos.clamp(0, u64::MAX as i128) as u64)
    }

    pub const fn from_nanos(nanos: u64) -> SimTime {
        SimTime(nanos)
    }

    pub const fn from_micros(micros: u64) -> SimTime {
        SimTime(micros.saturating_mul(NANOS_PER_MICRO))
    }

    pub const fn from_millis(millis: u64) -> SimTime {
        SimTime(millis.saturating_mul(NANOS_PER_MILLI))
    }

    pub fn from_secs_f64(secs: f64) -> SimTime {
        if secs <= 0.0 {
            return SimTime::ZERO;
        }
        SimTime((secs * NANOS_PER_SEC as f64).round().min(u64::MAX as f64) as u64)
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Floating-point projection in seconds. Lossy above ~104 days; only used for physics stepping.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    pub const fn after_nanos(self, nanos: u64) -> SimTime {
        SimTime(self.0.saturating_add(nanos))
    }

    pub const fn after_micros(self, micros: u64) -> SimTime {
        self.after_nanos(micros.saturating_mul(NANOS_PER_MICRO))
    }

    /// Nanoseconds from `earlier` to `self`, or `None` if `earlier` is later.
    pub fn checked_sub(self, earlier: SimTime) -> Option<u64> {
        self.0.checked_sub(earlier.0)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}s", self.0 / NANOS_PER_SEC, self.0 % NANOS_PER_SEC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_delta_in_units() {
        let base = SimTime::from_millis(2);
        assert_eq!(SimTime::new(base, 3, TimeUnit::Microseconds).as_nanos(), 2_003_000);
        assert_eq!(SimTime::new(base, -1, TimeUnit::Milliseconds).as_nanos(), 1_000_000);
        assert_eq!(SimTime::new(base, 1, TimeUnit::Seconds).as_nanos(), 1_002_000_000);
        assert_eq!(SimTime::new(base, 7, TimeUnit::Nanoseconds).as_nanos(), 2_000_007);
    }

    #[test]
    fn negative_result_saturates_at_epoch() {
        assert_eq!(SimTime::new(SimTime::from_nanos(10), -1, TimeUnit::Seconds), SimTime::ZERO);
    }

    #[test]
    fn ordering_follows_numeric_value() {
        let mut times = vec![SimTime::from_micros(5), SimTime::ZERO, SimTime::from_nanos(4_999)];
        times.sort();
        assert_eq!(times, vec![SimTime::ZERO, SimTime::from_nanos(4_999), SimTime::from_micros(5)]);
    }

    #[test]
    fn float_projection_and_display() {
        let t = SimTime::from_millis(1_250);
        assert!((t.as_secs_f64() - 1.25).abs() < 1e-12);
        assert_eq!(t.to_string(), "1.250000000s");
        assert_eq!(SimTime::from_secs_f64(0.1), SimTime::from_millis(100));
        assert_eq!(SimTime::from_secs_f64(-3.0), SimTime::ZERO);
    }

    #[test]
    fn checked_sub_rejects_later_base() {
        assert_eq!(SimTime::from_nanos(10).checked_sub(SimTime::from_nanos(4)), Some(6));
        assert_eq!(SimTime::from_nanos(4).checked_sub(SimTime::from_nanos(10)), None);
    }
}
