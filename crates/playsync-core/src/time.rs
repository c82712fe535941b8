//! Clock time in nanoseconds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Nanoseconds per millisecond.
pub const NSEC_PER_MSEC: u64 = 1_000_000;

/// Nanoseconds per second.
pub const NSEC_PER_SEC: u64 = 1_000_000_000;

/// An instant or duration on a clock, in nanoseconds.
///
/// Used both for absolute times read from a reference clock and for
/// stream positions and latencies. Signed quantities are carried as
/// `i64` nanoseconds instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClockTime(u64);

impl ClockTime {
    pub const ZERO: ClockTime = ClockTime(0);

    pub const fn from_nanos(ns: u64) -> Self {
        Self(ns)
    }

    pub const fn from_millis(ms: u64) -> Self {
        Self(ms * NSEC_PER_MSEC)
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * NSEC_PER_SEC)
    }

    pub const fn nanos(self) -> u64 {
        self.0
    }

    pub const fn millis(self) -> u64 {
        self.0 / NSEC_PER_MSEC
    }

    /// Add a signed nanosecond offset, clamping at zero and `u64::MAX`.
    pub fn offset_by(self, offset_ns: i64) -> Self {
        if offset_ns >= 0 {
            Self(self.0.saturating_add(offset_ns as u64))
        } else {
            Self(self.0.saturating_sub(offset_ns.unsigned_abs()))
        }
    }

    pub fn saturating_add(self, other: ClockTime) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: ClockTime) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Signed difference `self - other` in nanoseconds.
    pub fn signed_diff(self, other: ClockTime) -> i64 {
        let diff = self.0 as i128 - other.0 as i128;
        diff.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

impl From<Duration> for ClockTime {
    fn from(d: Duration) -> Self {
        Self(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }
}

impl From<ClockTime> for Duration {
    fn from(t: ClockTime) -> Self {
        Duration::from_nanos(t.0)
    }
}

impl fmt::Display for ClockTime {
    /// Formats as `H:MM:SS.NNNNNNNNN`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0 / NSEC_PER_SEC;
        let frac = self.0 % NSEC_PER_SEC;
        write!(
            f,
            "{}:{:02}:{:02}.{:09}",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            frac
        )
    }
}
