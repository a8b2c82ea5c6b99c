//! Simulated time
//!
//! The simulation never reads the wall clock to decide *when* something
//! happens. The driver advances a virtual clock, and keystroke pacing and
//! print delays are measured against it. Same inputs + same clock advances
//! produce the same output.

use core::ops::{Add, Sub};
use serde::{Deserialize, Serialize};

/// A point in simulated time
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Instant {
    /// Nanoseconds since the simulation started
    nanos: u64,
}

impl Instant {
    /// The moment the simulation starts
    pub const EPOCH: Instant = Instant { nanos: 0 };

    /// Creates an instant from nanoseconds
    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    /// Returns nanoseconds since the simulation started
    pub const fn as_nanos(&self) -> u64 {
        self.nanos
    }

    /// Returns the duration since another instant, zero if `earlier` is later
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        Duration::from_nanos(self.nanos.saturating_sub(earlier.nanos))
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, duration: Duration) -> Self::Output {
        Instant::from_nanos(self.nanos.saturating_add(duration.as_nanos()))
    }
}

impl Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, duration: Duration) -> Self::Output {
        Instant::from_nanos(self.nanos.saturating_sub(duration.as_nanos()))
    }
}

/// A span of simulated time
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Duration {
    nanos: u64,
}

impl Duration {
    pub const ZERO: Duration = Duration { nanos: 0 };

    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self {
            nanos: millis * 1_000_000,
        }
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self {
            nanos: secs * 1_000_000_000,
        }
    }

    /// Converts a measured wall-clock span (used for CPU accounting only)
    pub fn from_std(span: std::time::Duration) -> Self {
        Self {
            nanos: u64::try_from(span.as_nanos()).unwrap_or(u64::MAX),
        }
    }

    pub const fn as_nanos(&self) -> u64 {
        self.nanos
    }

    pub const fn as_millis(&self) -> u64 {
        self.nanos / 1_000_000
    }

    pub const fn as_secs(&self) -> u64 {
        self.nanos / 1_000_000_000
    }

    pub const fn is_zero(&self) -> bool {
        self.nanos == 0
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, other: Duration) -> Self::Output {
        Duration::from_nanos(self.nanos.saturating_add(other.nanos))
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, other: Duration) -> Self::Output {
        Duration::from_nanos(self.nanos.saturating_sub(other.nanos))
    }
}
