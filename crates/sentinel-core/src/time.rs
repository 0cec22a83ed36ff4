// crates/sentinel-core/src/time.rs
// ============================================================================
// Module: Sentinel Timestamps
// Description: Wall-clock timestamp newtype used across entities.
// Purpose: Avoid passing bare epoch integers between layers.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A `Timestamp` is milliseconds since the Unix epoch, UTC. Conversion to/from
//! `SystemTime` is provided for call sites that need to read the system clock;
//! the type itself stores only the integer so it stays trivially serializable
//! and comparable.

use std::fmt;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

/// Milliseconds since the Unix epoch, UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from a raw epoch-millisecond value.
    #[must_use]
    pub const fn from_epoch_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the raw epoch-millisecond value.
    #[must_use]
    pub const fn epoch_millis(self) -> i64 {
        self.0
    }

    /// Reads the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let duration = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Self(i64::try_from(duration.as_millis()).unwrap_or(i64::MAX))
    }

    /// Returns a timestamp `delta_seconds` after this one.
    #[must_use]
    pub const fn plus_seconds(self, delta_seconds: i64) -> Self {
        Self(self.0 + delta_seconds.saturating_mul(1000))
    }

    /// Returns the whole number of seconds elapsed between `self` and `other`,
    /// clamped to zero when `other` precedes `self`.
    #[must_use]
    pub fn seconds_since(self, other: Self) -> i64 {
        (self.0.saturating_sub(other.0)).max(0) / 1000
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::from_epoch_millis(0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
