/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Epoch nanosecond clocks.
//!
//! Sessions never read wall-clock time directly; they ask an injected clock.
//! Live engines use [`SystemEpochClock`], tests and reproduction use
//! [`ManualClock`] so that every timer decision can be replayed.

use crate::types::Timestamp;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of epoch time in nanoseconds.
pub trait EpochNanoClock: Send + Sync + fmt::Debug {
    /// Returns nanoseconds since the Unix epoch.
    fn nanos(&self) -> u64;

    /// Returns the current time as a [`Timestamp`].
    fn timestamp(&self) -> Timestamp {
        Timestamp::from_nanos(self.nanos())
    }
}

/// Wall-clock backed epoch clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEpochClock;

impl EpochNanoClock for SystemEpochClock {
    fn nanos(&self) -> u64 {
        Timestamp::now().as_nanos()
    }
}

/// Manually advanced clock.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    /// Creates a clock frozen at `nanos`.
    #[must_use]
    pub fn new(nanos: u64) -> Self {
        Self {
            nanos: AtomicU64::new(nanos),
        }
    }

    /// Sets the current time.
    pub fn set(&self, nanos: u64) {
        self.nanos.store(nanos, Ordering::SeqCst);
    }

    /// Advances the current time by `delta` nanoseconds.
    pub fn advance(&self, delta: u64) {
        self.nanos.fetch_add(delta, Ordering::SeqCst);
    }

    /// Advances the current time by whole milliseconds.
    pub fn advance_millis(&self, millis: u64) {
        self.advance(millis * 1_000_000);
    }
}

impl EpochNanoClock for ManualClock {
    fn nanos(&self) -> u64 {
        self.nanos.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.nanos(), 1_000);
        clock.advance(500);
        assert_eq!(clock.nanos(), 1_500);
        clock.advance_millis(1);
        assert_eq!(clock.nanos(), 1_001_500);
        clock.set(42);
        assert_eq!(clock.timestamp().as_nanos(), 42);
    }

    #[test]
    fn test_system_clock_is_after_epoch() {
        assert!(SystemEpochClock.nanos() > 0);
    }
}
