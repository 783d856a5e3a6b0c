/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Sequence number tracking.
//!
//! A session is mutated by a single writer, so the tracker holds plain
//! integers. Outbound numbers only move after the publication accepted the
//! frame; inbound numbers only move after the message has been handled.

use fixgate_core::types::SeqNum;
use fixgate_store::SequenceIndex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Last sent / last received sequence numbers of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceManager {
    last_sent: u64,
    last_received: u64,
}

impl SequenceManager {
    /// Creates a tracker for a fresh session.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_sent: 0,
            last_received: 0,
        }
    }

    /// Creates a tracker restored from a persisted index.
    #[must_use]
    pub const fn from_index(index: SequenceIndex) -> Self {
        Self {
            last_sent: index.last_sent,
            last_received: index.last_received,
        }
    }

    /// Returns the persisted form.
    #[must_use]
    pub const fn index(&self) -> SequenceIndex {
        SequenceIndex::new(self.last_sent, self.last_received)
    }

    /// Returns the last sent sequence number.
    #[inline]
    #[must_use]
    pub const fn last_sent(&self) -> u64 {
        self.last_sent
    }

    /// Returns the last accepted inbound sequence number.
    #[inline]
    #[must_use]
    pub const fn last_received(&self) -> u64 {
        self.last_received
    }

    /// Returns the sequence number the next outbound message will carry.
    #[inline]
    #[must_use]
    pub const fn next_sender_seq(&self) -> SeqNum {
        SeqNum::new(self.last_sent + 1)
    }

    /// Returns the next expected inbound sequence number.
    #[inline]
    #[must_use]
    pub const fn expected(&self) -> u64 {
        self.last_received + 1
    }

    /// Records that `seq` was published.
    #[inline]
    pub fn on_sent(&mut self, seq: SeqNum) {
        self.last_sent = self.last_sent.max(seq.value());
    }

    /// Records that `seq` was accepted.
    #[inline]
    pub fn on_received(&mut self, seq: u64) {
        self.last_received = seq;
    }

    /// Resets both directions to zero.
    #[inline]
    pub fn reset(&mut self) {
        self.last_sent = 0;
        self.last_received = 0;
    }

    /// Classifies an incoming sequence number.
    #[must_use]
    pub const fn validate_incoming(&self, received: u64) -> SequenceResult {
        let expected = self.expected();

        if received == expected {
            SequenceResult::Ok
        } else if received < expected {
            SequenceResult::TooLow { expected, received }
        } else {
            SequenceResult::Gap { expected, received }
        }
    }
}

/// Result of sequence number validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceResult {
    /// Sequence number is as expected.
    Ok,
    /// Sequence number is lower than expected (possible duplicate).
    TooLow {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },
    /// Sequence number is higher than expected (gap detected).
    Gap {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },
}

/// Inclusive `[begin, end]` range of sequence numbers; `end == 0` means
/// "through current".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceWindow {
    begin: u64,
    end: u64,
}

impl SequenceWindow {
    /// Creates a window.
    ///
    /// # Returns
    /// `None` unless `begin >= 1` and either `begin <= end` or `end == 0`.
    #[must_use]
    pub const fn new(begin: u64, end: u64) -> Option<Self> {
        if begin == 0 || (end != 0 && begin > end) {
            None
        } else {
            Some(Self { begin, end })
        }
    }

    /// Returns the first sequence number.
    #[inline]
    #[must_use]
    pub const fn begin(&self) -> u64 {
        self.begin
    }

    /// Returns the last sequence number, or 0 when open ended.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.end
    }

    /// Returns true if the window runs through current.
    #[inline]
    #[must_use]
    pub const fn is_open_ended(&self) -> bool {
        self.end == 0
    }

    /// Resolves the upper bound against the last sequence number in existence.
    #[must_use]
    pub const fn last(&self, current: u64) -> u64 {
        if self.end == 0 || self.end > current {
            current
        } else {
            self.end
        }
    }

    /// Returns true if `seq` falls inside the window.
    #[must_use]
    pub const fn contains(&self, seq: u64) -> bool {
        seq >= self.begin && (self.end == 0 || seq <= self.end)
    }
}

impl fmt::Display for SequenceWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.end == 0 {
            write!(f, "[{}, ..]", self.begin)
        } else {
            write!(f, "[{}, {}]", self.begin, self.end)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_manager_new() {
        let seq = SequenceManager::new();
        assert_eq!(seq.next_sender_seq(), SeqNum::new(1));
        assert_eq!(seq.expected(), 1);
    }

    #[test]
    fn test_validate_incoming() {
        let mut seq = SequenceManager::new();
        seq.on_received(4);

        assert_eq!(seq.validate_incoming(5), SequenceResult::Ok);
        assert_eq!(
            seq.validate_incoming(3),
            SequenceResult::TooLow {
                expected: 5,
                received: 3
            }
        );
        assert_eq!(
            seq.validate_incoming(9),
            SequenceResult::Gap {
                expected: 5,
                received: 9
            }
        );
    }

    #[test]
    fn test_index_round_trip_and_reset() {
        let mut seq = SequenceManager::from_index(SequenceIndex::new(7, 3));
        assert_eq!(seq.next_sender_seq().value(), 8);
        seq.on_sent(SeqNum::new(8));
        assert_eq!(seq.index(), SequenceIndex::new(8, 3));
        seq.reset();
        assert_eq!(seq.index(), SequenceIndex::default());
    }

    #[test]
    fn test_window_invariants() {
        assert!(SequenceWindow::new(0, 5).is_none());
        assert!(SequenceWindow::new(6, 5).is_none());
        assert!(SequenceWindow::new(5, 5).is_some());

        let open = SequenceWindow::new(3, 0).unwrap();
        assert!(open.is_open_ended());
        assert!(open.contains(1_000));
        assert_eq!(open.last(12), 12);

        let closed = SequenceWindow::new(3, 8).unwrap();
        assert!(!closed.contains(9));
        assert_eq!(closed.last(5), 5);
        assert_eq!(closed.last(20), 8);
        assert_eq!(closed.to_string(), "[3, 8]");
    }
}
