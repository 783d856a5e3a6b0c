/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! In-memory storage.
//!
//! Used by tests, by reproduction runs and by applications that don't require
//! persistence. Nothing survives the process.

use crate::record::{LogRecord, ReproductionWindow};
use crate::traits::{DurableLog, MessageStore, SequenceIndex, StoredMessage};
use async_trait::async_trait;
use bytes::Bytes;
use fixgate_core::error::StoreError;
use fixgate_core::types::{Position, SessionId};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory durable log.
///
/// Positions start at 1.
#[derive(Debug)]
pub struct MemoryLog {
    records: RwLock<Vec<LogRecord>>,
    next_position: AtomicU64,
}

impl MemoryLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            next_position: AtomicU64::new(1),
        }
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns a copy of every record, in position order.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.read().clone()
    }
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableLog for MemoryLog {
    fn append(&self, mut record: LogRecord) -> Result<Position, StoreError> {
        let mut records = self.records.write();
        let position = Position::new(self.next_position.fetch_add(1, Ordering::SeqCst));
        record.position = position;
        records.push(record);
        Ok(position)
    }

    async fn read_window(&self, window: ReproductionWindow) -> Result<Vec<LogRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|record| window.contains(record.timestamp_ns))
            .cloned()
            .collect())
    }

    fn next_position(&self) -> Position {
        Position::new(self.next_position.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Default)]
struct SessionEntry {
    messages: BTreeMap<u64, Bytes>,
    sequences: Option<SequenceIndex>,
}

/// In-memory message store.
///
/// Messages are kept per session in a `BTreeMap` for efficient range queries.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
}

impl MemoryStore {
    /// Creates a new empty memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored messages for a session.
    #[must_use]
    pub fn message_count(&self, session_id: SessionId) -> usize {
        self.sessions
            .read()
            .get(&session_id)
            .map_or(0, |entry| entry.messages.len())
    }

    /// Checks if a message with the given sequence number exists.
    #[must_use]
    pub fn contains(&self, session_id: SessionId, seq_num: u64) -> bool {
        self.sessions
            .read()
            .get(&session_id)
            .is_some_and(|entry| entry.messages.contains_key(&seq_num))
    }
}

impl MessageStore for MemoryStore {
    fn store(&self, session_id: SessionId, seq_num: u64, frame: &[u8]) -> Result<(), StoreError> {
        self.sessions
            .write()
            .entry(session_id)
            .or_default()
            .messages
            .insert(seq_num, Bytes::copy_from_slice(frame));
        Ok(())
    }

    fn get_range(
        &self,
        session_id: SessionId,
        begin: u64,
        end: u64,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let end = if end == 0 { u64::MAX } else { end };
        if begin > end {
            return Err(StoreError::RangeNotAvailable {
                range: begin..end.saturating_add(1),
            });
        }

        let sessions = self.sessions.read();
        let Some(entry) = sessions.get(&session_id) else {
            return Ok(Vec::new());
        };

        Ok(entry
            .messages
            .range(begin..=end)
            .map(|(&seq_num, frame)| StoredMessage {
                seq_num,
                frame: frame.clone(),
            })
            .collect())
    }

    fn sequences(&self, session_id: SessionId) -> Option<SequenceIndex> {
        self.sessions
            .read()
            .get(&session_id)
            .and_then(|entry| entry.sequences)
    }

    fn update_sequences(
        &self,
        session_id: SessionId,
        index: SequenceIndex,
    ) -> Result<(), StoreError> {
        self.sessions.write().entry(session_id).or_default().sequences = Some(index);
        Ok(())
    }

    fn reset(&self, session_id: SessionId) -> Result<(), StoreError> {
        self.sessions.write().remove(&session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Direction;
    use fixgate_core::message::MsgType;
    use fixgate_core::types::ConnectionId;

    fn record(timestamp_ns: u64, direction: Direction) -> LogRecord {
        LogRecord::message(
            timestamp_ns,
            direction,
            ConnectionId::new(1),
            SessionId::new(1),
            MsgType::Heartbeat,
            Bytes::from_static(b"35=0\x01"),
        )
    }

    #[tokio::test]
    async fn test_memory_log_positions_increase() {
        let log = MemoryLog::new();
        let first = log.append(record(10, Direction::Inbound)).unwrap();
        let second = log.append(record(20, Direction::Outbound)).unwrap();
        assert!(second > first);
        assert_eq!(log.len(), 2);
        assert_eq!(log.next_position(), Position::new(3));
    }

    #[tokio::test]
    async fn test_memory_log_read_window() {
        let log = MemoryLog::new();
        for ts in [10, 20, 30, 40] {
            log.append(record(ts, Direction::Inbound)).unwrap();
        }

        let window = ReproductionWindow::new(20, 30).unwrap();
        let records = log.read_window(window).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].timestamp_ns, 20);
        assert_eq!(records[1].position, Position::new(3));
    }

    #[test]
    fn test_memory_store_get_range() {
        let store = MemoryStore::new();
        let session = SessionId::new(1);

        store.store(session, 2, b"msg2").unwrap();
        store.store(session, 3, b"msg3").unwrap();
        store.store(session, 5, b"msg5").unwrap();

        let range = store.get_range(session, 1, 3).unwrap();
        assert_eq!(range.len(), 2);
        assert_eq!(range[0].seq_num, 2);

        let open = store.get_range(session, 3, 0).unwrap();
        assert_eq!(
            open.iter().map(|m| m.seq_num).collect::<Vec<_>>(),
            vec![3, 5]
        );

        assert!(store.get_range(session, 5, 4).is_err());
        assert!(store.get_range(SessionId::new(9), 1, 0).unwrap().is_empty());
    }

    #[test]
    fn test_memory_store_sessions_are_isolated() {
        let store = MemoryStore::new();
        store.store(SessionId::new(1), 1, b"a").unwrap();
        store.store(SessionId::new(2), 1, b"b").unwrap();

        assert_eq!(store.message_count(SessionId::new(1)), 1);
        assert!(store.contains(SessionId::new(2), 1));
        assert!(!store.contains(SessionId::new(2), 2));
    }

    #[test]
    fn test_memory_store_sequences_and_reset() {
        let store = MemoryStore::new();
        let session = SessionId::new(4);
        assert!(store.sequences(session).is_none());

        store
            .update_sequences(session, SequenceIndex::new(10, 20))
            .unwrap();
        store.store(session, 10, b"msg").unwrap();
        assert_eq!(store.sequences(session), Some(SequenceIndex::new(10, 20)));

        store.reset(session).unwrap();
        assert!(store.sequences(session).is_none());
        assert_eq!(store.message_count(session), 0);
    }
}
