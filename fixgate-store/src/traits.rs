/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Storage trait definitions.
//!
//! - [`DurableLog`]: the append-only record of every frame, read back by reproduction
//! - [`MessageStore`]: sent business messages kept for resend, plus per-session
//!   sequence indices so a session id survives reconnects

use crate::record::{LogRecord, ReproductionWindow};
use async_trait::async_trait;
use bytes::Bytes;
use fixgate_core::error::StoreError;
use fixgate_core::types::{Position, SessionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Append-only, totally ordered log of session traffic.
///
/// `append` is synchronous because it sits on the send path of the session
/// state machine; reading is asynchronous.
#[async_trait]
pub trait DurableLog: Send + Sync + fmt::Debug {
    /// Appends a record and returns its position.
    ///
    /// The record's `position` field is ignored and replaced by the assigned one.
    /// Positions are strictly increasing.
    ///
    /// # Errors
    /// Returns `StoreError` if the record cannot be persisted.
    fn append(&self, record: LogRecord) -> Result<Position, StoreError>;

    /// Reads all records whose timestamp falls inside `window`, in position order.
    ///
    /// # Errors
    /// Returns `StoreError` if the log cannot be read.
    async fn read_window(&self, window: ReproductionWindow) -> Result<Vec<LogRecord>, StoreError>;

    /// Forces appended records to stable storage.
    ///
    /// # Errors
    /// Returns `StoreError` if the flush fails.
    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Returns the position the next append will receive.
    fn next_position(&self) -> Position;
}

/// Last sent and last received sequence numbers of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceIndex {
    /// Last MsgSeqNum sent.
    pub last_sent: u64,
    /// Last MsgSeqNum received and accepted.
    pub last_received: u64,
}

impl SequenceIndex {
    /// Creates a new index.
    #[must_use]
    pub const fn new(last_sent: u64, last_received: u64) -> Self {
        Self {
            last_sent,
            last_received,
        }
    }
}

/// A stored outbound business message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// MsgSeqNum it was sent with.
    pub seq_num: u64,
    /// The frame as originally sent.
    pub frame: Bytes,
}

/// Per-session store of sent business messages and sequence indices.
pub trait MessageStore: Send + Sync + fmt::Debug {
    /// Stores an outgoing business message for potential resend.
    ///
    /// # Errors
    /// Returns `StoreError` if the message cannot be stored.
    fn store(&self, session_id: SessionId, seq_num: u64, frame: &[u8]) -> Result<(), StoreError>;

    /// Retrieves stored messages with `begin <= seq <= end`, in sequence order.
    ///
    /// `end == 0` means through the last stored message. Sequence numbers with
    /// nothing stored are simply absent from the result.
    ///
    /// # Errors
    /// Returns `StoreError` if messages cannot be retrieved.
    fn get_range(
        &self,
        session_id: SessionId,
        begin: u64,
        end: u64,
    ) -> Result<Vec<StoredMessage>, StoreError>;

    /// Returns the persisted sequence index for a session, if any.
    fn sequences(&self, session_id: SessionId) -> Option<SequenceIndex>;

    /// Persists the sequence index for a session.
    ///
    /// # Errors
    /// Returns `StoreError` if the index cannot be written.
    fn update_sequences(&self, session_id: SessionId, index: SequenceIndex)
    -> Result<(), StoreError>;

    /// Clears stored messages and sequence indices for a session.
    ///
    /// # Errors
    /// Returns `StoreError` if the reset fails.
    fn reset(&self, session_id: SessionId) -> Result<(), StoreError>;
}
