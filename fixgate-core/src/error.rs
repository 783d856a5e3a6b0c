/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Error types for the FixGate session engine.
//!
//! This module provides a unified error hierarchy using `thiserror`. Session-level
//! errors stay local to one session; store errors surfacing from the durable log
//! are fatal to the engine.

use std::ops::Range;
use thiserror::Error;

/// Result type alias using [`FixError`] as the error type.
pub type Result<T> = std::result::Result<T, FixError>;

/// Top-level error type for all FixGate operations.
#[derive(Debug, Error)]
pub enum FixError {
    /// Error during message decoding.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Error during message encoding.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Error in session layer operations.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Error in durable log or message store operations.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error handing a frame to the publication.
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    /// I/O error from underlying transport.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that occur while decoding an inbound message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Message buffer is incomplete, need more data.
    #[error("incomplete message, need more data")]
    Incomplete,

    /// Invalid BeginString field (tag 8).
    #[error("invalid begin string: expected 8=FIX.x.y")]
    InvalidBeginString,

    /// Missing BodyLength field (tag 9).
    #[error("missing body length field (tag 9)")]
    MissingBodyLength,

    /// Invalid BodyLength value.
    #[error("invalid body length value")]
    InvalidBodyLength,

    /// Missing MsgType field (tag 35).
    #[error("missing msg type field (tag 35)")]
    MissingMsgType,

    /// Checksum mismatch between calculated and declared values.
    #[error("checksum mismatch: calculated {calculated}, declared {declared}")]
    ChecksumMismatch {
        /// Calculated checksum value.
        calculated: u8,
        /// Declared checksum value in message.
        declared: u8,
    },

    /// Missing required field.
    #[error("missing required field: tag {tag}")]
    MissingRequiredField {
        /// The tag number of the missing field.
        tag: u32,
    },

    /// Invalid field value for the expected type.
    #[error("invalid field value for tag {tag}: {reason}")]
    InvalidFieldValue {
        /// The tag number of the field.
        tag: u32,
        /// Description of why the value is invalid.
        reason: String,
    },

    /// Invalid UTF-8 in string field.
    #[error("invalid utf-8 in field: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Message exceeds maximum allowed size.
    #[error("message too large: {size} bytes exceeds maximum {max_size}")]
    MessageTooLarge {
        /// Actual message size in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max_size: usize,
    },

    /// Frame does not follow the binary layout.
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Errors that occur while encoding an outbound message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Buffer capacity exceeded during encoding.
    #[error("buffer overflow: need {needed} bytes, have {available}")]
    BufferOverflow {
        /// Bytes needed to complete encoding.
        needed: usize,
        /// Bytes available in buffer.
        available: usize,
    },

    /// Invalid field value for encoding.
    #[error("invalid field value for tag {tag}: {reason}")]
    InvalidFieldValue {
        /// The tag number of the field.
        tag: u32,
        /// Description of why the value is invalid.
        reason: String,
    },

    /// Field value exceeds maximum length.
    #[error("field value too long for tag {tag}: {length} exceeds max {max_length}")]
    FieldTooLong {
        /// The tag number of the field.
        tag: u32,
        /// Actual length of the value.
        length: usize,
        /// Maximum allowed length.
        max_length: usize,
    },
}

/// Errors handing a frame to the publication.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The durable log is momentarily full; the frame was not sent and may be retried.
    #[error("publication back pressured")]
    BackPressured,

    /// The publication has been closed.
    #[error("publication closed")]
    Closed,

    /// The frame could not be built.
    #[error("frame encoding failed: {0}")]
    Encode(#[from] EncodeError),

    /// The durable log rejected the frame.
    #[error("durable log failure: {0}")]
    Store(#[from] StoreError),

    /// A stored frame to be re-sent could not be decoded.
    #[error("stored frame is malformed: {0}")]
    Malformed(String),
}

impl PublishError {
    /// Returns true if the caller should retry the same send later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::BackPressured)
    }
}

/// Errors in FIX session layer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Session is not in the correct state for the operation.
    #[error("invalid session state: expected {expected}, current {current}")]
    InvalidState {
        /// Expected state for the operation.
        expected: String,
        /// Current session state.
        current: String,
    },

    /// Logon was rejected by the authentication hook or validation.
    #[error("logon rejected: {reason}")]
    LogonRejected {
        /// Reason for rejection.
        reason: String,
    },

    /// Heartbeat timeout - no response to TestRequest.
    #[error("heartbeat timeout after {elapsed_ms} milliseconds")]
    HeartbeatTimeout {
        /// Elapsed time in milliseconds since last message.
        elapsed_ms: u64,
    },

    /// Sequence number gap detected.
    #[error("sequence gap detected: expected {expected}, received {received}")]
    SequenceGap {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },

    /// Sequence number too low without PossDupFlag.
    #[error("sequence too low: expected >= {expected}, received {received}")]
    SequenceTooLow {
        /// Minimum expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },

    /// A send could not complete because the publication is back pressured.
    ///
    /// Session state has not been advanced; the same input must be offered again.
    #[error("publication back pressured, retry")]
    BackPressured,

    /// The publication failed permanently.
    #[error("publication failed: {0}")]
    Publication(String),

    /// Session configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// The message store failed.
    #[error("message store error: {0}")]
    Store(String),
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<PublishError> for SessionError {
    fn from(err: PublishError) -> Self {
        match err {
            PublishError::BackPressured => Self::BackPressured,
            other => Self::Publication(other.to_string()),
        }
    }
}

/// Errors in durable log and message store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Failed to append a record.
    #[error("failed to append record: {reason}")]
    AppendFailed {
        /// Reason for failure.
        reason: String,
    },

    /// Message not found in store.
    #[error("message not found: session={session_id} seq={seq_num}")]
    NotFound {
        /// Session the message belongs to.
        session_id: u64,
        /// Sequence number of the missing message.
        seq_num: u64,
    },

    /// Range of messages not available.
    #[error("messages not available for range: {range:?}")]
    RangeNotAvailable {
        /// The requested range of sequence numbers.
        range: Range<u64>,
    },

    /// Invalid reproduction window.
    #[error("invalid window: start {start_ns} is after end {end_ns}")]
    InvalidWindow {
        /// Window start in epoch nanoseconds.
        start_ns: u64,
        /// Window end in epoch nanoseconds.
        end_ns: u64,
    },

    /// Store is corrupted.
    #[error("store corrupted: {reason}")]
    Corrupted {
        /// Description of the corruption.
        reason: String,
    },

    /// I/O error in persistent store.
    #[error("store i/o error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::ChecksumMismatch {
            calculated: 100,
            declared: 200,
        };
        assert_eq!(
            err.to_string(),
            "checksum mismatch: calculated 100, declared 200"
        );
    }

    #[test]
    fn test_fix_error_from_decode() {
        let fix_err: FixError = DecodeError::Incomplete.into();
        assert!(matches!(fix_err, FixError::Decode(DecodeError::Incomplete)));
    }

    #[test]
    fn test_publish_error_maps_to_session_error() {
        assert_eq!(
            SessionError::from(PublishError::BackPressured),
            SessionError::BackPressured
        );
        assert!(matches!(
            SessionError::from(PublishError::Closed),
            SessionError::Publication(_)
        ));
        assert!(PublishError::BackPressured.is_retryable());
        assert!(!PublishError::Closed.is_retryable());
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::NotFound {
            session_id: 1,
            seq_num: 42,
        };
        assert_eq!(err.to_string(), "message not found: session=1 seq=42");
    }
}
