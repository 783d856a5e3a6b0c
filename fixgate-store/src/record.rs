/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Durable log records and reproduction windows.
//!
//! On disk each record is a `u32` big-endian payload length followed by the
//! payload:
//!
//! ```text
//! position u64 | timestamp_ns u64 | direction u8 | kind u8 | connection u64 |
//! session u64 | label_len u16 | label | body_len u32 | body
//! ```
//!
//! Integers inside the payload are little endian. `label` is the message type
//! for message records and the reason for disconnect records.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use fixgate_core::error::StoreError;
use fixgate_core::message::MsgType;
use fixgate_core::types::{ConnectionId, Position, SessionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of the length prefix in front of every encoded record.
pub const LENGTH_PREFIX: usize = 4;

/// Fixed part of an encoded payload, excluding label and body.
const FIXED_PAYLOAD: usize = 8 + 8 + 1 + 1 + 8 + 8 + 2 + 4;

/// Direction of a logged frame relative to this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Received from the counterparty.
    Inbound,
    /// Sent to the counterparty.
    Outbound,
}

impl Direction {
    const fn code(self) -> u8 {
        match self {
            Self::Inbound => 0,
            Self::Outbound => 1,
        }
    }

    fn from_code(code: u8) -> Result<Self, StoreError> {
        match code {
            0 => Ok(Self::Inbound),
            1 => Ok(Self::Outbound),
            other => Err(StoreError::Corrupted {
                reason: format!("unknown direction {other}"),
            }),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => write!(f, "inbound"),
            Self::Outbound => write!(f, "outbound"),
        }
    }
}

/// What a record describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    /// A protocol frame.
    Message {
        /// Message type of the frame.
        msg_type: MsgType,
    },
    /// A transport disconnect notification.
    Disconnect {
        /// Human readable reason.
        reason: String,
    },
}

impl RecordKind {
    const fn code(&self) -> u8 {
        match self {
            Self::Message { .. } => 0,
            Self::Disconnect { .. } => 1,
        }
    }

    fn label(&self) -> &str {
        match self {
            Self::Message { msg_type } => msg_type.as_str(),
            Self::Disconnect { reason } => reason,
        }
    }
}

/// One immutable entry of the durable log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Position assigned by the log on append.
    pub position: Position,
    /// Epoch nanoseconds at which the frame was logged.
    pub timestamp_ns: u64,
    /// Inbound or outbound.
    pub direction: Direction,
    /// Message or disconnect.
    pub kind: RecordKind,
    /// Transport connection the frame travelled on.
    pub connection_id: ConnectionId,
    /// Session the frame belongs to, or [`SessionId::UNKNOWN`] before logon.
    pub session_id: SessionId,
    /// Raw frame bytes. Empty for disconnects.
    pub body: Bytes,
}

impl LogRecord {
    /// Creates a message record. The position is assigned on append.
    #[must_use]
    pub fn message(
        timestamp_ns: u64,
        direction: Direction,
        connection_id: ConnectionId,
        session_id: SessionId,
        msg_type: MsgType,
        body: Bytes,
    ) -> Self {
        Self {
            position: Position::default(),
            timestamp_ns,
            direction,
            kind: RecordKind::Message { msg_type },
            connection_id,
            session_id,
            body,
        }
    }

    /// Creates an outbound disconnect record.
    #[must_use]
    pub fn disconnect(
        timestamp_ns: u64,
        connection_id: ConnectionId,
        session_id: SessionId,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            position: Position::default(),
            timestamp_ns,
            direction: Direction::Outbound,
            kind: RecordKind::Disconnect {
                reason: reason.into(),
            },
            connection_id,
            session_id,
            body: Bytes::new(),
        }
    }

    /// Returns the message type for message records.
    #[must_use]
    pub fn msg_type(&self) -> Option<&MsgType> {
        match &self.kind {
            RecordKind::Message { msg_type } => Some(msg_type),
            RecordKind::Disconnect { .. } => None,
        }
    }

    /// Returns true for inbound message records.
    #[must_use]
    pub fn is_inbound_message(&self) -> bool {
        self.direction == Direction::Inbound && self.msg_type().is_some()
    }

    /// Returns true for outbound message records.
    #[must_use]
    pub fn is_outbound_message(&self) -> bool {
        self.direction == Direction::Outbound && self.msg_type().is_some()
    }

    /// Appends the length-prefixed encoding of this record to `dst`.
    pub(crate) fn encode(&self, dst: &mut BytesMut) -> Result<(), StoreError> {
        let label = self.kind.label().as_bytes();
        let label_len = u16::try_from(label.len()).map_err(|_| StoreError::AppendFailed {
            reason: format!("label of {} bytes is too long", label.len()),
        })?;
        let body_len = u32::try_from(self.body.len()).map_err(|_| StoreError::AppendFailed {
            reason: format!("frame of {} bytes is too long", self.body.len()),
        })?;
        let payload_len = FIXED_PAYLOAD + label.len() + self.body.len();
        let payload_len = u32::try_from(payload_len).map_err(|_| StoreError::AppendFailed {
            reason: format!("record of {payload_len} bytes is too long"),
        })?;

        dst.reserve(LENGTH_PREFIX + payload_len as usize);
        dst.put_u32(payload_len);
        dst.put_u64_le(self.position.value());
        dst.put_u64_le(self.timestamp_ns);
        dst.put_u8(self.direction.code());
        dst.put_u8(self.kind.code());
        dst.put_u64_le(self.connection_id.value());
        dst.put_u64_le(self.session_id.value());
        dst.put_u16_le(label_len);
        dst.put_slice(label);
        dst.put_u32_le(body_len);
        dst.put_slice(&self.body);
        Ok(())
    }

    /// Decodes one record from the front of `src`.
    ///
    /// # Returns
    /// `Ok(None)` if `src` holds only part of a record.
    pub(crate) fn decode(src: &mut Bytes) -> Result<Option<Self>, StoreError> {
        if src.len() < LENGTH_PREFIX {
            return Ok(None);
        }
        let payload_len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if src.len() < LENGTH_PREFIX + payload_len {
            return Ok(None);
        }
        if payload_len < FIXED_PAYLOAD {
            return Err(StoreError::Corrupted {
                reason: format!("record payload of {payload_len} bytes is truncated"),
            });
        }

        src.advance(LENGTH_PREFIX);
        let mut payload = src.split_to(payload_len);

        let position = Position::new(payload.get_u64_le());
        let timestamp_ns = payload.get_u64_le();
        let direction = Direction::from_code(payload.get_u8())?;
        let kind_code = payload.get_u8();
        let connection_id = ConnectionId::new(payload.get_u64_le());
        let session_id = SessionId::new(payload.get_u64_le());

        let label_len = payload.get_u16_le() as usize;
        if payload.len() < label_len + 4 {
            return Err(StoreError::Corrupted {
                reason: "label overruns record".to_string(),
            });
        }
        let label = payload.split_to(label_len);
        let label = std::str::from_utf8(&label)
            .map_err(|e| StoreError::Corrupted {
                reason: format!("label is not utf-8: {e}"),
            })?
            .to_string();

        let body_len = payload.get_u32_le() as usize;
        if payload.len() != body_len {
            return Err(StoreError::Corrupted {
                reason: format!("body length {body_len} does not match {}", payload.len()),
            });
        }

        let kind = match kind_code {
            0 => RecordKind::Message {
                msg_type: match label.parse() {
                    Ok(msg_type) => msg_type,
                    Err(never) => match never {},
                },
            },
            1 => RecordKind::Disconnect { reason: label },
            other => {
                return Err(StoreError::Corrupted {
                    reason: format!("unknown record kind {other}"),
                });
            }
        };

        Ok(Some(Self {
            position,
            timestamp_ns,
            direction,
            kind,
            connection_id,
            session_id,
            body: payload,
        }))
    }
}

/// Inclusive `[start_ns, end_ns]` selection over the durable log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReproductionWindow {
    start_ns: u64,
    end_ns: u64,
}

impl ReproductionWindow {
    /// Creates a window.
    ///
    /// # Errors
    /// Returns `StoreError::InvalidWindow` if `start_ns > end_ns`.
    pub fn new(start_ns: u64, end_ns: u64) -> Result<Self, StoreError> {
        if start_ns > end_ns {
            return Err(StoreError::InvalidWindow { start_ns, end_ns });
        }
        Ok(Self { start_ns, end_ns })
    }

    /// Window covering the whole log.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            start_ns: 0,
            end_ns: u64::MAX,
        }
    }

    /// Returns the window start.
    #[inline]
    #[must_use]
    pub const fn start_ns(&self) -> u64 {
        self.start_ns
    }

    /// Returns the window end.
    #[inline]
    #[must_use]
    pub const fn end_ns(&self) -> u64 {
        self.end_ns
    }

    /// Returns true if `timestamp_ns` falls inside the window.
    #[inline]
    #[must_use]
    pub const fn contains(&self, timestamp_ns: u64) -> bool {
        timestamp_ns >= self.start_ns && timestamp_ns <= self.end_ns
    }

    /// Returns the window of everything logged strictly before this one.
    #[must_use]
    pub const fn preceding(&self) -> Option<Self> {
        if self.start_ns == 0 {
            None
        } else {
            Some(Self {
                start_ns: 0,
                end_ns: self.start_ns - 1,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LogRecord {
        let mut record = LogRecord::message(
            1_000,
            Direction::Inbound,
            ConnectionId::new(3),
            SessionId::new(1),
            MsgType::NewOrderSingle,
            Bytes::from_static(b"8=FIX.4.4\x019=5\x0135=D\x0110=000\x01"),
        );
        record.position = Position::new(7);
        record
    }

    #[test]
    fn test_encode_decode_record() {
        let record = sample();
        let mut buf = BytesMut::new();
        record.encode(&mut buf).unwrap();

        let mut bytes = buf.freeze();
        let decoded = LogRecord::decode(&mut bytes).unwrap().unwrap();
        assert_eq!(decoded, record);
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_decode_partial_record() {
        let mut buf = BytesMut::new();
        sample().encode(&mut buf).unwrap();
        let mut partial = buf.freeze().slice(..20);
        assert!(LogRecord::decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn test_disconnect_record() {
        let record = LogRecord::disconnect(5, ConnectionId::new(1), SessionId::new(2), "logout");
        assert!(record.msg_type().is_none());
        assert!(!record.is_outbound_message());
        assert_eq!(record.kind.label(), "logout");
    }

    #[test]
    fn test_window_validation() {
        assert!(ReproductionWindow::new(10, 5).is_err());
        let window = ReproductionWindow::new(10, 20).unwrap();
        assert!(window.contains(10));
        assert!(window.contains(20));
        assert!(!window.contains(21));
        assert_eq!(
            window.preceding(),
            Some(ReproductionWindow::new(0, 9).unwrap())
        );
        assert_eq!(ReproductionWindow::all().preceding(), None);
    }
}
