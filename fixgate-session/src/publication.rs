/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Outbound publication contract.
//!
//! A publication is where finished frames go: the durable log on a live
//! engine, a capture buffer during reproduction and in tests. A frame either
//! receives a position or is refused as a whole.

use bytes::Bytes;
use fixgate_core::error::PublishError;
use fixgate_core::message::MsgType;
use fixgate_core::types::{ConnectionId, Position, SessionId};
use parking_lot::Mutex;
use std::fmt;

use crate::state::DisconnectReason;

/// Sink for outbound frames.
pub trait Publication: Send + Sync + fmt::Debug {
    /// Publishes one complete frame.
    ///
    /// # Errors
    /// Returns `PublishError::BackPressured` if the frame was not accepted and
    /// may be offered again.
    fn publish(
        &self,
        frame: &[u8],
        session_id: SessionId,
        msg_type: &MsgType,
    ) -> Result<Position, PublishError>;

    /// Asks the transport to close a connection.
    ///
    /// # Errors
    /// Returns `PublishError::BackPressured` if the request was not accepted.
    fn publish_disconnect(
        &self,
        connection_id: ConnectionId,
        reason: &DisconnectReason,
    ) -> Result<Position, PublishError>;
}

/// A frame recorded by [`CapturePublication`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    /// Session the frame was sent on.
    pub session_id: SessionId,
    /// Message type.
    pub msg_type: MsgType,
    /// Frame bytes.
    pub bytes: Bytes,
}

#[derive(Debug, Default)]
struct Captured {
    frames: Vec<CapturedFrame>,
    disconnects: Vec<(ConnectionId, DisconnectReason)>,
    next_position: u64,
    refuse_next: usize,
}

impl Captured {
    fn next(&mut self) -> Result<Position, PublishError> {
        if self.refuse_next > 0 {
            self.refuse_next -= 1;
            return Err(PublishError::BackPressured);
        }
        self.next_position += 1;
        Ok(Position::new(self.next_position))
    }
}

/// Publication that keeps every frame in memory.
#[derive(Debug, Default)]
pub struct CapturePublication {
    inner: Mutex<Captured>,
}

impl CapturePublication {
    /// Creates an empty capture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` publish attempts fail with back pressure.
    pub fn back_pressure_next(&self, count: usize) {
        self.inner.lock().refuse_next = count;
    }

    /// Returns a copy of the captured frames.
    #[must_use]
    pub fn frames(&self) -> Vec<CapturedFrame> {
        self.inner.lock().frames.clone()
    }

    /// Removes and returns the captured frames.
    pub fn drain(&self) -> Vec<CapturedFrame> {
        std::mem::take(&mut self.inner.lock().frames)
    }

    /// Returns the captured disconnect requests.
    #[must_use]
    pub fn disconnects(&self) -> Vec<(ConnectionId, DisconnectReason)> {
        self.inner.lock().disconnects.clone()
    }

    /// Returns the message types of the captured frames, in order.
    #[must_use]
    pub fn msg_types(&self) -> Vec<MsgType> {
        self.inner
            .lock()
            .frames
            .iter()
            .map(|frame| frame.msg_type.clone())
            .collect()
    }

    /// Returns the number of captured frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    /// Returns true if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().frames.is_empty()
    }
}

impl Publication for CapturePublication {
    fn publish(
        &self,
        frame: &[u8],
        session_id: SessionId,
        msg_type: &MsgType,
    ) -> Result<Position, PublishError> {
        let mut inner = self.inner.lock();
        let position = inner.next()?;
        inner.frames.push(CapturedFrame {
            session_id,
            msg_type: msg_type.clone(),
            bytes: Bytes::copy_from_slice(frame),
        });
        Ok(position)
    }

    fn publish_disconnect(
        &self,
        connection_id: ConnectionId,
        reason: &DisconnectReason,
    ) -> Result<Position, PublishError> {
        let mut inner = self.inner.lock();
        let position = inner.next()?;
        inner.disconnects.push((connection_id, reason.clone()));
        Ok(position)
    }
}
