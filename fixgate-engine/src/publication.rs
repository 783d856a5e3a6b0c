/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Live outbound publication.
//!
//! [`LogPublication`] appends every outbound frame to the durable log before
//! handing it to the connection's writer task. A full writer channel refuses
//! the frame as a whole, so nothing is logged that was not also queued.

use bytes::Bytes;
use fixgate_core::clock::EpochNanoClock;
use fixgate_core::error::{PublishError, StoreError};
use fixgate_core::message::MsgType;
use fixgate_core::types::{ConnectionId, Position, SessionId};
use fixgate_session::{DisconnectReason, Publication};
use fixgate_store::{Direction, DurableLog, LogRecord};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::error;

/// Instruction for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Write a complete frame.
    Frame(Bytes),
    /// Close the connection.
    Disconnect(DisconnectReason),
}

/// Remembers the first durable log failure seen on the send path.
///
/// Publications can only report failures to the session as a
/// [`PublishError`]; the framer checks this to stop the engine.
#[derive(Debug, Default)]
pub struct LogHealth {
    failure: Mutex<Option<StoreError>>,
}

impl LogHealth {
    /// Creates a healthy tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure, keeping the first one.
    pub fn record(&self, err: StoreError) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            *failure = Some(err);
        }
    }

    /// Takes the recorded failure.
    pub fn take(&self) -> Option<StoreError> {
        self.failure.lock().take()
    }
}

/// Publication of one live connection.
pub struct LogPublication {
    log: Arc<dyn DurableLog>,
    clock: Arc<dyn EpochNanoClock>,
    health: Arc<LogHealth>,
    connection_id: ConnectionId,
    transport: Option<mpsc::Sender<Outbound>>,
}

impl LogPublication {
    /// Creates a publication that only logs.
    #[must_use]
    pub fn new(
        log: Arc<dyn DurableLog>,
        clock: Arc<dyn EpochNanoClock>,
        health: Arc<LogHealth>,
        connection_id: ConnectionId,
    ) -> Self {
        Self {
            log,
            clock,
            health,
            connection_id,
            transport: None,
        }
    }

    /// Forwards logged frames to a writer task.
    #[must_use]
    pub fn with_transport(mut self, transport: mpsc::Sender<Outbound>) -> Self {
        self.transport = Some(transport);
        self
    }

    fn append(&self, record: LogRecord) -> Result<Position, PublishError> {
        self.log.append(record).map_err(|e| {
            error!(
                connection_id = %self.connection_id,
                error = %e,
                "durable log append failed"
            );
            self.health.record(e.clone());
            PublishError::Store(e)
        })
    }
}

fn reserve(
    transport: Option<&mpsc::Sender<Outbound>>,
) -> Result<Option<mpsc::Permit<'_, Outbound>>, PublishError> {
    transport
        .map(|tx| {
            tx.try_reserve().map_err(|e| match e {
                TrySendError::Full(()) => PublishError::BackPressured,
                TrySendError::Closed(()) => PublishError::Closed,
            })
        })
        .transpose()
}

impl Publication for LogPublication {
    fn publish(
        &self,
        frame: &[u8],
        session_id: SessionId,
        msg_type: &MsgType,
    ) -> Result<Position, PublishError> {
        let permit = reserve(self.transport.as_ref())?;
        let bytes = Bytes::copy_from_slice(frame);
        let position = self.append(LogRecord::message(
            self.clock.nanos(),
            Direction::Outbound,
            self.connection_id,
            session_id,
            msg_type.clone(),
            bytes.clone(),
        ))?;
        if let Some(permit) = permit {
            permit.send(Outbound::Frame(bytes));
        }
        Ok(position)
    }

    fn publish_disconnect(
        &self,
        connection_id: ConnectionId,
        reason: &DisconnectReason,
    ) -> Result<Position, PublishError> {
        let permit = reserve(self.transport.as_ref())?;
        let position = self.append(LogRecord::disconnect(
            self.clock.nanos(),
            connection_id,
            SessionId::UNKNOWN,
            reason.as_str(),
        ))?;
        if let Some(permit) = permit {
            permit.send(Outbound::Disconnect(reason.clone()));
        }
        Ok(position)
    }
}

impl fmt::Debug for LogPublication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogPublication")
            .field("connection_id", &self.connection_id)
            .field("has_transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}
