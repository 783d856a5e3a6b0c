/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Engine-level errors.

use fixgate_core::error::{SessionError, StoreError};
use fixgate_core::types::ConnectionId;
use thiserror::Error;

/// Errors raised by the engine, its framer and reproduction runs.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The durable log failed. Fatal: the engine stops.
    #[error("durable log unavailable: {0}")]
    Store(#[from] StoreError),

    /// A session operation failed.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// No session is bound to the connection.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// The connection already has a session.
    #[error("connection {0} already has a session")]
    DuplicateConnection(ConnectionId),

    /// Another reproduction run has not completed yet.
    #[error("a reproduction is already in flight")]
    ReproductionInFlight,

    /// The engine task has stopped.
    #[error("engine closed")]
    Closed,

    /// Invalid engine configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Socket failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Returns true if the engine cannot continue after this error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}
