/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! # FixGate Core
//!
//! Core types, errors and clocks shared by every FixGate crate.
//!
//! This crate provides:
//! - **Error types**: Unified error handling with `thiserror`
//! - **Field types**: `FieldTag`, `FieldRef` and well-known tag numbers
//! - **Message types**: `RawMessage`, `OwnedMessage`, `MsgType`
//! - **Core types**: `SeqNum`, `SessionId`, `ConnectionId`, `Position`, `Timestamp`, `CompId`
//! - **Clocks**: Epoch nanosecond clocks, including a manually driven one for replay

pub mod clock;
pub mod error;
pub mod field;
pub mod message;
pub mod types;

pub use clock::{EpochNanoClock, ManualClock, SystemEpochClock};
pub use error::{
    DecodeError, EncodeError, FixError, PublishError, Result, SessionError, StoreError,
};
pub use field::{FieldRef, FieldTag, tags};
pub use message::{MsgType, OwnedMessage, RawMessage};
pub use types::{CompId, ConnectionId, Position, SeqNum, SessionId, Timestamp};
