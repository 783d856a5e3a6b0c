/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! # FixGate Store
//!
//! Persistence for the FixGate session engine.
//!
//! This crate provides:
//! - **DurableLog trait**: Append-only, totally ordered record of all session traffic
//! - **MessageStore trait**: Sent business messages and sequence indices per session
//! - **MemoryLog / MemoryStore**: In-memory implementations for tests and replay
//! - **FileLog**: Length-prefixed file-backed durable log that recovers on open

pub mod file;
pub mod memory;
pub mod record;
pub mod traits;

pub use file::FileLog;
pub use memory::{MemoryLog, MemoryStore};
pub use record::{Direction, LogRecord, RecordKind, ReproductionWindow};
pub use traits::{DurableLog, MessageStore, SequenceIndex, StoredMessage};
