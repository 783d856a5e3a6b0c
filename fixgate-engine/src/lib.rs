/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! # FixGate Engine
//!
//! Session engine, durable logging and reproduction for FixGate.
//!
//! This crate provides:
//! - **Application trait**: Business callbacks shared by live traffic and replay
//! - **Framer**: Per-connection session driving with inbound archiving
//! - **Publications**: Log-then-send outbound path with back pressure
//! - **Reproduction**: Replays durable log windows and compares the output
//! - **Engine handle**: Async command interface to the engine task
//! - **Builder API**: Fluent configuration for engine setup
//! - **TCP helpers**: Accept and connect loops over a framing codec

pub mod application;
pub mod builder;
pub mod engine;
pub mod error;
pub mod framer;
pub mod publication;
pub mod reply;
pub mod reproduction;
pub mod serve;

pub use application::{Application, NoOpApplication};
pub use builder::EngineBuilder;
pub use engine::{Engine, EngineHandle};
pub use error::EngineError;
pub use framer::Framer;
pub use publication::{LogHealth, LogPublication, Outbound};
pub use reply::{Reply, ReplySender};
pub use reproduction::{
    CompletionStatus, ReproductionEngine, ReproductionMessageHandler, ReproductionRunner,
    StashedMessage, StashingMessageHandler,
};
pub use serve::{FrameCodec, connect, serve};
