/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! # FixGate Session
//!
//! FIX-family session layer for the FixGate engine.
//!
//! This crate provides:
//! - **State machine**: [`Session`] drives logon, heartbeats, gap recovery and logout
//! - **Sequence management**: per-direction MsgSeqNum tracking and resend windows
//! - **Protocol seam**: [`SessionProtocol`] bundles parser, proxy and frame offsets
//! - **Tag=value FIX**: the [`fix`] implementation of that seam
//! - **Identity**: composite keys and the session id registry
//! - **Configuration**: session configuration options

pub mod anomaly;
pub mod auth;
pub mod config;
pub mod fix;
pub mod frame;
pub mod heartbeat;
pub mod identity;
pub mod message;
pub mod protocol;
pub mod proxy;
pub mod publication;
pub mod sequence;
pub mod session;
pub mod state;

pub use anomaly::{AnomalyCounter, AnomalyHandler, AnomalyKind};
pub use auth::{AuthenticationStrategy, CredentialAuthentication, LogonRequest, NoAuthentication};
pub use config::{GapPolicy, LogonRejectPolicy, SessionConfig, SessionConfigBuilder};
pub use fix::{FixOffsets, FixParser, FixProtocol, FixProxy};
pub use frame::FrameBuffer;
pub use heartbeat::{HeartbeatAction, HeartbeatManager};
pub use identity::{CompositeKey, SenderAndTargetCompIdStrategy, SessionIdStrategy, SessionIds};
pub use message::{SessionHeader, SessionMessage, SessionMessageKind};
pub use protocol::{MessageOffsets, SessionParser, SessionProtocol};
pub use proxy::{BodyWriter, RejectReason, SessionProxy};
pub use publication::{CapturePublication, CapturedFrame, Publication};
pub use sequence::{SequenceManager, SequenceResult, SequenceWindow};
pub use session::{ApplicationSender, Session, SessionContext, SessionEvent};
pub use state::{DisconnectReason, SessionRole, SessionState};
