/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! # FixGate
//!
//! A FIX-family session engine with a durable log and deterministic
//! reproduction.
//!
//! FixGate runs tag=value FIX and a binary entry point protocol behind one
//! session state machine. Every inbound and outbound frame is appended to a
//! durable log before it is acted on, so any window of traffic can later be
//! replayed through the same business logic and compared byte for byte.
//!
//! ## Features
//!
//! - **Pluggable protocols**: tag=value FIX and SOFH/SBE-framed binary sessions
//! - **Gap recovery**: resend requests, gap fills and PossDup handling
//! - **Durable log**: in-memory and file-backed, password-cleaned on the way in
//! - **Reproduction**: replay a log window and count divergences
//! - **Async support**: Built on Tokio for networking and the engine task
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fixgate::prelude::*;
//!
//! let config = SessionConfig::new(CompId::new("GW").unwrap(), "FIX.4.4");
//! let engine = EngineBuilder::new(config)
//!     .with_application(MyApplication)
//!     .build()?;
//! let (handle, _task) = engine.spawn();
//! serve(TcpListener::bind("0.0.0.0:9876").await?, handle, FixCodec::new()).await?;
//! ```
//!
//! ## Crate Organization
//!
//! - [`core`]: Fundamental types, clocks, and error definitions
//! - [`tagvalue`]: Tag=value encoding, decoding and log hygiene
//! - [`session`]: Session state machine and protocol seam
//! - [`binary`]: Binary entry point protocol
//! - [`store`]: Durable log and resend store
//! - [`transport`]: Stream framing codecs
//! - [`engine`]: Engine task, reproduction and TCP helpers

pub mod core {
    //! Core types, clocks, and error definitions.
    pub use fixgate_core::*;
}

pub mod tagvalue {
    //! Tag=value encoding, decoding and log hygiene.
    pub use fixgate_tagvalue::*;
}

pub mod session {
    //! Session state machine and protocol seam.
    pub use fixgate_session::*;
}

pub mod binary {
    //! Binary entry point protocol.
    pub use fixgate_binary::*;
}

pub mod store {
    //! Durable log and resend store.
    pub use fixgate_store::*;
}

pub mod transport {
    //! Stream framing codecs.
    pub use fixgate_transport::*;
}

pub mod engine {
    //! Engine task, reproduction and TCP helpers.
    pub use fixgate_engine::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    // Core types
    pub use fixgate_core::{
        CompId, ConnectionId, DecodeError, EncodeError, EpochNanoClock, FixError, ManualClock,
        MsgType, OwnedMessage, PublishError, SessionError, SessionId, StoreError,
        SystemEpochClock,
    };

    // Session
    pub use fixgate_session::{
        AnomalyHandler, AnomalyKind, ApplicationSender, AuthenticationStrategy, BodyWriter,
        CompositeKey, CredentialAuthentication, DisconnectReason, FixProtocol, SessionConfig,
        SessionProtocol, SessionState,
    };

    // Binary
    pub use fixgate_binary::BinaryEntryPointProtocol;

    // Store
    pub use fixgate_store::{DurableLog, FileLog, MemoryLog, ReproductionWindow};

    // Transport
    pub use fixgate_transport::{FixCodec, SofhCodec};

    // Engine
    pub use fixgate_engine::{
        Application, CompletionStatus, EngineBuilder, EngineError, EngineHandle,
        StashingMessageHandler, connect, serve,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        let config = SessionConfig::new(CompId::new("GW").unwrap(), "FIX.4.4");
        let builder = EngineBuilder::new(config);
        assert!(builder.cleans_passwords());
        assert_eq!(ReproductionWindow::all().start_ns(), 0);
    }

    #[test]
    fn test_protocols_share_the_seam() {
        assert_eq!(FixProtocol::new("FIX.4.4").name(), "fix");
        assert_eq!(BinaryEntryPointProtocol::new().name(), "binary-entry-point");
    }
}
