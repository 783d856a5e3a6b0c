/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! # FixGate Binary
//!
//! Binary Entry Point session protocol for the FixGate engine: FIXP-style
//! session templates over an SBE-like little endian layout framed by SOFH.
//!
//! This crate provides:
//! - **Layout**: frame constants and template ids
//! - **Codec**: scratch-buffer encoder and zero-copy frame view
//! - **Parser**: frames to logical session messages
//! - **Proxy**: the session proxy contract over binary templates
//! - **Offsets**: fixed positions for patching and reproduction comparison

pub mod codec;
pub mod error;
pub mod layout;
pub mod offsets;
pub mod parser;
pub mod proxy;

pub use codec::{BinaryEncoder, BinaryFrame, CommonBlock, Tlv, TlvIter};
pub use error::BinaryError;
pub use layout::{ENCODING_TYPE, SOFH_LEN, Template, frame_length};
pub use offsets::BinaryOffsets;
pub use parser::BinaryParser;
pub use proxy::BinaryProxy;

use fixgate_core::clock::EpochNanoClock;
use fixgate_core::types::SessionId;
use fixgate_session::identity::{SenderAndTargetCompIdStrategy, SessionIdStrategy};
use fixgate_session::protocol::SessionProtocol;
use fixgate_session::publication::Publication;
use std::sync::Arc;

/// Binary Entry Point protocol factory.
#[derive(Debug, Clone)]
pub struct BinaryEntryPointProtocol {
    identity: Arc<dyn SessionIdStrategy>,
}

impl BinaryEntryPointProtocol {
    /// Creates the protocol with the default identity strategy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            identity: Arc::new(SenderAndTargetCompIdStrategy),
        }
    }

    /// Replaces the identity strategy.
    #[must_use]
    pub fn with_identity(mut self, identity: Arc<dyn SessionIdStrategy>) -> Self {
        self.identity = identity;
        self
    }
}

impl Default for BinaryEntryPointProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionProtocol for BinaryEntryPointProtocol {
    type Parser = BinaryParser;
    type Proxy = BinaryProxy;
    type Offsets = BinaryOffsets;

    fn name(&self) -> &'static str {
        "binary-entry-point"
    }

    fn make_parser(&self, session_id: SessionId) -> BinaryParser {
        BinaryParser::new(session_id)
    }

    fn make_proxy(
        &self,
        publication: Arc<dyn Publication>,
        clock: Arc<dyn EpochNanoClock>,
    ) -> BinaryProxy {
        BinaryProxy::new(publication, clock, Arc::clone(&self.identity))
    }

    fn make_offsets(&self) -> BinaryOffsets {
        BinaryOffsets
    }

    fn identity(&self) -> Arc<dyn SessionIdStrategy> {
        Arc::clone(&self.identity)
    }

    fn for_replay(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixgate_core::clock::ManualClock;
    use fixgate_core::message::MsgType;
    use fixgate_core::types::{CompId, ConnectionId};
    use fixgate_session::{
        CapturePublication, CompositeKey, Session, SessionConfig, SessionContext, SessionEvent,
        SessionParser, SessionProxy, SessionState,
    };

    #[test]
    fn test_session_runs_over_binary_frames() {
        let protocol = BinaryEntryPointProtocol::new();
        let clock = Arc::new(ManualClock::new(1_000));
        let publication = Arc::new(CapturePublication::new());
        let proxy = protocol.make_proxy(publication.clone(), clock.clone());

        let client = CompositeKey::new(CompId::new("CLIENT").unwrap(), CompId::new("GW").unwrap());
        let mut client_proxy = protocol.make_proxy(Arc::new(CapturePublication::new()), clock.clone());
        client_proxy.set_session(SessionId::new(1), client);

        let config = SessionConfig::new(CompId::new("GW").unwrap(), "FIXP");
        let mut session = Session::acceptor(
            Arc::new(config),
            SessionContext::new(clock.clone()),
            ConnectionId::new(1),
            proxy,
        );
        let mut parser = protocol.make_parser(SessionId::UNKNOWN);

        client_proxy.logon(30, 1, SessionId::new(1), false).unwrap();
        session
            .on_message(parser.parse(client_proxy.last_frame()).unwrap())
            .unwrap();
        assert_eq!(session.state(), SessionState::Active);

        client_proxy
            .application(&MsgType::NewOrderSingle, 2, SessionId::new(1), &|body| {
                body.put_str(11, "ORD-1");
            })
            .unwrap();
        session
            .on_message(parser.parse(client_proxy.last_frame()).unwrap())
            .unwrap();

        let events = session.take_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], SessionEvent::Message(msg) if msg.get_field_str(11) == Some("ORD-1")));
        assert_eq!(publication.msg_types(), vec![MsgType::Logon]);
        assert_eq!(protocol.name(), "binary-entry-point");
    }
}
