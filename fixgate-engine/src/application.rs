/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Application callback interface.
//!
//! The same [`Application`] instance serves live sessions and reproduction
//! runs, so replies must depend only on the inbound messages it is given.

use fixgate_core::error::SessionError;
use fixgate_core::message::OwnedMessage;
use fixgate_core::types::SessionId;
use fixgate_session::{ApplicationSender, DisconnectReason};

/// Business logic attached to sessions.
pub trait Application: Send + Sync + 'static {
    /// Called when a session completes logon.
    ///
    /// # Arguments
    /// * `session_id` - The session identifier
    fn on_logon(&self, _session_id: SessionId) {}

    /// Called when the logout handshake completes.
    ///
    /// # Arguments
    /// * `session_id` - The session identifier
    fn on_logout(&self, _session_id: SessionId) {}

    /// Called when the connection of a session is closed for any reason.
    ///
    /// # Arguments
    /// * `session_id` - The session identifier, unknown if logon never completed
    /// * `reason` - Why the connection closed
    fn on_disconnect(&self, _session_id: SessionId, _reason: &DisconnectReason) {}

    /// Called for every in-order business message.
    ///
    /// # Arguments
    /// * `sender` - Sends replies on the same session
    /// * `message` - The received message
    ///
    /// # Errors
    /// Returns `SessionError` if a reply could not be sent. The error is
    /// logged; the inbound message stays accepted.
    fn on_message(
        &self,
        sender: &mut dyn ApplicationSender,
        message: &OwnedMessage,
    ) -> Result<(), SessionError>;
}

/// Application that accepts everything and never replies.
#[derive(Debug, Default)]
pub struct NoOpApplication;

impl Application for NoOpApplication {
    fn on_message(
        &self,
        _sender: &mut dyn ApplicationSender,
        _message: &OwnedMessage,
    ) -> Result<(), SessionError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use fixgate_core::message::MsgType;
    use fixgate_core::types::Position;
    use fixgate_session::BodyWriter;

    struct CountingSender {
        sent: usize,
    }

    impl ApplicationSender for CountingSender {
        fn session_id(&self) -> SessionId {
            SessionId::new(7)
        }

        fn send(
            &mut self,
            _msg_type: &MsgType,
            _body: &dyn Fn(&mut dyn BodyWriter),
        ) -> Result<Position, SessionError> {
            self.sent += 1;
            Ok(Position::new(self.sent as u64))
        }
    }

    #[test]
    fn test_noop_application() {
        let app = NoOpApplication;
        let mut sender = CountingSender { sent: 0 };
        let message = OwnedMessage::new(Bytes::new(), MsgType::NewOrderSingle, Vec::new());

        app.on_logon(SessionId::new(7));
        app.on_message(&mut sender, &message).unwrap();
        app.on_disconnect(SessionId::new(7), &DisconnectReason::Logout);
        app.on_logout(SessionId::new(7));
        assert_eq!(sender.sent, 0);
    }
}
