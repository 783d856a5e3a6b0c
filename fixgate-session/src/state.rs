/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Session states and termination reasons.
//!
//! The lifecycle is:
//! - `Connected` → `LogonSent` (initiator) or straight to `Active` (acceptor)
//! - `Active` ↔ `AwaitingResend` while a gap is outstanding
//! - `Active` → `LogoutSent` | `LogoutReceived` → `Disconnected`
//!
//! A session can be terminated from any state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side opened the transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionRole {
    /// Waits for the counterparty's Logon.
    Acceptor,
    /// Sends the first Logon.
    Initiator,
}

/// State of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Transport connected, no Logon exchanged yet.
    Connected,
    /// Logon sent, waiting for the counterparty's Logon.
    LogonSent,
    /// Logon received and being validated.
    LogonReceived,
    /// Session established.
    Active,
    /// Established, with a ResendRequest outstanding.
    AwaitingResend,
    /// Logout sent, waiting for the counterparty's Logout.
    LogoutSent,
    /// Logout received, reply pending.
    LogoutReceived,
    /// Terminal.
    Disconnected,
}

impl SessionState {
    /// Returns the state name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Connected => "Connected",
            Self::LogonSent => "LogonSent",
            Self::LogonReceived => "LogonReceived",
            Self::Active => "Active",
            Self::AwaitingResend => "AwaitingResend",
            Self::LogoutSent => "LogoutSent",
            Self::LogoutReceived => "LogoutReceived",
            Self::Disconnected => "Disconnected",
        }
    }

    /// Returns true once logon completed and until logout starts.
    #[must_use]
    pub const fn is_established(self) -> bool {
        matches!(self, Self::Active | Self::AwaitingResend)
    }

    /// Returns true while logon has not completed.
    #[must_use]
    pub const fn is_logging_on(self) -> bool {
        matches!(self, Self::Connected | Self::LogonSent | Self::LogonReceived)
    }

    /// Returns true if application messages may be sent.
    #[must_use]
    pub const fn can_send_application(self) -> bool {
        self.is_established()
    }

    /// Returns true for the terminal state.
    #[must_use]
    pub const fn is_disconnected(self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a connection was closed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// Logout handshake completed.
    Logout,
    /// Logon failed validation or authentication.
    LogonRejected,
    /// No Logon within the logon timeout.
    LogonTimeout,
    /// No Logout reply within the logout timeout.
    LogoutTimeout,
    /// TestRequest went unanswered.
    HeartbeatTimeout,
    /// Fatal protocol violation.
    ProtocolViolation,
    /// First message on the connection was not a Logon.
    FirstMessageNotLogon,
    /// Closed administratively.
    Terminated(String),
    /// Requested by the application.
    Application,
}

impl DisconnectReason {
    /// Returns a stable code for the reason, used in durable log records.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Logout => "logout",
            Self::LogonRejected => "logon rejected",
            Self::LogonTimeout => "logon timeout",
            Self::LogoutTimeout => "logout timeout",
            Self::HeartbeatTimeout => "heartbeat timeout",
            Self::ProtocolViolation => "protocol violation",
            Self::FirstMessageNotLogon => "first message not logon",
            Self::Terminated(reason) => reason,
            Self::Application => "application",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(SessionState::Active.is_established());
        assert!(SessionState::AwaitingResend.can_send_application());
        assert!(!SessionState::LogoutSent.can_send_application());
        assert!(SessionState::LogonSent.is_logging_on());
        assert!(SessionState::Disconnected.is_disconnected());
    }

    #[test]
    fn test_display() {
        assert_eq!(SessionState::AwaitingResend.to_string(), "AwaitingResend");
        assert_eq!(
            DisconnectReason::HeartbeatTimeout.to_string(),
            "heartbeat timeout"
        );
        assert_eq!(
            DisconnectReason::Terminated("admin".to_string()).to_string(),
            "admin"
        );
    }
}
