/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Logon authentication hook.

use crate::identity::CompositeKey;
use crate::proxy::RejectReason;
use std::collections::HashMap;
use std::fmt;

/// What an inbound Logon asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogonRequest {
    /// Composite key extracted from the Logon.
    pub key: CompositeKey,
    /// Requested heartbeat interval.
    pub heartbeat_interval_secs: u64,
    /// Username(553).
    pub username: Option<String>,
    /// Password(554).
    pub password: Option<String>,
    /// ResetSeqNumFlag(141).
    pub reset_seq_num: bool,
}

/// Decides whether a Logon is accepted.
pub trait AuthenticationStrategy: Send + Sync + fmt::Debug {
    /// Authenticates a logon.
    ///
    /// # Errors
    /// Returns the reason to put in the Reject when the logon is refused.
    fn authenticate(&self, request: &LogonRequest) -> Result<(), RejectReason>;
}

/// Accepts every logon.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAuthentication;

impl AuthenticationStrategy for NoAuthentication {
    fn authenticate(&self, _request: &LogonRequest) -> Result<(), RejectReason> {
        Ok(())
    }
}

/// Accepts logons whose Username/Password pair is known.
#[derive(Debug, Default, Clone)]
pub struct CredentialAuthentication {
    credentials: HashMap<String, String>,
}

impl CredentialAuthentication {
    /// Creates an empty credential set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user.
    #[must_use]
    pub fn with_user(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials.insert(username.into(), password.into());
        self
    }
}

impl AuthenticationStrategy for CredentialAuthentication {
    fn authenticate(&self, request: &LogonRequest) -> Result<(), RejectReason> {
        let (Some(username), Some(password)) = (&request.username, &request.password) else {
            return Err(RejectReason::other("missing credentials"));
        };

        match self.credentials.get(username) {
            Some(expected) if expected == password => Ok(()),
            _ => Err(RejectReason::other("invalid credentials")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixgate_core::types::CompId;

    fn request(username: Option<&str>, password: Option<&str>) -> LogonRequest {
        LogonRequest {
            key: CompositeKey::new(CompId::new("GW").unwrap(), CompId::new("CLIENT").unwrap()),
            heartbeat_interval_secs: 30,
            username: username.map(String::from),
            password: password.map(String::from),
            reset_seq_num: false,
        }
    }

    #[test]
    fn test_no_authentication() {
        assert!(NoAuthentication.authenticate(&request(None, None)).is_ok());
    }

    #[test]
    fn test_credential_authentication() {
        let auth = CredentialAuthentication::new().with_user("trader", "secret");
        assert!(auth.authenticate(&request(Some("trader"), Some("secret"))).is_ok());

        let wrong = auth
            .authenticate(&request(Some("trader"), Some("guess")))
            .unwrap_err();
        assert_eq!(wrong.text, "invalid credentials");
        assert!(auth.authenticate(&request(Some("trader"), None)).is_err());
    }
}
