/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Session configuration.
//!
//! One [`SessionConfig`] is shared by every session an engine drives. The
//! counterparty's CompID is learned at logon, so only the local identity is
//! configured here.

use fixgate_core::error::SessionError;
use fixgate_core::types::CompId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do with messages that arrive while a resend request is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GapPolicy {
    /// Keep them, bounded by `max_buffered_messages`, and deliver once the gap closes.
    #[default]
    Buffer,
    /// Drop them and ask the counterparty to resend everything (`EndSeqNo = 0`).
    Drop,
}

/// How a failed logon is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogonRejectPolicy {
    /// Send a Reject carrying the reason, then disconnect.
    #[default]
    Reject,
    /// Disconnect without replying.
    Disconnect,
}

/// Configuration for FIX sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Local CompID, stamped as SenderCompID (tag 49) on outbound messages.
    pub local_comp_id: CompId,
    /// Optional local sub ID (tag 50).
    pub local_sub_id: Option<CompId>,
    /// FIX version BeginString (e.g., "FIX.4.4").
    pub begin_string: String,
    /// Heartbeat interval proposed by an initiator.
    pub heartbeat_interval: Duration,
    /// Smallest heartbeat interval accepted from a counterparty.
    pub min_heartbeat_interval: Duration,
    /// Largest heartbeat interval accepted from a counterparty.
    pub max_heartbeat_interval: Duration,
    /// How long a connection may stay without a completed logon.
    pub logon_timeout: Duration,
    /// How long to wait for the counterparty's logout reply.
    pub logout_timeout: Duration,
    /// Whether to reset sequence numbers on every logon.
    pub reset_on_logon: bool,
    /// Handling of messages received during an outstanding gap.
    pub gap_policy: GapPolicy,
    /// Upper bound on messages held while a gap is outstanding.
    pub max_buffered_messages: usize,
    /// How a failed logon is answered.
    pub logon_reject_policy: LogonRejectPolicy,
    /// Whether a malformed message ends the session after it is rejected.
    pub fatal_protocol_violations: bool,
    /// Whether to validate incoming message checksums.
    pub validate_checksum: bool,
    /// Inbound silence, as a multiple of the heartbeat interval, before a TestRequest.
    pub test_request_factor: f64,
    /// Maximum message size in bytes.
    pub max_message_size: usize,
}

impl SessionConfig {
    /// Creates a new session configuration with required fields.
    ///
    /// # Arguments
    /// * `local_comp_id` - The CompID this engine answers to
    /// * `begin_string` - The FIX version string
    #[must_use]
    pub fn new(local_comp_id: CompId, begin_string: impl Into<String>) -> Self {
        Self {
            local_comp_id,
            local_sub_id: None,
            begin_string: begin_string.into(),
            heartbeat_interval: Duration::from_secs(30),
            min_heartbeat_interval: Duration::from_secs(1),
            max_heartbeat_interval: Duration::from_secs(300),
            logon_timeout: Duration::from_secs(10),
            logout_timeout: Duration::from_secs(10),
            reset_on_logon: false,
            gap_policy: GapPolicy::Buffer,
            max_buffered_messages: 1024,
            logon_reject_policy: LogonRejectPolicy::Reject,
            fatal_protocol_violations: false,
            validate_checksum: true,
            test_request_factor: 1.2,
            max_message_size: 1024 * 1024,
        }
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the accepted heartbeat interval bounds.
    #[must_use]
    pub fn with_heartbeat_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.min_heartbeat_interval = min;
        self.max_heartbeat_interval = max;
        self
    }

    /// Sets whether to reset sequence numbers on logon.
    #[must_use]
    pub const fn with_reset_on_logon(mut self, reset: bool) -> Self {
        self.reset_on_logon = reset;
        self
    }

    /// Sets the gap policy.
    #[must_use]
    pub const fn with_gap_policy(mut self, policy: GapPolicy) -> Self {
        self.gap_policy = policy;
        self
    }

    /// Sets the maximum number of buffered messages during a gap.
    #[must_use]
    pub const fn with_max_buffered_messages(mut self, max: usize) -> Self {
        self.max_buffered_messages = max;
        self
    }

    /// Sets the logon reject policy.
    #[must_use]
    pub const fn with_logon_reject_policy(mut self, policy: LogonRejectPolicy) -> Self {
        self.logon_reject_policy = policy;
        self
    }

    /// Sets whether malformed messages are fatal.
    #[must_use]
    pub const fn with_fatal_protocol_violations(mut self, fatal: bool) -> Self {
        self.fatal_protocol_violations = fatal;
        self
    }

    /// Sets whether to validate checksums.
    #[must_use]
    pub const fn with_checksum_validation(mut self, validate: bool) -> Self {
        self.validate_checksum = validate;
        self
    }

    /// Sets the logon timeout.
    #[must_use]
    pub fn with_logon_timeout(mut self, timeout: Duration) -> Self {
        self.logon_timeout = timeout;
        self
    }

    /// Sets the logout timeout.
    #[must_use]
    pub fn with_logout_timeout(mut self, timeout: Duration) -> Self {
        self.logout_timeout = timeout;
        self
    }

    /// Sets the local sub ID.
    #[must_use]
    pub fn with_local_sub_id(mut self, sub_id: CompId) -> Self {
        self.local_sub_id = Some(sub_id);
        self
    }

    /// Returns the heartbeat interval in seconds.
    #[must_use]
    pub fn heartbeat_interval_secs(&self) -> u64 {
        self.heartbeat_interval.as_secs()
    }

    /// Checks that a counterparty's requested heartbeat interval is acceptable.
    #[must_use]
    pub fn accepts_heartbeat_interval(&self, secs: u64) -> bool {
        let requested = Duration::from_secs(secs);
        requested >= self.min_heartbeat_interval && requested <= self.max_heartbeat_interval
    }

    /// Validates internal consistency.
    ///
    /// # Errors
    /// Returns `SessionError::Configuration` describing the first problem found.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.local_comp_id.is_empty() {
            return Err(SessionError::Configuration(
                "local_comp_id must not be empty".to_string(),
            ));
        }
        if self.min_heartbeat_interval > self.max_heartbeat_interval {
            return Err(SessionError::Configuration(
                "min_heartbeat_interval exceeds max_heartbeat_interval".to_string(),
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(SessionError::Configuration(
                "heartbeat_interval must be positive".to_string(),
            ));
        }
        if self.test_request_factor < 1.0 {
            return Err(SessionError::Configuration(
                "test_request_factor must be at least 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for session configuration.
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    local_comp_id: Option<CompId>,
    begin_string: Option<String>,
    heartbeat_interval: Option<Duration>,
    reset_on_logon: bool,
    gap_policy: Option<GapPolicy>,
    max_buffered_messages: Option<usize>,
    logon_reject_policy: Option<LogonRejectPolicy>,
    validate_checksum: Option<bool>,
}

impl SessionConfigBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the local CompID.
    #[must_use]
    pub fn local_comp_id(mut self, id: CompId) -> Self {
        self.local_comp_id = Some(id);
        self
    }

    /// Sets the FIX version.
    #[must_use]
    pub fn begin_string(mut self, version: impl Into<String>) -> Self {
        self.begin_string = Some(version.into());
        self
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Sets whether to reset on logon.
    #[must_use]
    pub const fn reset_on_logon(mut self, reset: bool) -> Self {
        self.reset_on_logon = reset;
        self
    }

    /// Sets the gap policy.
    #[must_use]
    pub const fn gap_policy(mut self, policy: GapPolicy) -> Self {
        self.gap_policy = Some(policy);
        self
    }

    /// Sets the maximum number of buffered messages during a gap.
    #[must_use]
    pub const fn max_buffered_messages(mut self, max: usize) -> Self {
        self.max_buffered_messages = Some(max);
        self
    }

    /// Sets the logon reject policy.
    #[must_use]
    pub const fn logon_reject_policy(mut self, policy: LogonRejectPolicy) -> Self {
        self.logon_reject_policy = Some(policy);
        self
    }

    /// Sets checksum validation.
    #[must_use]
    pub const fn validate_checksum(mut self, validate: bool) -> Self {
        self.validate_checksum = Some(validate);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    /// Returns `SessionError::Configuration` if the local CompID is missing or
    /// the result is inconsistent.
    pub fn build(self) -> Result<SessionConfig, SessionError> {
        let local = self
            .local_comp_id
            .ok_or_else(|| SessionError::Configuration("local_comp_id is required".to_string()))?;
        let begin_string = self.begin_string.unwrap_or_else(|| "FIX.4.4".to_string());

        let mut config = SessionConfig::new(local, begin_string);
        if let Some(interval) = self.heartbeat_interval {
            config.heartbeat_interval = interval;
        }
        config.reset_on_logon = self.reset_on_logon;
        if let Some(policy) = self.gap_policy {
            config.gap_policy = policy;
        }
        if let Some(max) = self.max_buffered_messages {
            config.max_buffered_messages = max;
        }
        if let Some(policy) = self.logon_reject_policy {
            config.logon_reject_policy = policy;
        }
        if let Some(validate) = self.validate_checksum {
            config.validate_checksum = validate;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_new() {
        let config = SessionConfig::new(CompId::new("ACCEPTOR").unwrap(), "FIX.4.4");

        assert_eq!(config.local_comp_id.as_str(), "ACCEPTOR");
        assert_eq!(config.begin_string, "FIX.4.4");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.gap_policy, GapPolicy::Buffer);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_session_config_builder() {
        let config = SessionConfigBuilder::new()
            .local_comp_id(CompId::new("ACCEPTOR").unwrap())
            .begin_string("FIX.4.2")
            .heartbeat_interval(Duration::from_secs(60))
            .reset_on_logon(true)
            .gap_policy(GapPolicy::Drop)
            .build()
            .unwrap();

        assert_eq!(config.begin_string, "FIX.4.2");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(60));
        assert!(config.reset_on_logon);
        assert_eq!(config.gap_policy, GapPolicy::Drop);
    }

    #[test]
    fn test_builder_requires_comp_id() {
        assert!(matches!(
            SessionConfigBuilder::new().build(),
            Err(SessionError::Configuration(_))
        ));
    }

    #[test]
    fn test_heartbeat_bounds() {
        let config = SessionConfig::new(CompId::new("ACCEPTOR").unwrap(), "FIX.4.4")
            .with_heartbeat_bounds(Duration::from_secs(5), Duration::from_secs(60));
        assert!(config.accepts_heartbeat_interval(30));
        assert!(!config.accepts_heartbeat_interval(1));
        assert!(!config.accepts_heartbeat_interval(61));
    }
}
