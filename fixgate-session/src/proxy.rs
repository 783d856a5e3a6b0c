/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Session message composition.
//!
//! A [`SessionProxy`] builds exactly one well-formed session-level message per
//! call into its scratch buffer, stamps the header through the identity
//! strategy and the injected clock, and hands the frame to the publication.
//! Back pressure is returned, never retried internally.

use crate::identity::CompositeKey;
use crate::state::DisconnectReason;
use fixgate_core::error::PublishError;
use fixgate_core::message::MsgType;
use fixgate_core::types::{ConnectionId, Position, SessionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol-neutral writer for business message bodies.
///
/// The tag=value proxy writes `tag=value` fields; the binary proxy writes TLVs.
pub trait BodyWriter {
    /// Writes a string field.
    fn put_str(&mut self, tag: u32, value: &str);
    /// Writes an unsigned integer field.
    fn put_uint(&mut self, tag: u32, value: u64);
    /// Writes a signed integer field.
    fn put_int(&mut self, tag: u32, value: i64);
    /// Writes a boolean field.
    fn put_bool(&mut self, tag: u32, value: bool);
    /// Writes a single character field.
    fn put_char(&mut self, tag: u32, value: char);
    /// Writes raw bytes.
    fn put_raw(&mut self, tag: u32, value: &[u8]);
}

/// Reason attached to a session-level Reject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectReason {
    /// SessionRejectReason(373).
    pub code: u32,
    /// Text(58).
    pub text: String,
    /// RefTagID(371).
    pub ref_tag: Option<u32>,
}

impl RejectReason {
    /// Invalid tag number.
    pub const INVALID_TAG: u32 = 0;
    /// Required tag missing.
    pub const REQUIRED_TAG_MISSING: u32 = 1;
    /// Value is incorrect (out of range) for this tag.
    pub const VALUE_INCORRECT: u32 = 5;
    /// CompID problem.
    pub const COMP_ID_PROBLEM: u32 = 9;
    /// SendingTime accuracy problem.
    pub const SENDING_TIME_ACCURACY: u32 = 10;
    /// Invalid MsgType.
    pub const INVALID_MSG_TYPE: u32 = 11;
    /// Other.
    pub const OTHER: u32 = 99;

    /// Creates a reason.
    #[must_use]
    pub fn new(code: u32, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
            ref_tag: None,
        }
    }

    /// Value out of range, e.g. a heartbeat interval outside the accepted bounds.
    #[must_use]
    pub fn value_incorrect(text: impl Into<String>) -> Self {
        Self::new(Self::VALUE_INCORRECT, text)
    }

    /// CompID problem.
    #[must_use]
    pub fn comp_id_problem(text: impl Into<String>) -> Self {
        Self::new(Self::COMP_ID_PROBLEM, text)
    }

    /// Required tag missing.
    #[must_use]
    pub fn required_tag_missing(tag: u32) -> Self {
        Self::new(Self::REQUIRED_TAG_MISSING, format!("required tag {tag} missing"))
            .with_ref_tag(tag)
    }

    /// Any other problem.
    #[must_use]
    pub fn other(text: impl Into<String>) -> Self {
        Self::new(Self::OTHER, text)
    }

    /// Sets RefTagID.
    #[must_use]
    pub const fn with_ref_tag(mut self, tag: u32) -> Self {
        self.ref_tag = Some(tag);
        self
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.text, self.code)
    }
}

/// Encodes and publishes session-level messages.
///
/// Every method overwrites the proxy's scratch buffer and returns the position
/// assigned by the publication.
pub trait SessionProxy: Send {
    /// Binds a session id to the composite key used to stamp its headers.
    fn set_session(&mut self, session_id: SessionId, key: CompositeKey);

    /// Sends Logon carrying HeartBtInt.
    ///
    /// # Errors
    /// Returns `PublishError` if the frame was not published.
    fn logon(
        &mut self,
        heartbeat_interval_secs: u64,
        msg_seq_no: u64,
        session_id: SessionId,
        reset_seq_num: bool,
    ) -> Result<Position, PublishError>;

    /// Sends Logout without a body.
    ///
    /// # Errors
    /// Returns `PublishError` if the frame was not published.
    fn logout(&mut self, msg_seq_no: u64, session_id: SessionId) -> Result<Position, PublishError>;

    /// Sends Logout carrying Text.
    ///
    /// # Errors
    /// Returns `PublishError` if the frame was not published.
    fn logout_with_reason(
        &mut self,
        msg_seq_no: u64,
        session_id: SessionId,
        text: &str,
    ) -> Result<Position, PublishError>;

    /// Sends Heartbeat, echoing TestReqID when answering a TestRequest.
    ///
    /// # Errors
    /// Returns `PublishError` if the frame was not published.
    fn heartbeat(
        &mut self,
        test_req_id: Option<&str>,
        msg_seq_no: u64,
        session_id: SessionId,
    ) -> Result<Position, PublishError>;

    /// Sends TestRequest.
    ///
    /// # Errors
    /// Returns `PublishError` if the frame was not published.
    fn test_request(
        &mut self,
        test_req_id: &str,
        msg_seq_no: u64,
        session_id: SessionId,
    ) -> Result<Position, PublishError>;

    /// Sends ResendRequest for `[begin, end]`; `end == 0` means through current.
    ///
    /// # Errors
    /// Returns `PublishError` if the frame was not published.
    fn resend_request(
        &mut self,
        msg_seq_no: u64,
        begin: u64,
        end: u64,
        session_id: SessionId,
    ) -> Result<Position, PublishError>;

    /// Sends a session-level Reject.
    ///
    /// # Errors
    /// Returns `PublishError` if the frame was not published.
    fn reject(
        &mut self,
        msg_seq_no: u64,
        ref_seq_num: u64,
        session_id: SessionId,
        reason: &RejectReason,
    ) -> Result<Position, PublishError>;

    /// Sends SequenceReset, in gap-fill mode when `gap_fill` is set.
    ///
    /// # Errors
    /// Returns `PublishError` if the frame was not published.
    fn sequence_reset(
        &mut self,
        msg_seq_no: u64,
        new_seq_no: u64,
        gap_fill: bool,
        session_id: SessionId,
    ) -> Result<Position, PublishError>;

    /// Sends a business message whose body is written by `body`.
    ///
    /// # Errors
    /// Returns `PublishError` if the frame was not published.
    fn application(
        &mut self,
        msg_type: &MsgType,
        msg_seq_no: u64,
        session_id: SessionId,
        body: &dyn Fn(&mut dyn BodyWriter),
    ) -> Result<Position, PublishError>;

    /// Re-sends a previously sent business message as a possible duplicate.
    ///
    /// # Errors
    /// Returns `PublishError` if the frame was not published or the original
    /// cannot be decoded.
    fn resend(&mut self, original: &[u8], session_id: SessionId)
    -> Result<Position, PublishError>;

    /// Asks the transport to close `connection_id`.
    ///
    /// # Errors
    /// Returns `PublishError` if the request was not published.
    fn disconnect(
        &mut self,
        connection_id: ConnectionId,
        reason: &DisconnectReason,
    ) -> Result<Position, PublishError>;

    /// Returns the most recently built frame.
    fn last_frame(&self) -> &[u8];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_reason_constructors() {
        let reason = RejectReason::value_incorrect("bad interval");
        assert_eq!(reason.code, 5);
        assert!(reason.ref_tag.is_none());

        let missing = RejectReason::required_tag_missing(108);
        assert_eq!(missing.code, RejectReason::REQUIRED_TAG_MISSING);
        assert_eq!(missing.ref_tag, Some(108));
        assert_eq!(missing.to_string(), "required tag 108 missing (1)");
    }
}
