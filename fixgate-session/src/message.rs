/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Protocol-neutral session messages.
//!
//! Every [`crate::protocol::SessionParser`] turns its wire format into a
//! [`SessionMessage`], so the state machine never sees tag numbers or
//! template ids.

use fixgate_core::message::{MsgType, OwnedMessage};
use fixgate_core::types::CompId;

/// Standard header fields the session layer cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionHeader {
    /// Message type.
    pub msg_type: MsgType,
    /// MsgSeqNum.
    pub msg_seq_num: u64,
    /// PossDupFlag.
    pub poss_dup: bool,
    /// SenderCompID of the message.
    pub sender_comp_id: Option<CompId>,
    /// TargetCompID of the message.
    pub target_comp_id: Option<CompId>,
    /// SenderSubID of the message.
    pub sender_sub_id: Option<CompId>,
    /// TargetSubID of the message.
    pub target_sub_id: Option<CompId>,
}

impl SessionHeader {
    /// Creates a header with the given type and sequence number.
    #[must_use]
    pub fn new(msg_type: MsgType, msg_seq_num: u64) -> Self {
        Self {
            msg_type,
            msg_seq_num,
            ..Self::default()
        }
    }

    /// Sets the comp ids.
    #[must_use]
    pub fn with_comp_ids(mut self, sender: CompId, target: CompId) -> Self {
        self.sender_comp_id = Some(sender);
        self.target_comp_id = Some(target);
        self
    }

    /// Sets PossDupFlag.
    #[must_use]
    pub const fn with_poss_dup(mut self, poss_dup: bool) -> Self {
        self.poss_dup = poss_dup;
        self
    }
}

/// Decoded message handed to the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMessage {
    /// Header.
    pub header: SessionHeader,
    /// Type-specific content.
    pub kind: SessionMessageKind,
}

impl SessionMessage {
    /// Creates a message.
    #[must_use]
    pub const fn new(header: SessionHeader, kind: SessionMessageKind) -> Self {
        Self { header, kind }
    }

    /// Returns the MsgSeqNum.
    #[inline]
    #[must_use]
    pub const fn seq_num(&self) -> u64 {
        self.header.msg_seq_num
    }

    /// Returns true if PossDupFlag is set.
    #[inline]
    #[must_use]
    pub const fn is_poss_dup(&self) -> bool {
        self.header.poss_dup
    }

    /// Returns true for Logon.
    #[must_use]
    pub const fn is_logon(&self) -> bool {
        matches!(self.kind, SessionMessageKind::Logon { .. })
    }
}

/// Type-specific content of a [`SessionMessage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionMessageKind {
    /// Logon (A) / Establish.
    Logon {
        /// HeartBtInt(108) in seconds.
        heartbeat_interval_secs: u64,
        /// ResetSeqNumFlag(141).
        reset_seq_num: bool,
        /// Username(553).
        username: Option<String>,
        /// Password(554).
        password: Option<String>,
    },
    /// Logout (5) / Terminate.
    Logout {
        /// Text(58).
        text: Option<String>,
    },
    /// Heartbeat (0) / Sequence.
    Heartbeat {
        /// TestReqID(112) being answered.
        test_req_id: Option<String>,
    },
    /// TestRequest (1).
    TestRequest {
        /// TestReqID(112).
        test_req_id: String,
    },
    /// ResendRequest (2) / RetransmitRequest.
    ResendRequest {
        /// BeginSeqNo(7).
        begin: u64,
        /// EndSeqNo(16), 0 for open ended.
        end: u64,
    },
    /// Reject (3) / NotApplied.
    Reject {
        /// RefSeqNum(45).
        ref_seq_num: u64,
        /// SessionRejectReason(373).
        reason: Option<u32>,
        /// Text(58).
        text: Option<String>,
    },
    /// SequenceReset (4).
    SequenceReset {
        /// NewSeqNo(36).
        new_seq_no: u64,
        /// GapFillFlag(123).
        gap_fill: bool,
    },
    /// Any business message.
    Application(OwnedMessage),
}
