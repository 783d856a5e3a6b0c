/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Frame layout of the Binary Entry Point protocol.
//!
//! ```text
//! +------------------+----------------------------+-----------------------------+
//! | SOFH (6, BE)     | SBE header (8, LE)         | root block (LE)             |
//! | length u32       | block_length u16           | msg_seq_num u64             |
//! | encoding u16     | template_id u16            | sending_time u64 (epoch ns) |
//! |                  | schema_id u16 = 1          | session_id u64              |
//! |                  | version u16 = 0            | poss_dup u8                 |
//! |                  |                            | template fields...          |
//! +------------------+----------------------------+-----------------------------+
//! | TLVs: tag u16 | len u16 | value, repeated until the end of the frame        |
//! +-----------------------------------------------------------------------------+
//! ```
//!
//! The SOFH length covers the whole frame including the SOFH itself.

use fixgate_core::message::MsgType;

/// SOFH encoding type for little endian SBE.
pub const ENCODING_TYPE: u16 = 0xEB50;
/// Schema id of the session templates.
pub const SCHEMA_ID: u16 = 1;
/// Schema version.
pub const SCHEMA_VERSION: u16 = 0;

/// SOFH length in bytes.
pub const SOFH_LEN: usize = 6;
/// SBE message header length in bytes.
pub const SBE_HEADER_LEN: usize = 8;
/// Offset of the root block.
pub const BLOCK_OFFSET: usize = SOFH_LEN + SBE_HEADER_LEN;
/// Length of the fields every template starts with.
pub const COMMON_BLOCK_LEN: usize = 25;

/// Offset of MsgSeqNum.
pub const SEQ_NUM_OFFSET: usize = BLOCK_OFFSET;
/// Offset of SendingTime.
pub const SENDING_TIME_OFFSET: usize = SEQ_NUM_OFFSET + 8;
/// Offset of the session id.
pub const SESSION_ID_OFFSET: usize = SENDING_TIME_OFFSET + 8;
/// Offset of PossDupFlag.
pub const POSS_DUP_OFFSET: usize = SESSION_ID_OFFSET + 8;
/// Offset of the first template-specific field.
pub const FIXED_OFFSET: usize = POSS_DUP_OFFSET + 1;

/// TLV header length in bytes.
pub const TLV_HEADER_LEN: usize = 4;

/// Template id used for business messages without a dedicated template.
pub const CUSTOM_BUSINESS_TEMPLATE: u16 = 199;
/// First business template id.
pub const FIRST_BUSINESS_TEMPLATE: u16 = 100;

/// Message templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Template {
    /// Logon.
    Establish,
    /// Logout.
    Terminate,
    /// Session-level reject.
    NotApplied,
    /// Heartbeat.
    Sequence,
    /// Liveness probe.
    TestRequest,
    /// Resend request.
    RetransmitRequest,
    /// Sequence reset and gap fill.
    SequenceReset,
    /// Business message.
    Business(u16),
}

impl Template {
    /// Maps a template id.
    #[must_use]
    pub const fn from_id(id: u16) -> Option<Self> {
        match id {
            5 => Some(Self::Establish),
            7 => Some(Self::Terminate),
            8 => Some(Self::NotApplied),
            9 => Some(Self::Sequence),
            10 => Some(Self::TestRequest),
            12 => Some(Self::RetransmitRequest),
            13 => Some(Self::SequenceReset),
            id if id >= FIRST_BUSINESS_TEMPLATE => Some(Self::Business(id)),
            _ => None,
        }
    }

    /// Returns the template id.
    #[must_use]
    pub const fn id(self) -> u16 {
        match self {
            Self::Establish => 5,
            Self::Terminate => 7,
            Self::NotApplied => 8,
            Self::Sequence => 9,
            Self::TestRequest => 10,
            Self::RetransmitRequest => 12,
            Self::SequenceReset => 13,
            Self::Business(id) => id,
        }
    }

    /// Length of the template-specific fixed fields.
    #[must_use]
    pub const fn fixed_len(self) -> usize {
        match self {
            Self::Establish => 5,
            Self::NotApplied => 12,
            Self::RetransmitRequest => 16,
            Self::SequenceReset => 9,
            Self::Terminate | Self::Sequence | Self::TestRequest | Self::Business(_) => 0,
        }
    }

    /// Returns the template for a message type.
    #[must_use]
    pub fn for_msg_type(msg_type: &MsgType) -> Self {
        match msg_type {
            MsgType::Logon => Self::Establish,
            MsgType::Logout => Self::Terminate,
            MsgType::Reject => Self::NotApplied,
            MsgType::Heartbeat => Self::Sequence,
            MsgType::TestRequest => Self::TestRequest,
            MsgType::ResendRequest => Self::RetransmitRequest,
            MsgType::SequenceReset => Self::SequenceReset,
            MsgType::NewOrderSingle => Self::Business(100),
            MsgType::ExecutionReport => Self::Business(101),
            MsgType::OrderCancelRequest => Self::Business(102),
            MsgType::OrderCancelReplaceRequest => Self::Business(103),
            MsgType::OrderCancelReject => Self::Business(104),
            MsgType::BusinessMessageReject => Self::Business(105),
            MsgType::Custom(_) => Self::Business(CUSTOM_BUSINESS_TEMPLATE),
        }
    }

    /// Returns the message type, `None` for the custom business template
    /// whose type travels in a MsgType TLV.
    #[must_use]
    pub fn msg_type(self) -> Option<MsgType> {
        Some(match self {
            Self::Establish => MsgType::Logon,
            Self::Terminate => MsgType::Logout,
            Self::NotApplied => MsgType::Reject,
            Self::Sequence => MsgType::Heartbeat,
            Self::TestRequest => MsgType::TestRequest,
            Self::RetransmitRequest => MsgType::ResendRequest,
            Self::SequenceReset => MsgType::SequenceReset,
            Self::Business(100) => MsgType::NewOrderSingle,
            Self::Business(101) => MsgType::ExecutionReport,
            Self::Business(102) => MsgType::OrderCancelRequest,
            Self::Business(103) => MsgType::OrderCancelReplaceRequest,
            Self::Business(104) => MsgType::OrderCancelReject,
            Self::Business(105) => MsgType::BusinessMessageReject,
            Self::Business(_) => return None,
        })
    }

    /// Returns true for business templates.
    #[must_use]
    pub const fn is_business(self) -> bool {
        matches!(self, Self::Business(_))
    }
}

/// Reads the total frame length from a SOFH.
///
/// Returns `None` if fewer than [`SOFH_LEN`] bytes are available.
#[must_use]
pub fn frame_length(sofh: &[u8]) -> Option<usize> {
    let bytes: [u8; 4] = sofh.get(..4)?.try_into().ok()?;
    usize::try_from(u32::from_be_bytes(bytes)).ok()
}

/// Reads the SOFH encoding type.
#[must_use]
pub fn encoding_type(sofh: &[u8]) -> Option<u16> {
    let bytes: [u8; 2] = sofh.get(4..SOFH_LEN)?.try_into().ok()?;
    Some(u16::from_be_bytes(bytes))
}

#[inline]
pub(crate) fn read_u16(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes: [u8; 2] = buf.get(offset..offset + 2)?.try_into().ok()?;
    Some(u16::from_le_bytes(bytes))
}

#[inline]
pub(crate) fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes: [u8; 4] = buf.get(offset..offset + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

#[inline]
pub(crate) fn read_u64(buf: &[u8], offset: usize) -> Option<u64> {
    let bytes: [u8; 8] = buf.get(offset..offset + 8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}
