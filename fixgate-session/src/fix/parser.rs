/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Tag=value session message parser.

use crate::message::{SessionHeader, SessionMessage, SessionMessageKind};
use crate::protocol::SessionParser;
use fixgate_core::error::DecodeError;
use fixgate_core::field::tags;
use fixgate_core::message::{MsgType, RawMessage};
use fixgate_core::types::{CompId, SessionId};
use fixgate_tagvalue::Decoder;
use tracing::debug;

/// Parses tag=value frames into [`SessionMessage`]s.
#[derive(Debug)]
pub struct FixParser {
    session_id: SessionId,
    validate_checksum: bool,
}

impl FixParser {
    /// Creates a parser.
    #[must_use]
    pub const fn new(session_id: SessionId, validate_checksum: bool) -> Self {
        Self {
            session_id,
            validate_checksum,
        }
    }
}

impl SessionParser for FixParser {
    fn parse(&mut self, frame: &[u8]) -> Result<SessionMessage, DecodeError> {
        let raw = Decoder::new(frame)
            .with_checksum_validation(self.validate_checksum)
            .decode()
            .inspect_err(|e| {
                debug!(session_id = %self.session_id, error = %e, "failed to decode frame");
            })?;
        parse_raw(&raw)
    }
}

fn parse_raw(raw: &RawMessage<'_>) -> Result<SessionMessage, DecodeError> {
    let header = parse_header(raw)?;

    let kind = match raw.msg_type() {
        MsgType::Logon => SessionMessageKind::Logon {
            heartbeat_interval_secs: raw.get_field_as(tags::HEART_BT_INT)?,
            reset_seq_num: flag(raw, tags::RESET_SEQ_NUM_FLAG)?,
            username: optional_string(raw, tags::USERNAME),
            password: optional_string(raw, tags::PASSWORD),
        },
        MsgType::Logout => SessionMessageKind::Logout {
            text: optional_string(raw, tags::TEXT),
        },
        MsgType::Heartbeat => SessionMessageKind::Heartbeat {
            test_req_id: optional_string(raw, tags::TEST_REQ_ID),
        },
        MsgType::TestRequest => SessionMessageKind::TestRequest {
            test_req_id: raw.get_field_as(tags::TEST_REQ_ID)?,
        },
        MsgType::ResendRequest => SessionMessageKind::ResendRequest {
            begin: raw.get_field_as(tags::BEGIN_SEQ_NO)?,
            end: raw.get_field_as(tags::END_SEQ_NO)?,
        },
        MsgType::Reject => SessionMessageKind::Reject {
            ref_seq_num: raw.get_field_as(tags::REF_SEQ_NUM)?,
            reason: raw
                .get_field(tags::SESSION_REJECT_REASON)
                .map(|f| f.parse())
                .transpose()?,
            text: optional_string(raw, tags::TEXT),
        },
        MsgType::SequenceReset => SessionMessageKind::SequenceReset {
            new_seq_no: raw.get_field_as(tags::NEW_SEQ_NO)?,
            gap_fill: flag(raw, tags::GAP_FILL_FLAG)?,
        },
        _ => SessionMessageKind::Application(raw.to_owned()),
    };

    Ok(SessionMessage::new(header, kind))
}

fn parse_header(raw: &RawMessage<'_>) -> Result<SessionHeader, DecodeError> {
    Ok(SessionHeader {
        msg_type: raw.msg_type().clone(),
        msg_seq_num: raw.get_field_as(tags::MSG_SEQ_NUM)?,
        poss_dup: flag(raw, tags::POSS_DUP_FLAG)?,
        sender_comp_id: comp_id(raw, tags::SENDER_COMP_ID)?,
        target_comp_id: comp_id(raw, tags::TARGET_COMP_ID)?,
        sender_sub_id: comp_id(raw, tags::SENDER_SUB_ID)?,
        target_sub_id: comp_id(raw, tags::TARGET_SUB_ID)?,
    })
}

fn flag(raw: &RawMessage<'_>, tag: u32) -> Result<bool, DecodeError> {
    raw.get_field(tag).map_or(Ok(false), |f| f.as_bool())
}

fn optional_string(raw: &RawMessage<'_>, tag: u32) -> Option<String> {
    raw.get_field_str(tag).map(String::from)
}

fn comp_id(raw: &RawMessage<'_>, tag: u32) -> Result<Option<CompId>, DecodeError> {
    let Some(field) = raw.get_field(tag) else {
        return Ok(None);
    };
    CompId::new(field.as_str()?)
        .map(Some)
        .ok_or_else(|| DecodeError::InvalidFieldValue {
            tag,
            reason: "comp id too long".to_string(),
        })
}
