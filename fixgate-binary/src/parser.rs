/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Binary session message parser.

use crate::codec::BinaryFrame;
use crate::error::BinaryError;
use crate::layout::Template;
use bytes::Bytes;
use fixgate_core::error::DecodeError;
use fixgate_core::field::tags;
use fixgate_core::message::{MsgType, OwnedMessage};
use fixgate_core::types::{CompId, SessionId};
use fixgate_session::message::{SessionHeader, SessionMessage, SessionMessageKind};
use fixgate_session::protocol::SessionParser;
use smallvec::SmallVec;
use std::ops::Range;
use tracing::debug;

/// NotApplied reason value meaning "no reason given".
pub const NO_REJECT_REASON: u32 = u32::MAX;

/// Parses binary frames into [`SessionMessage`]s.
#[derive(Debug)]
pub struct BinaryParser {
    session_id: SessionId,
}

impl BinaryParser {
    /// Creates a parser.
    #[must_use]
    pub const fn new(session_id: SessionId) -> Self {
        Self { session_id }
    }
}

impl SessionParser for BinaryParser {
    fn parse(&mut self, frame: &[u8]) -> Result<SessionMessage, DecodeError> {
        parse_frame(frame).map_err(|e| {
            debug!(session_id = %self.session_id, error = %e, "failed to decode binary frame");
            DecodeError::from(e)
        })
    }
}

/// Returns the message type of a validated frame.
///
/// # Errors
/// Returns `BinaryError` if a custom business frame lacks its MsgType TLV.
pub fn frame_msg_type(frame: &BinaryFrame<'_>) -> Result<MsgType, BinaryError> {
    if let Some(msg_type) = frame.template().msg_type() {
        return Ok(msg_type);
    }
    let value = frame
        .tlv_str(tags::MSG_TYPE as u16)?
        .ok_or(BinaryError::MissingField(tags::MSG_TYPE as u16))?;
    match value.parse() {
        Ok(msg_type) => Ok(msg_type),
        Err(never) => match never {},
    }
}

fn parse_frame(buf: &[u8]) -> Result<SessionMessage, BinaryError> {
    let frame = BinaryFrame::parse(buf)?;
    let header = SessionHeader {
        msg_type: frame_msg_type(&frame)?,
        msg_seq_num: frame.msg_seq_num(),
        poss_dup: frame.poss_dup(),
        sender_comp_id: comp_id(&frame, tags::SENDER_COMP_ID)?,
        target_comp_id: comp_id(&frame, tags::TARGET_COMP_ID)?,
        sender_sub_id: comp_id(&frame, tags::SENDER_SUB_ID)?,
        target_sub_id: comp_id(&frame, tags::TARGET_SUB_ID)?,
    };

    let kind = match frame.template() {
        Template::Establish => SessionMessageKind::Logon {
            heartbeat_interval_secs: u64::from(frame.fixed_u32(0)),
            reset_seq_num: frame.fixed_u8(4) != 0,
            username: string(&frame, tags::USERNAME)?,
            password: string(&frame, tags::PASSWORD)?,
        },
        Template::Terminate => SessionMessageKind::Logout {
            text: string(&frame, tags::TEXT)?,
        },
        Template::Sequence => SessionMessageKind::Heartbeat {
            test_req_id: string(&frame, tags::TEST_REQ_ID)?,
        },
        Template::TestRequest => SessionMessageKind::TestRequest {
            test_req_id: string(&frame, tags::TEST_REQ_ID)?
                .ok_or(BinaryError::MissingField(tags::TEST_REQ_ID as u16))?,
        },
        Template::RetransmitRequest => SessionMessageKind::ResendRequest {
            begin: frame.fixed_u64(0),
            end: frame.fixed_u64(8),
        },
        Template::NotApplied => {
            let reason = frame.fixed_u32(8);
            SessionMessageKind::Reject {
                ref_seq_num: frame.fixed_u64(0),
                reason: (reason != NO_REJECT_REASON).then_some(reason),
                text: string(&frame, tags::TEXT)?,
            }
        }
        Template::SequenceReset => SessionMessageKind::SequenceReset {
            new_seq_no: frame.fixed_u64(0),
            gap_fill: frame.fixed_u8(8) != 0,
        },
        Template::Business(_) => {
            SessionMessageKind::Application(business_message(&frame, header.msg_type.clone())?)
        }
    };

    Ok(SessionMessage::new(header, kind))
}

fn business_message(frame: &BinaryFrame<'_>, msg_type: MsgType) -> Result<OwnedMessage, BinaryError> {
    let mut fields: SmallVec<[(u32, Range<usize>); 16]> = SmallVec::new();
    for tlv in frame.tlvs() {
        let tlv = tlv?;
        fields.push((u32::from(tlv.tag), tlv.range()));
    }
    Ok(OwnedMessage::new(
        Bytes::copy_from_slice(frame.as_bytes()),
        msg_type,
        fields.into_vec(),
    ))
}

fn string(frame: &BinaryFrame<'_>, tag: u32) -> Result<Option<String>, BinaryError> {
    Ok(frame.tlv_str(tag as u16)?.map(String::from))
}

fn comp_id(frame: &BinaryFrame<'_>, tag: u32) -> Result<Option<CompId>, BinaryError> {
    let Some(value) = frame.tlv_str(tag as u16)? else {
        return Ok(None);
    };
    CompId::new(value)
        .map(Some)
        .ok_or_else(|| BinaryError::InvalidValue {
            tag: tag as u16,
            reason: "comp id too long".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BinaryEncoder, CommonBlock};
    use bytes::BytesMut;
    use fixgate_session::proxy::BodyWriter;

    fn encode(template: Template, seq: u64, write: impl FnOnce(&mut BinaryEncoder<'_>)) -> Vec<u8> {
        let mut buf = BytesMut::new();
        let common = CommonBlock {
            msg_seq_num: seq,
            sending_time: 5,
            session_id: 1,
            poss_dup: false,
        };
        let mut encoder = BinaryEncoder::new(&mut buf, template, &common);
        write(&mut encoder);
        let range = encoder.finish().unwrap();
        buf[range].to_vec()
    }

    fn parser() -> BinaryParser {
        BinaryParser::new(SessionId::new(1))
    }

    #[test]
    fn test_parse_establish() {
        let frame = encode(Template::Establish, 1, |e| {
            e.put_fixed_u32(30);
            e.put_fixed_u8(1);
            e.put_str(49, "CLIENT");
            e.put_str(56, "GW");
            e.put_str(553, "trader");
        });

        let msg = parser().parse(&frame).unwrap();
        assert_eq!(msg.header.msg_type, MsgType::Logon);
        assert_eq!(msg.header.sender_comp_id, CompId::new("CLIENT"));
        assert_eq!(msg.header.target_comp_id, CompId::new("GW"));
        assert_eq!(
            msg.kind,
            SessionMessageKind::Logon {
                heartbeat_interval_secs: 30,
                reset_seq_num: true,
                username: Some("trader".to_string()),
                password: None,
            }
        );
    }

    #[test]
    fn test_parse_session_templates() {
        let retransmit = encode(Template::RetransmitRequest, 4, |e| {
            e.put_fixed_u64(2);
            e.put_fixed_u64(0);
        });
        assert_eq!(
            parser().parse(&retransmit).unwrap().kind,
            SessionMessageKind::ResendRequest { begin: 2, end: 0 }
        );

        let reset = encode(Template::SequenceReset, 5, |e| {
            e.put_fixed_u64(9);
            e.put_fixed_u8(1);
        });
        assert_eq!(
            parser().parse(&reset).unwrap().kind,
            SessionMessageKind::SequenceReset {
                new_seq_no: 9,
                gap_fill: true
            }
        );

        let reject = encode(Template::NotApplied, 6, |e| {
            e.put_fixed_u64(3);
            e.put_fixed_u32(NO_REJECT_REASON);
        });
        assert_eq!(
            parser().parse(&reject).unwrap().kind,
            SessionMessageKind::Reject {
                ref_seq_num: 3,
                reason: None,
                text: None
            }
        );

        let test_request = encode(Template::TestRequest, 7, |_| {});
        assert_eq!(
            parser().parse(&test_request).err(),
            Some(DecodeError::MissingRequiredField { tag: 112 })
        );
    }

    #[test]
    fn test_parse_business_message() {
        let frame = encode(Template::Business(100), 8, |e| {
            e.put_str(11, "ORD-1");
            e.put_uint(38, 100);
        });

        let msg = parser().parse(&frame).unwrap();
        assert_eq!(msg.seq_num(), 8);
        let SessionMessageKind::Application(app) = msg.kind else {
            panic!("expected application message");
        };
        assert_eq!(app.msg_type(), &MsgType::NewOrderSingle);
        assert_eq!(app.get_field_str(11), Some("ORD-1"));
        assert_eq!(app.get_field_u64(38), Some(100));
    }

    #[test]
    fn test_custom_business_type_travels_in_tlv() {
        let frame = encode(Template::Business(199), 2, |e| e.put_str(35, "UX"));
        let msg = parser().parse(&frame).unwrap();
        assert_eq!(msg.header.msg_type, MsgType::Custom("UX".to_string()));

        let missing = encode(Template::Business(199), 3, |_| {});
        assert!(parser().parse(&missing).is_err());
    }
}
