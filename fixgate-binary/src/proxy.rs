/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Binary session proxy.

use crate::codec::{BinaryEncoder, BinaryFrame, CommonBlock};
use crate::layout::{CUSTOM_BUSINESS_TEMPLATE, POSS_DUP_OFFSET, SENDING_TIME_OFFSET, Template};
use crate::parser::frame_msg_type;
use bytes::BufMut;
use fixgate_core::clock::EpochNanoClock;
use fixgate_core::error::PublishError;
use fixgate_core::field::tags;
use fixgate_core::message::MsgType;
use fixgate_core::types::{ConnectionId, Position, SessionId};
use fixgate_session::frame::FrameBuffer;
use fixgate_session::identity::{CompositeKey, SessionIdStrategy};
use fixgate_session::message::SessionHeader;
use fixgate_session::proxy::{BodyWriter, RejectReason, SessionProxy};
use fixgate_session::publication::Publication;
use fixgate_session::state::DisconnectReason;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds binary session messages into a single scratch buffer.
///
/// CompIDs travel only in Establish; every other template is bound to the
/// session by the connection it arrives on.
pub struct BinaryProxy {
    publication: Arc<dyn Publication>,
    clock: Arc<dyn EpochNanoClock>,
    identity: Arc<dyn SessionIdStrategy>,
    sessions: HashMap<SessionId, CompositeKey>,
    buffer: FrameBuffer,
}

impl BinaryProxy {
    /// Creates a proxy.
    #[must_use]
    pub fn new(
        publication: Arc<dyn Publication>,
        clock: Arc<dyn EpochNanoClock>,
        identity: Arc<dyn SessionIdStrategy>,
    ) -> Self {
        Self {
            publication,
            clock,
            identity,
            sessions: HashMap::new(),
            buffer: FrameBuffer::default(),
        }
    }

    fn send<F>(
        &mut self,
        msg_type: &MsgType,
        msg_seq_no: u64,
        session_id: SessionId,
        poss_dup: bool,
        body: F,
    ) -> Result<Position, PublishError>
    where
        F: FnOnce(&mut BinaryEncoder<'_>),
    {
        let template = Template::for_msg_type(msg_type);
        let common = CommonBlock {
            msg_seq_num: msg_seq_no,
            sending_time: self.clock.nanos(),
            session_id: session_id.value(),
            poss_dup,
        };

        let frame = self.buffer.build(|buf| {
            let mut encoder = BinaryEncoder::new(buf, template, &common);
            if template.id() == CUSTOM_BUSINESS_TEMPLATE {
                encoder.put_str(tags::MSG_TYPE, msg_type.as_str());
            }
            body(&mut encoder);
            encoder.finish()
        })?;

        self.publication.publish(frame, session_id, msg_type)
    }
}

impl SessionProxy for BinaryProxy {
    fn set_session(&mut self, session_id: SessionId, key: CompositeKey) {
        self.sessions.insert(session_id, key);
    }

    fn logon(
        &mut self,
        heartbeat_interval_secs: u64,
        msg_seq_no: u64,
        session_id: SessionId,
        reset_seq_num: bool,
    ) -> Result<Position, PublishError> {
        let mut header = SessionHeader::new(MsgType::Logon, msg_seq_no);
        if let Some(key) = self.sessions.get(&session_id) {
            self.identity.on_send(key, &mut header);
        }
        let interval = u32::try_from(heartbeat_interval_secs).unwrap_or(u32::MAX);

        self.send(&MsgType::Logon, msg_seq_no, session_id, false, |encoder| {
            encoder.put_fixed_u32(interval);
            encoder.put_fixed_u8(u8::from(reset_seq_num));
            let comp_ids = [
                (tags::SENDER_COMP_ID, header.sender_comp_id),
                (tags::TARGET_COMP_ID, header.target_comp_id),
                (tags::SENDER_SUB_ID, header.sender_sub_id),
                (tags::TARGET_SUB_ID, header.target_sub_id),
            ];
            for (tag, value) in comp_ids {
                if let Some(value) = value {
                    encoder.put_str(tag, value.as_str());
                }
            }
        })
    }

    fn logout(&mut self, msg_seq_no: u64, session_id: SessionId) -> Result<Position, PublishError> {
        self.send(&MsgType::Logout, msg_seq_no, session_id, false, |_| {})
    }

    fn logout_with_reason(
        &mut self,
        msg_seq_no: u64,
        session_id: SessionId,
        text: &str,
    ) -> Result<Position, PublishError> {
        self.send(&MsgType::Logout, msg_seq_no, session_id, false, |encoder| {
            encoder.put_str(tags::TEXT, text);
        })
    }

    fn heartbeat(
        &mut self,
        test_req_id: Option<&str>,
        msg_seq_no: u64,
        session_id: SessionId,
    ) -> Result<Position, PublishError> {
        self.send(&MsgType::Heartbeat, msg_seq_no, session_id, false, |encoder| {
            if let Some(id) = test_req_id {
                encoder.put_str(tags::TEST_REQ_ID, id);
            }
        })
    }

    fn test_request(
        &mut self,
        test_req_id: &str,
        msg_seq_no: u64,
        session_id: SessionId,
    ) -> Result<Position, PublishError> {
        self.send(&MsgType::TestRequest, msg_seq_no, session_id, false, |encoder| {
            encoder.put_str(tags::TEST_REQ_ID, test_req_id);
        })
    }

    fn resend_request(
        &mut self,
        msg_seq_no: u64,
        begin: u64,
        end: u64,
        session_id: SessionId,
    ) -> Result<Position, PublishError> {
        self.send(&MsgType::ResendRequest, msg_seq_no, session_id, false, |encoder| {
            encoder.put_fixed_u64(begin);
            encoder.put_fixed_u64(end);
        })
    }

    fn reject(
        &mut self,
        msg_seq_no: u64,
        ref_seq_num: u64,
        session_id: SessionId,
        reason: &RejectReason,
    ) -> Result<Position, PublishError> {
        self.send(&MsgType::Reject, msg_seq_no, session_id, false, |encoder| {
            encoder.put_fixed_u64(ref_seq_num);
            encoder.put_fixed_u32(reason.code);
            if let Some(ref_tag) = reason.ref_tag {
                encoder.put_uint(tags::REF_TAG_ID, u64::from(ref_tag));
            }
            if !reason.text.is_empty() {
                encoder.put_str(tags::TEXT, &reason.text);
            }
        })
    }

    fn sequence_reset(
        &mut self,
        msg_seq_no: u64,
        new_seq_no: u64,
        gap_fill: bool,
        session_id: SessionId,
    ) -> Result<Position, PublishError> {
        self.send(&MsgType::SequenceReset, msg_seq_no, session_id, gap_fill, |encoder| {
            encoder.put_fixed_u64(new_seq_no);
            encoder.put_fixed_u8(u8::from(gap_fill));
        })
    }

    fn application(
        &mut self,
        msg_type: &MsgType,
        msg_seq_no: u64,
        session_id: SessionId,
        body: &dyn Fn(&mut dyn BodyWriter),
    ) -> Result<Position, PublishError> {
        self.send(msg_type, msg_seq_no, session_id, false, |encoder| body(encoder))
    }

    /// Copies the stored frame, raising PossDupFlag and restamping SendingTime.
    fn resend(&mut self, original: &[u8], session_id: SessionId) -> Result<Position, PublishError> {
        let frame = BinaryFrame::parse(original).map_err(|e| PublishError::Malformed(e.to_string()))?;
        let msg_type = frame_msg_type(&frame).map_err(|e| PublishError::Malformed(e.to_string()))?;
        let sending_time = self.clock.nanos();

        let frame = self.buffer.build(|buf| {
            buf.clear();
            buf.put_slice(original);
            buf[POSS_DUP_OFFSET] = 1;
            buf[SENDING_TIME_OFFSET..SENDING_TIME_OFFSET + 8]
                .copy_from_slice(&sending_time.to_le_bytes());
            Ok(0..buf.len())
        })?;

        self.publication.publish(frame, session_id, &msg_type)
    }

    fn disconnect(
        &mut self,
        connection_id: ConnectionId,
        reason: &DisconnectReason,
    ) -> Result<Position, PublishError> {
        self.publication.publish_disconnect(connection_id, reason)
    }

    fn last_frame(&self) -> &[u8] {
        self.buffer.last_frame()
    }
}

impl fmt::Debug for BinaryProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinaryProxy")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::BinaryParser;
    use fixgate_core::clock::ManualClock;
    use fixgate_core::types::CompId;
    use fixgate_session::identity::SenderAndTargetCompIdStrategy;
    use fixgate_session::message::SessionMessageKind;
    use fixgate_session::protocol::SessionParser;
    use fixgate_session::publication::CapturePublication;

    const T0: u64 = 1_791_000_000_000_000_000;

    fn proxy() -> (BinaryProxy, Arc<CapturePublication>, Arc<ManualClock>) {
        let publication = Arc::new(CapturePublication::new());
        let clock = Arc::new(ManualClock::new(T0));
        let mut proxy = BinaryProxy::new(
            publication.clone(),
            clock.clone(),
            Arc::new(SenderAndTargetCompIdStrategy),
        );
        proxy.set_session(
            SessionId::new(1),
            CompositeKey::new(CompId::new("GW").unwrap(), CompId::new("CLIENT").unwrap()),
        );
        (proxy, publication, clock)
    }

    fn parse(frame: &[u8]) -> fixgate_session::message::SessionMessage {
        BinaryParser::new(SessionId::new(1)).parse(frame).unwrap()
    }

    #[test]
    fn test_establish_carries_comp_ids() {
        let (mut proxy, publication, _) = proxy();
        proxy.logon(30, 1, SessionId::new(1), false).unwrap();

        let msg = parse(proxy.last_frame());
        assert_eq!(msg.header.sender_comp_id, CompId::new("GW"));
        assert_eq!(msg.header.target_comp_id, CompId::new("CLIENT"));
        assert_eq!(msg.seq_num(), 1);
        assert!(matches!(
            msg.kind,
            SessionMessageKind::Logon {
                heartbeat_interval_secs: 30,
                reset_seq_num: false,
                ..
            }
        ));
        assert_eq!(publication.msg_types(), vec![MsgType::Logon]);
    }

    #[test]
    fn test_heartbeat_and_reject() {
        let (mut proxy, _, _) = proxy();
        proxy.heartbeat(Some("ABC"), 4, SessionId::new(1)).unwrap();
        let msg = parse(proxy.last_frame());
        assert_eq!(msg.seq_num(), 4);
        assert_eq!(
            msg.kind,
            SessionMessageKind::Heartbeat {
                test_req_id: Some("ABC".to_string())
            }
        );
        assert!(msg.header.sender_comp_id.is_none());

        let reason = RejectReason::value_incorrect("bad").with_ref_tag(36);
        proxy.reject(5, 3, SessionId::new(1), &reason).unwrap();
        assert_eq!(
            parse(proxy.last_frame()).kind,
            SessionMessageKind::Reject {
                ref_seq_num: 3,
                reason: Some(RejectReason::VALUE_INCORRECT),
                text: Some("bad".to_string())
            }
        );
    }

    #[test]
    fn test_gap_fill_sets_poss_dup() {
        let (mut proxy, _, _) = proxy();
        proxy.sequence_reset(2, 5, true, SessionId::new(1)).unwrap();
        let msg = parse(proxy.last_frame());
        assert!(msg.is_poss_dup());
        assert_eq!(
            msg.kind,
            SessionMessageKind::SequenceReset {
                new_seq_no: 5,
                gap_fill: true
            }
        );
    }

    #[test]
    fn test_resend_restamps_copy() {
        let (mut proxy, publication, clock) = proxy();
        proxy
            .application(&MsgType::ExecutionReport, 2, SessionId::new(1), &|body| {
                body.put_str(37, "O1");
            })
            .unwrap();
        let original = proxy.last_frame().to_vec();

        clock.advance(1_000);
        proxy.resend(&original, SessionId::new(1)).unwrap();
        let resent = proxy.last_frame();
        let view = BinaryFrame::parse(resent).unwrap();
        assert!(view.poss_dup());
        assert_eq!(view.msg_seq_num(), 2);
        assert_eq!(view.sending_time(), T0 + 1_000);
        assert_eq!(view.tlv_str(37).unwrap(), Some("O1"));
        assert_eq!(
            publication.msg_types(),
            vec![MsgType::ExecutionReport, MsgType::ExecutionReport]
        );

        assert!(matches!(
            proxy.resend(b"garbage", SessionId::new(1)),
            Err(PublishError::Malformed(_))
        ));
    }

    #[test]
    fn test_back_pressure_is_reported() {
        let (mut proxy, publication, _) = proxy();
        publication.back_pressure_next(1);
        assert_eq!(
            proxy.logout(2, SessionId::new(1)),
            Err(PublishError::BackPressured)
        );
        assert!(proxy.logout(2, SessionId::new(1)).is_ok());
    }
}
