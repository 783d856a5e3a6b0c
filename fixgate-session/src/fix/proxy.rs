/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Tag=value session proxy.

use crate::frame::FrameBuffer;
use crate::identity::{CompositeKey, SessionIdStrategy};
use crate::message::SessionHeader;
use crate::proxy::{BodyWriter, RejectReason, SessionProxy};
use crate::publication::Publication;
use crate::state::DisconnectReason;
use fixgate_core::clock::EpochNanoClock;
use fixgate_core::error::PublishError;
use fixgate_core::field::tags;
use fixgate_core::message::MsgType;
use fixgate_core::types::{ConnectionId, Position, SessionId, Timestamp};
use fixgate_tagvalue::{Decoder, Encoder};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

impl BodyWriter for Encoder<'_> {
    fn put_str(&mut self, tag: u32, value: &str) {
        Encoder::put_str(self, tag, value);
    }

    fn put_uint(&mut self, tag: u32, value: u64) {
        Encoder::put_uint(self, tag, value);
    }

    fn put_int(&mut self, tag: u32, value: i64) {
        Encoder::put_int(self, tag, value);
    }

    fn put_bool(&mut self, tag: u32, value: bool) {
        Encoder::put_bool(self, tag, value);
    }

    fn put_char(&mut self, tag: u32, value: char) {
        Encoder::put_char(self, tag, value);
    }

    fn put_raw(&mut self, tag: u32, value: &[u8]) {
        Encoder::put_raw(self, tag, value);
    }
}

/// OrigSendingTime of a re-sent message.
enum OrigSendingTime<'a> {
    None,
    Raw(&'a [u8]),
}

/// Builds tag=value session messages into a single scratch buffer.
pub struct FixProxy {
    begin_string: String,
    publication: Arc<dyn Publication>,
    clock: Arc<dyn EpochNanoClock>,
    identity: Arc<dyn SessionIdStrategy>,
    sessions: HashMap<SessionId, CompositeKey>,
    buffer: FrameBuffer,
}

impl FixProxy {
    /// Creates a proxy.
    #[must_use]
    pub fn new(
        begin_string: impl Into<String>,
        publication: Arc<dyn Publication>,
        clock: Arc<dyn EpochNanoClock>,
        identity: Arc<dyn SessionIdStrategy>,
    ) -> Self {
        Self {
            begin_string: begin_string.into(),
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
        orig_sending_time: OrigSendingTime<'_>,
        body: F,
    ) -> Result<Position, PublishError>
    where
        F: FnOnce(&mut Encoder<'_>),
    {
        let mut header = SessionHeader::new(msg_type.clone(), msg_seq_no).with_poss_dup(poss_dup);
        if let Some(key) = self.sessions.get(&session_id) {
            self.identity.on_send(key, &mut header);
        }
        let sending_time = self.clock.timestamp();
        let begin_string = self.begin_string.as_str();

        let frame = self.buffer.build(|buf| {
            let mut encoder = Encoder::new(buf, begin_string);
            write_header(&mut encoder, &header, sending_time, orig_sending_time);
            body(&mut encoder);
            encoder.finish()
        })?;

        self.publication.publish(frame, session_id, msg_type)
    }
}

fn write_header(
    encoder: &mut Encoder<'_>,
    header: &SessionHeader,
    sending_time: Timestamp,
    orig_sending_time: OrigSendingTime<'_>,
) {
    encoder.put_str(tags::MSG_TYPE, header.msg_type.as_str());
    if let Some(sender) = &header.sender_comp_id {
        encoder.put_str(tags::SENDER_COMP_ID, sender.as_str());
    }
    if let Some(target) = &header.target_comp_id {
        encoder.put_str(tags::TARGET_COMP_ID, target.as_str());
    }
    if let Some(sender_sub) = &header.sender_sub_id {
        encoder.put_str(tags::SENDER_SUB_ID, sender_sub.as_str());
    }
    if let Some(target_sub) = &header.target_sub_id {
        encoder.put_str(tags::TARGET_SUB_ID, target_sub.as_str());
    }
    encoder.put_uint(tags::MSG_SEQ_NUM, header.msg_seq_num);
    if header.poss_dup {
        encoder.put_bool(tags::POSS_DUP_FLAG, true);
    }
    encoder.put_timestamp(tags::SENDING_TIME, sending_time);
    if let OrigSendingTime::Raw(orig) = orig_sending_time {
        encoder.put_raw(tags::ORIG_SENDING_TIME, orig);
    }
}

impl SessionProxy for FixProxy {
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
        self.send(
            &MsgType::Logon,
            msg_seq_no,
            session_id,
            false,
            OrigSendingTime::None,
            |encoder| {
                encoder.put_uint(tags::ENCRYPT_METHOD, 0);
                encoder.put_uint(tags::HEART_BT_INT, heartbeat_interval_secs);
                if reset_seq_num {
                    encoder.put_bool(tags::RESET_SEQ_NUM_FLAG, true);
                }
            },
        )
    }

    fn logout(&mut self, msg_seq_no: u64, session_id: SessionId) -> Result<Position, PublishError> {
        self.send(
            &MsgType::Logout,
            msg_seq_no,
            session_id,
            false,
            OrigSendingTime::None,
            |_| {},
        )
    }

    fn logout_with_reason(
        &mut self,
        msg_seq_no: u64,
        session_id: SessionId,
        text: &str,
    ) -> Result<Position, PublishError> {
        self.send(
            &MsgType::Logout,
            msg_seq_no,
            session_id,
            false,
            OrigSendingTime::None,
            |encoder| encoder.put_str(tags::TEXT, text),
        )
    }

    fn heartbeat(
        &mut self,
        test_req_id: Option<&str>,
        msg_seq_no: u64,
        session_id: SessionId,
    ) -> Result<Position, PublishError> {
        self.send(
            &MsgType::Heartbeat,
            msg_seq_no,
            session_id,
            false,
            OrigSendingTime::None,
            |encoder| {
                if let Some(id) = test_req_id {
                    encoder.put_str(tags::TEST_REQ_ID, id);
                }
            },
        )
    }

    fn test_request(
        &mut self,
        test_req_id: &str,
        msg_seq_no: u64,
        session_id: SessionId,
    ) -> Result<Position, PublishError> {
        self.send(
            &MsgType::TestRequest,
            msg_seq_no,
            session_id,
            false,
            OrigSendingTime::None,
            |encoder| encoder.put_str(tags::TEST_REQ_ID, test_req_id),
        )
    }

    fn resend_request(
        &mut self,
        msg_seq_no: u64,
        begin: u64,
        end: u64,
        session_id: SessionId,
    ) -> Result<Position, PublishError> {
        self.send(
            &MsgType::ResendRequest,
            msg_seq_no,
            session_id,
            false,
            OrigSendingTime::None,
            |encoder| {
                encoder.put_uint(tags::BEGIN_SEQ_NO, begin);
                encoder.put_uint(tags::END_SEQ_NO, end);
            },
        )
    }

    fn reject(
        &mut self,
        msg_seq_no: u64,
        ref_seq_num: u64,
        session_id: SessionId,
        reason: &RejectReason,
    ) -> Result<Position, PublishError> {
        self.send(
            &MsgType::Reject,
            msg_seq_no,
            session_id,
            false,
            OrigSendingTime::None,
            |encoder| {
                encoder.put_uint(tags::REF_SEQ_NUM, ref_seq_num);
                if let Some(ref_tag) = reason.ref_tag {
                    encoder.put_uint(tags::REF_TAG_ID, u64::from(ref_tag));
                }
                encoder.put_uint(tags::SESSION_REJECT_REASON, u64::from(reason.code));
                if !reason.text.is_empty() {
                    encoder.put_str(tags::TEXT, &reason.text);
                }
            },
        )
    }

    fn sequence_reset(
        &mut self,
        msg_seq_no: u64,
        new_seq_no: u64,
        gap_fill: bool,
        session_id: SessionId,
    ) -> Result<Position, PublishError> {
        self.send(
            &MsgType::SequenceReset,
            msg_seq_no,
            session_id,
            gap_fill,
            OrigSendingTime::None,
            |encoder| {
                if gap_fill {
                    encoder.put_bool(tags::GAP_FILL_FLAG, true);
                }
                encoder.put_uint(tags::NEW_SEQ_NO, new_seq_no);
            },
        )
    }

    fn application(
        &mut self,
        msg_type: &MsgType,
        msg_seq_no: u64,
        session_id: SessionId,
        body: &dyn Fn(&mut dyn BodyWriter),
    ) -> Result<Position, PublishError> {
        self.send(
            msg_type,
            msg_seq_no,
            session_id,
            false,
            OrigSendingTime::None,
            |encoder| body(encoder),
        )
    }

    fn resend(
        &mut self,
        original: &[u8],
        session_id: SessionId,
    ) -> Result<Position, PublishError> {
        let raw = Decoder::new(original)
            .with_checksum_validation(false)
            .decode()
            .map_err(|e| PublishError::Malformed(e.to_string()))?;
        let msg_seq_no: u64 = raw
            .get_field_as(tags::MSG_SEQ_NUM)
            .map_err(|e| PublishError::Malformed(e.to_string()))?;
        let orig_sending_time = raw
            .get_field(tags::SENDING_TIME)
            .map_or(OrigSendingTime::None, |f| OrigSendingTime::Raw(f.value));
        let msg_type = raw.msg_type().clone();

        self.send(
            &msg_type,
            msg_seq_no,
            session_id,
            true,
            orig_sending_time,
            |encoder| {
                for field in raw.fields().filter(|f| !f.tag().is_header()) {
                    encoder.put_raw(field.tag, field.value);
                }
            },
        )
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

impl fmt::Debug for FixProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixProxy")
            .field("begin_string", &self.begin_string)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::SenderAndTargetCompIdStrategy;
    use crate::publication::CapturePublication;
    use fixgate_core::clock::ManualClock;
    use fixgate_core::types::CompId;
    use fixgate_tagvalue::strip_volatile;

    const T0: u64 = 1_791_000_000_000_000_000;

    fn proxy() -> (FixProxy, Arc<CapturePublication>, Arc<ManualClock>) {
        let publication = Arc::new(CapturePublication::new());
        let clock = Arc::new(ManualClock::new(T0));
        let mut proxy = FixProxy::new(
            "FIX.4.4",
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

    fn decode(frame: &[u8]) -> fixgate_core::message::OwnedMessage {
        Decoder::new(frame).decode().unwrap().to_owned()
    }

    #[test]
    fn test_logon_frame() {
        let (mut proxy, publication, _) = proxy();
        proxy.logon(30, 1, SessionId::new(1), false).unwrap();

        let msg = decode(proxy.last_frame());
        assert_eq!(msg.msg_type(), &MsgType::Logon);
        assert_eq!(msg.get_field_str(49), Some("GW"));
        assert_eq!(msg.get_field_str(56), Some("CLIENT"));
        assert_eq!(msg.get_field_u64(108), Some(30));
        assert_eq!(msg.msg_seq_num(), Some(1));
        assert_eq!(publication.frames()[0].bytes.as_ref(), proxy.last_frame());
    }

    #[test]
    fn test_heartbeat_always_carries_seq_num() {
        let (mut proxy, _, _) = proxy();
        proxy.heartbeat(None, 4, SessionId::new(1)).unwrap();
        let msg = decode(proxy.last_frame());
        assert_eq!(msg.msg_seq_num(), Some(4));
        assert!(msg.get_field(112).is_none());

        proxy.heartbeat(Some("ABC"), 5, SessionId::new(1)).unwrap();
        assert_eq!(decode(proxy.last_frame()).get_field_str(112), Some("ABC"));
    }

    #[test]
    fn test_resend_request_and_reject() {
        let (mut proxy, _, _) = proxy();
        proxy.resend_request(3, 2, 0, SessionId::new(1)).unwrap();
        let msg = decode(proxy.last_frame());
        assert_eq!(msg.get_field_u64(7), Some(2));
        assert_eq!(msg.get_field_u64(16), Some(0));

        let reason = RejectReason::comp_id_problem("wrong target");
        proxy.reject(4, 9, SessionId::new(1), &reason).unwrap();
        let msg = decode(proxy.last_frame());
        assert_eq!(msg.get_field_u64(45), Some(9));
        assert_eq!(msg.get_field_u64(373), Some(9));
        assert_eq!(msg.get_field_str(58), Some("wrong target"));
    }

    #[test]
    fn test_gap_fill_sets_poss_dup() {
        let (mut proxy, _, _) = proxy();
        proxy.sequence_reset(2, 6, true, SessionId::new(1)).unwrap();
        let msg = decode(proxy.last_frame());
        assert_eq!(msg.get_field_str(43), Some("Y"));
        assert_eq!(msg.get_field_str(123), Some("Y"));
        assert_eq!(msg.get_field_u64(36), Some(6));
    }

    #[test]
    fn test_application_body_and_resend() {
        let (mut proxy, publication, clock) = proxy();
        proxy
            .application(&MsgType::ExecutionReport, 7, SessionId::new(1), &|body| {
                body.put_str(37, "O1");
                body.put_char(39, '0');
            })
            .unwrap();
        let original = proxy.last_frame().to_vec();

        clock.advance_millis(1_500);
        proxy.resend(&original, SessionId::new(1)).unwrap();
        let resent = decode(proxy.last_frame());
        let first = decode(&original);

        assert_eq!(resent.msg_seq_num(), Some(7));
        assert_eq!(resent.get_field_str(43), Some("Y"));
        assert_eq!(resent.get_field(122), first.get_field(52));
        assert_ne!(resent.get_field(52), first.get_field(52));
        assert_eq!(resent.get_field_str(37), Some("O1"));
        assert_eq!(publication.len(), 2);
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

    #[test]
    fn test_sending_time_is_the_only_difference() {
        let (mut proxy, _, clock) = proxy();
        proxy.heartbeat(None, 2, SessionId::new(1)).unwrap();
        let first = proxy.last_frame().to_vec();
        clock.advance_millis(250);
        proxy.heartbeat(None, 2, SessionId::new(1)).unwrap();
        assert_ne!(first.as_slice(), proxy.last_frame());
        assert_eq!(strip_volatile(&first), strip_volatile(proxy.last_frame()));
    }
}
