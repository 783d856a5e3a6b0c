/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! The session state machine.
//!
//! A [`Session`] is owned by exactly one driver and mutated through `&mut self`.
//! It consumes decoded [`SessionMessage`]s and periodic [`Session::poll`] ticks,
//! sends through its [`SessionProxy`], and queues [`SessionEvent`]s for the
//! business layer.
//!
//! Sends happen before state changes: when the publication is back pressured
//! the call returns [`SessionError::BackPressured`] with sequence numbers
//! untouched, and the caller offers the same input again.

use crate::anomaly::{AnomalyCounter, AnomalyKind};
use crate::auth::{AuthenticationStrategy, LogonRequest, NoAuthentication};
use crate::config::{GapPolicy, LogonRejectPolicy, SessionConfig};
use crate::heartbeat::{HeartbeatAction, HeartbeatManager, generate_test_req_id};
use crate::identity::{CompositeKey, SenderAndTargetCompIdStrategy, SessionIdStrategy, SessionIds};
use crate::message::{SessionMessage, SessionMessageKind};
use crate::proxy::{BodyWriter, RejectReason, SessionProxy};
use crate::sequence::{SequenceManager, SequenceResult, SequenceWindow};
use crate::state::{DisconnectReason, SessionRole, SessionState};
use fixgate_core::clock::EpochNanoClock;
use fixgate_core::error::{PublishError, SessionError};
use fixgate_core::field::tags;
use fixgate_core::message::{MsgType, OwnedMessage};
use fixgate_core::types::{ConnectionId, Position, SessionId};
use fixgate_store::{MemoryStore, MessageStore, StoredMessage};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Collaborators shared by every session of an engine.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Composite key to session id registry.
    pub ids: Arc<SessionIds>,
    /// Sent messages and sequence indices.
    pub store: Arc<dyn MessageStore>,
    /// Logon authentication.
    pub auth: Arc<dyn AuthenticationStrategy>,
    /// Identity strategy.
    pub identity: Arc<dyn SessionIdStrategy>,
    /// Anomaly tally.
    pub anomalies: Arc<AnomalyCounter>,
    /// Epoch clock.
    pub clock: Arc<dyn EpochNanoClock>,
}

impl SessionContext {
    /// Creates a context with in-memory storage and no authentication.
    #[must_use]
    pub fn new(clock: Arc<dyn EpochNanoClock>) -> Self {
        Self {
            ids: Arc::new(SessionIds::new()),
            store: Arc::new(MemoryStore::new()),
            auth: Arc::new(NoAuthentication),
            identity: Arc::new(SenderAndTargetCompIdStrategy),
            anomalies: Arc::new(AnomalyCounter::new()),
            clock,
        }
    }

    /// Sets the session id registry.
    #[must_use]
    pub fn with_ids(mut self, ids: Arc<SessionIds>) -> Self {
        self.ids = ids;
        self
    }

    /// Sets the message store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = store;
        self
    }

    /// Sets the authentication strategy.
    #[must_use]
    pub fn with_auth(mut self, auth: Arc<dyn AuthenticationStrategy>) -> Self {
        self.auth = auth;
        self
    }

    /// Sets the identity strategy.
    #[must_use]
    pub fn with_identity(mut self, identity: Arc<dyn SessionIdStrategy>) -> Self {
        self.identity = identity;
        self
    }

    /// Sets the anomaly counter.
    #[must_use]
    pub fn with_anomalies(mut self, anomalies: Arc<AnomalyCounter>) -> Self {
        self.anomalies = anomalies;
        self
    }
}

/// Something the business layer should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Logon completed.
    LoggedOn,
    /// An in-order business message.
    Message(OwnedMessage),
    /// Logout handshake completed.
    LoggedOut,
    /// The connection is being closed.
    Disconnected(DisconnectReason),
}

/// Sends business messages on an established session.
pub trait ApplicationSender {
    /// Returns the id of the session.
    fn session_id(&self) -> SessionId;

    /// Sends a business message whose body is written by `body`.
    ///
    /// # Errors
    /// Returns `SessionError::BackPressured` if the message was not sent, or
    /// `SessionError::InvalidState` if the session is not established.
    fn send(
        &mut self,
        msg_type: &MsgType,
        body: &dyn Fn(&mut dyn BodyWriter),
    ) -> Result<Position, SessionError>;
}

#[derive(Debug, Clone, Copy)]
struct GapState {
    begin: u64,
    end: u64,
    requested: bool,
}

#[derive(Debug)]
struct ResendProgress {
    next: u64,
    end: u64,
    stored: VecDeque<StoredMessage>,
}

/// One FIX-family session.
pub struct Session<P: SessionProxy> {
    config: Arc<SessionConfig>,
    ctx: SessionContext,
    role: SessionRole,
    connection_id: ConnectionId,
    session_id: SessionId,
    key: Option<CompositeKey>,
    state: SessionState,
    sequences: SequenceManager,
    heartbeat: HeartbeatManager,
    proxy: P,
    gap: Option<GapState>,
    // `None` marks a sequence number already consumed, e.g. a Logon that
    // arrived ahead of expected.
    buffered: BTreeMap<u64, Option<SessionMessage>>,
    events: Vec<SessionEvent>,
    resend: Option<ResendProgress>,
    pending_disconnect: Option<DisconnectReason>,
    connected_at_ns: u64,
    logon_sent_at_ns: Option<u64>,
    logout_sent_at_ns: Option<u64>,
}

impl<P: SessionProxy> Session<P> {
    /// Creates a session waiting for the counterparty's Logon.
    #[must_use]
    pub fn acceptor(
        config: Arc<SessionConfig>,
        ctx: SessionContext,
        connection_id: ConnectionId,
        proxy: P,
    ) -> Self {
        Self::new(
            config,
            ctx,
            SessionRole::Acceptor,
            connection_id,
            None,
            proxy,
        )
    }

    /// Creates a session that logs on to the counterparty identified by `key`.
    ///
    /// Call [`Session::send_logon`] to start.
    #[must_use]
    pub fn initiator(
        config: Arc<SessionConfig>,
        ctx: SessionContext,
        connection_id: ConnectionId,
        key: CompositeKey,
        proxy: P,
    ) -> Self {
        Self::new(
            config,
            ctx,
            SessionRole::Initiator,
            connection_id,
            Some(key),
            proxy,
        )
    }

    fn new(
        config: Arc<SessionConfig>,
        ctx: SessionContext,
        role: SessionRole,
        connection_id: ConnectionId,
        key: Option<CompositeKey>,
        mut proxy: P,
    ) -> Self {
        let now = ctx.clock.nanos();
        let (session_id, sequences) = match key {
            Some(key) => {
                let session_id = ctx.ids.on_logon(key);
                proxy.set_session(session_id, key);
                let sequences = ctx
                    .store
                    .sequences(session_id)
                    .map_or_else(SequenceManager::new, SequenceManager::from_index);
                (session_id, sequences)
            }
            None => (SessionId::UNKNOWN, SequenceManager::new()),
        };
        let heartbeat = HeartbeatManager::new(
            config.heartbeat_interval,
            config.test_request_factor,
            now,
        );

        Self {
            config,
            ctx,
            role,
            connection_id,
            session_id,
            key,
            state: SessionState::Connected,
            sequences,
            heartbeat,
            proxy,
            gap: None,
            buffered: BTreeMap::new(),
            events: Vec::new(),
            resend: None,
            pending_disconnect: None,
            connected_at_ns: now,
            logon_sent_at_ns: None,
            logout_sent_at_ns: None,
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the role.
    #[inline]
    #[must_use]
    pub const fn role(&self) -> SessionRole {
        self.role
    }

    /// Returns the session id, [`SessionId::UNKNOWN`] before logon.
    #[inline]
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Returns the transport connection id.
    #[inline]
    #[must_use]
    pub const fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Returns the composite key once known.
    #[must_use]
    pub const fn key(&self) -> Option<&CompositeKey> {
        self.key.as_ref()
    }

    /// Returns the last sent MsgSeqNum.
    #[must_use]
    pub const fn last_sent(&self) -> u64 {
        self.sequences.last_sent()
    }

    /// Returns the last accepted inbound MsgSeqNum.
    #[must_use]
    pub const fn last_received(&self) -> u64 {
        self.sequences.last_received()
    }

    /// Returns the number of messages held while a gap is outstanding.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffered.values().filter(|msg| msg.is_some()).count()
    }

    /// Returns true while a ResendRequest of ours is outstanding.
    #[must_use]
    pub const fn is_awaiting_resend(&self) -> bool {
        self.gap.is_some()
    }

    /// Returns true while servicing a counterparty ResendRequest.
    #[must_use]
    pub const fn is_resending(&self) -> bool {
        self.resend.is_some()
    }

    /// Returns true while a disconnect request waits for the publication.
    #[must_use]
    pub const fn has_pending_disconnect(&self) -> bool {
        self.pending_disconnect.is_some()
    }

    /// Returns the proxy.
    #[must_use]
    pub const fn proxy(&self) -> &P {
        &self.proxy
    }

    /// Removes and returns the queued events.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Sends our Logon as initiator.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidState` unless this is an initiator that
    /// has not logged on yet, or `SessionError::BackPressured`.
    pub fn send_logon(&mut self) -> Result<Position, SessionError> {
        if self.role != SessionRole::Initiator || self.state != SessionState::Connected {
            return Err(self.invalid_state("Connected initiator"));
        }

        let reset = self.config.reset_on_logon;
        if reset {
            self.sequences.reset();
        }
        let interval = self.config.heartbeat_interval_secs();
        let position =
            self.send_admin(|proxy, seq, sid| proxy.logon(interval, seq, sid, reset))?;
        if reset {
            self.ctx.store.reset(self.session_id)?;
            self.persist()?;
        }

        self.state = SessionState::LogonSent;
        self.logon_sent_at_ns = Some(self.now());
        info!(
            session_id = %self.session_id,
            connection_id = %self.connection_id,
            "logon sent"
        );
        Ok(position)
    }

    /// Handles one decoded inbound message.
    ///
    /// # Errors
    /// - `SessionError::BackPressured`: nothing was consumed, offer the message again
    /// - `SessionError::LogonRejected`: the logon failed and the session is disconnected
    /// - `SessionError::InvalidState`: the message is not allowed in this state
    pub fn on_message(&mut self, msg: SessionMessage) -> Result<(), SessionError> {
        let now = self.now();
        match self.state {
            SessionState::Disconnected => {
                debug!(
                    connection_id = %self.connection_id,
                    seq = msg.seq_num(),
                    "message after disconnect ignored"
                );
                Ok(())
            }
            SessionState::Connected | SessionState::LogonReceived => match self.role {
                SessionRole::Acceptor => self.on_acceptor_logon(msg, now),
                SessionRole::Initiator => Err(self.invalid_state("LogonSent")),
            },
            SessionState::LogonSent => self.on_initiator_logon(msg, now),
            SessionState::Active
            | SessionState::AwaitingResend
            | SessionState::LogoutSent
            | SessionState::LogoutReceived => {
                self.heartbeat.on_message_received(now);
                self.on_established(msg)
            }
        }
    }

    /// Handles a frame that could not be decoded.
    ///
    /// `seq_num` is whatever sequence number could be read from the raw
    /// frame. An established session answers with a Reject; a session still
    /// logging on is disconnected.
    ///
    /// # Errors
    /// Returns `SessionError::BackPressured` if the Reject was not sent.
    pub fn on_decode_error(
        &mut self,
        seq_num: Option<u64>,
        error: &fixgate_core::error::DecodeError,
    ) -> Result<(), SessionError> {
        warn!(
            session_id = %self.session_id,
            connection_id = %self.connection_id,
            seq = ?seq_num,
            error = %error,
            "undecodable message"
        );

        if self.state.is_logging_on() {
            self.ctx.anomalies.record(AnomalyKind::DecodeFailure);
            self.disconnect(DisconnectReason::ProtocolViolation);
            return Ok(());
        }
        if self.state.is_disconnected() {
            return Ok(());
        }

        let reason = RejectReason::other(error.to_string());
        let ref_seq_num = seq_num.unwrap_or(0);
        self.send_admin(|proxy, seq, sid| proxy.reject(seq, ref_seq_num, sid, &reason))?;
        self.ctx.anomalies.record(AnomalyKind::DecodeFailure);

        let expected = self.sequences.expected();
        if seq_num == Some(expected) {
            self.accept(expected)?;
            self.drain_buffered()?;
        }

        if self.config.fatal_protocol_violations {
            self.send_admin(|proxy, seq, sid| {
                proxy.logout_with_reason(seq, sid, "protocol violation")
            })?;
            self.disconnect(DisconnectReason::ProtocolViolation);
        }
        Ok(())
    }

    /// Drives timers: logon/logout timeouts, heartbeats, TestRequests, and
    /// any work left over from a back pressured send.
    ///
    /// # Errors
    /// Returns `SessionError::BackPressured` if a due message was not sent; the
    /// next poll tries again.
    pub fn poll(&mut self) -> Result<(), SessionError> {
        let now = self.now();

        if let Some(reason) = self.pending_disconnect.take() {
            self.publish_disconnect(reason);
        }

        match self.state {
            SessionState::Disconnected | SessionState::LogoutReceived => Ok(()),
            SessionState::Connected | SessionState::LogonReceived => {
                let timeout = duration_nanos(self.config.logon_timeout);
                if self.role == SessionRole::Acceptor
                    && now.saturating_sub(self.connected_at_ns) >= timeout
                {
                    warn!(connection_id = %self.connection_id, "no logon received in time");
                    self.disconnect(DisconnectReason::LogonTimeout);
                }
                Ok(())
            }
            SessionState::LogonSent => {
                let timeout = duration_nanos(self.config.logon_timeout);
                if let Some(sent_at) = self.logon_sent_at_ns
                    && now.saturating_sub(sent_at) >= timeout
                {
                    warn!(session_id = %self.session_id, "logon not answered in time");
                    self.disconnect(DisconnectReason::LogonTimeout);
                }
                Ok(())
            }
            SessionState::LogoutSent => {
                let timeout = duration_nanos(self.config.logout_timeout);
                if let Some(sent_at) = self.logout_sent_at_ns
                    && now.saturating_sub(sent_at) >= timeout
                {
                    warn!(session_id = %self.session_id, "logout not answered in time");
                    self.disconnect(DisconnectReason::LogoutTimeout);
                    return Ok(());
                }
                self.continue_resend()
            }
            SessionState::Active | SessionState::AwaitingResend => self.poll_established(now),
        }
    }

    /// Sends Logout and waits for the counterparty's reply.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidState` unless established, or
    /// `SessionError::BackPressured`.
    pub fn start_logout(&mut self) -> Result<Position, SessionError> {
        self.initiate_logout(None)
    }

    /// Sends Logout carrying `text` and waits for the counterparty's reply.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidState` unless established, or
    /// `SessionError::BackPressured`.
    pub fn start_logout_with_reason(&mut self, text: &str) -> Result<Position, SessionError> {
        self.initiate_logout(Some(text))
    }

    /// Closes the connection immediately, abandoning any resend in progress.
    pub fn terminate(&mut self, reason: &str) {
        self.resend = None;
        self.gap = None;
        self.buffered.clear();
        self.disconnect(DisconnectReason::Terminated(reason.to_string()));
    }

    fn initiate_logout(&mut self, text: Option<&str>) -> Result<Position, SessionError> {
        if !self.state.is_established() {
            return Err(self.invalid_state("Active"));
        }

        let position = self.send_admin(|proxy, seq, sid| match text {
            Some(text) => proxy.logout_with_reason(seq, sid, text),
            None => proxy.logout(seq, sid),
        })?;
        self.state = SessionState::LogoutSent;
        self.logout_sent_at_ns = Some(self.now());
        info!(session_id = %self.session_id, "logout sent");
        Ok(position)
    }

    fn on_acceptor_logon(&mut self, msg: SessionMessage, now: u64) -> Result<(), SessionError> {
        let SessionMessageKind::Logon {
            heartbeat_interval_secs,
            reset_seq_num,
            username,
            password,
        } = &msg.kind
        else {
            warn!(
                connection_id = %self.connection_id,
                msg_type = %msg.header.msg_type,
                "first message is not a logon"
            );
            self.disconnect(DisconnectReason::FirstMessageNotLogon);
            return Err(SessionError::InvalidState {
                expected: MsgType::Logon.to_string(),
                current: msg.header.msg_type.to_string(),
            });
        };
        let heartbeat_interval_secs = *heartbeat_interval_secs;
        let reset_seq_num = *reset_seq_num;
        self.state = SessionState::LogonReceived;

        let Some(key) = self.ctx.identity.on_logon(&msg.header) else {
            let tag = if msg.header.sender_comp_id.is_none() {
                tags::SENDER_COMP_ID
            } else {
                tags::TARGET_COMP_ID
            };
            return self.reject_logon(&msg, None, RejectReason::required_tag_missing(tag));
        };
        if key.local_comp_id != self.config.local_comp_id {
            let reason =
                RejectReason::comp_id_problem(format!("unknown TargetCompID {}", key.local_comp_id))
                    .with_ref_tag(tags::TARGET_COMP_ID);
            return self.reject_logon(&msg, Some(key), reason);
        }
        if !self.config.accepts_heartbeat_interval(heartbeat_interval_secs) {
            let reason = RejectReason::value_incorrect(format!(
                "heartbeat interval {heartbeat_interval_secs} out of range"
            ))
            .with_ref_tag(tags::HEART_BT_INT);
            return self.reject_logon(&msg, Some(key), reason);
        }
        let request = LogonRequest {
            key,
            heartbeat_interval_secs,
            username: username.clone(),
            password: password.clone(),
            reset_seq_num,
        };
        if let Err(reason) = self.ctx.auth.authenticate(&request) {
            return self.reject_logon(&msg, Some(key), reason);
        }

        let session_id = self.ctx.ids.on_logon(key);
        self.proxy.set_session(session_id, key);
        let reset = self.config.reset_on_logon || reset_seq_num;
        let mut sequences = if reset {
            SequenceManager::new()
        } else {
            self.ctx
                .store
                .sequences(session_id)
                .map_or_else(SequenceManager::new, SequenceManager::from_index)
        };

        let received = msg.seq_num();
        let expected = sequences.expected();
        if received < expected {
            self.session_id = session_id;
            self.key = Some(key);
            self.sequences = sequences;
            return self.logon_seq_too_low(expected, received);
        }

        let seq = sequences.next_sender_seq();
        self.proxy
            .logon(heartbeat_interval_secs, seq.value(), session_id, reset)?;
        sequences.on_sent(seq);
        if reset {
            self.ctx.store.reset(session_id)?;
        }

        self.session_id = session_id;
        self.key = Some(key);
        self.sequences = sequences;
        self.heartbeat
            .set_interval(Duration::from_secs(heartbeat_interval_secs));
        self.heartbeat.reset(now);
        self.state = SessionState::Active;
        info!(
            session_id = %session_id,
            connection_id = %self.connection_id,
            key = %key,
            heartbeat_interval_secs,
            "logon accepted"
        );
        self.events.push(SessionEvent::LoggedOn);

        self.accept_logon_seq(received)?;
        self.persist()
    }

    fn on_initiator_logon(&mut self, msg: SessionMessage, now: u64) -> Result<(), SessionError> {
        let SessionMessageKind::Logon {
            heartbeat_interval_secs,
            reset_seq_num,
            ..
        } = &msg.kind
        else {
            warn!(
                session_id = %self.session_id,
                msg_type = %msg.header.msg_type,
                "expected logon reply"
            );
            self.disconnect(DisconnectReason::FirstMessageNotLogon);
            return Err(SessionError::InvalidState {
                expected: MsgType::Logon.to_string(),
                current: msg.header.msg_type.to_string(),
            });
        };
        let heartbeat_interval_secs = *heartbeat_interval_secs;

        if let Some(key) = self.key
            && !self.ctx.identity.matches(&key, &msg.header)
        {
            let reason = RejectReason::comp_id_problem("logon reply from unexpected CompID");
            return self.reject_logon(&msg, Some(key), reason);
        }
        if *reset_seq_num {
            self.sequences.on_received(0);
        }

        let received = msg.seq_num();
        let expected = self.sequences.expected();
        if received < expected {
            return self.logon_seq_too_low(expected, received);
        }

        self.heartbeat
            .set_interval(Duration::from_secs(heartbeat_interval_secs));
        self.heartbeat.reset(now);
        self.state = SessionState::Active;
        info!(session_id = %self.session_id, "logon acknowledged");
        self.events.push(SessionEvent::LoggedOn);

        self.accept_logon_seq(received)?;
        self.persist()
    }

    fn accept_logon_seq(&mut self, received: u64) -> Result<(), SessionError> {
        let expected = self.sequences.expected();
        if received == expected {
            self.accept(received)
        } else {
            self.buffered.insert(received, None);
            self.open_gap(expected, received)
        }
    }

    fn logon_seq_too_low(&mut self, expected: u64, received: u64) -> Result<(), SessionError> {
        warn!(
            session_id = %self.session_id,
            expected,
            received,
            "logon sequence number too low"
        );
        let text = format!("MsgSeqNum too low, expecting {expected} but received {received}");
        self.send_admin(|proxy, seq, sid| proxy.logout_with_reason(seq, sid, &text))?;
        self.disconnect(DisconnectReason::LogonRejected);
        Err(SessionError::SequenceTooLow { expected, received })
    }

    fn reject_logon(
        &mut self,
        msg: &SessionMessage,
        key: Option<CompositeKey>,
        reason: RejectReason,
    ) -> Result<(), SessionError> {
        warn!(
            connection_id = %self.connection_id,
            reason = %reason,
            "logon rejected"
        );
        if self.config.logon_reject_policy == LogonRejectPolicy::Reject {
            if let Some(key) = key {
                self.proxy.set_session(self.session_id, key);
            }
            let ref_seq_num = msg.seq_num();
            self.send_admin(|proxy, seq, sid| proxy.reject(seq, ref_seq_num, sid, &reason))?;
        }
        self.disconnect(DisconnectReason::LogonRejected);
        Err(SessionError::LogonRejected {
            reason: reason.text,
        })
    }

    fn on_established(&mut self, msg: SessionMessage) -> Result<(), SessionError> {
        let received = msg.seq_num();

        if let SessionMessageKind::SequenceReset {
            new_seq_no,
            gap_fill: false,
        } = msg.kind
        {
            self.apply_sequence_reset(received, new_seq_no)?;
            return self.drain_buffered();
        }

        match self.sequences.validate_incoming(received) {
            SequenceResult::Ok => {
                self.process(&msg)?;
                self.drain_buffered()
            }
            SequenceResult::TooLow { expected, received } => {
                if msg.is_poss_dup() {
                    debug!(
                        session_id = %self.session_id,
                        seq = received,
                        "possible duplicate ignored"
                    );
                    return Ok(());
                }
                let reason = RejectReason::other(format!(
                    "MsgSeqNum too low, expecting {expected} but received {received}"
                ))
                .with_ref_tag(tags::MSG_SEQ_NUM);
                self.send_admin(|proxy, seq, sid| proxy.reject(seq, received, sid, &reason))?;
                self.ctx.anomalies.record(AnomalyKind::SequenceTooLow);
                Ok(())
            }
            SequenceResult::Gap { expected, received } => {
                if let SessionMessageKind::Logout { text } = &msg.kind {
                    return self.on_logout(None, text.as_deref());
                }
                self.on_gap(msg, expected, received)
            }
        }
    }

    fn process(&mut self, msg: &SessionMessage) -> Result<(), SessionError> {
        let seq_num = msg.seq_num();

        if let Some(key) = self.key
            && !self.ctx.identity.matches(&key, &msg.header)
        {
            warn!(session_id = %self.session_id, seq = seq_num, "CompID mismatch");
            let reason = RejectReason::comp_id_problem("CompID problem");
            self.send_admin(|proxy, seq, sid| proxy.reject(seq, seq_num, sid, &reason))?;
            return self.accept(seq_num);
        }

        match &msg.kind {
            SessionMessageKind::Heartbeat { .. } => self.accept(seq_num),
            SessionMessageKind::TestRequest { test_req_id } => {
                self.send_admin(|proxy, seq, sid| proxy.heartbeat(Some(test_req_id), seq, sid))?;
                self.accept(seq_num)
            }
            SessionMessageKind::ResendRequest { begin, end } => {
                let Some(window) = SequenceWindow::new(*begin, *end) else {
                    let reason =
                        RejectReason::value_incorrect(format!("invalid resend range [{begin}, {end}]"))
                            .with_ref_tag(tags::END_SEQ_NO);
                    self.send_admin(|proxy, seq, sid| proxy.reject(seq, seq_num, sid, &reason))?;
                    return self.accept(seq_num);
                };
                self.accept(seq_num)?;
                self.start_resend(window)
            }
            SessionMessageKind::Reject {
                ref_seq_num,
                reason,
                text,
            } => {
                warn!(
                    session_id = %self.session_id,
                    ref_seq_num,
                    reason = ?reason,
                    text = text.as_deref().unwrap_or(""),
                    "reject received"
                );
                self.accept(seq_num)
            }
            SessionMessageKind::SequenceReset {
                new_seq_no,
                gap_fill: true,
            } => {
                if *new_seq_no <= seq_num {
                    let reason = RejectReason::value_incorrect(format!(
                        "NewSeqNo {new_seq_no} does not advance past {seq_num}"
                    ))
                    .with_ref_tag(tags::NEW_SEQ_NO);
                    self.send_admin(|proxy, seq, sid| proxy.reject(seq, seq_num, sid, &reason))?;
                    return self.accept(seq_num);
                }
                debug!(session_id = %self.session_id, seq = seq_num, new_seq_no, "gap fill");
                self.accept(new_seq_no - 1)
            }
            SessionMessageKind::SequenceReset {
                new_seq_no,
                gap_fill: false,
            } => self.apply_sequence_reset(seq_num, *new_seq_no),
            SessionMessageKind::Logout { text } => self.on_logout(Some(seq_num), text.as_deref()),
            SessionMessageKind::Logon { .. } => {
                let reason = RejectReason::other("logon on established session");
                self.send_admin(|proxy, seq, sid| proxy.reject(seq, seq_num, sid, &reason))?;
                self.accept(seq_num)
            }
            SessionMessageKind::Application(app) => {
                self.accept(seq_num)?;
                self.events.push(SessionEvent::Message(app.clone()));
                Ok(())
            }
        }
    }

    fn apply_sequence_reset(&mut self, seq_num: u64, new_seq_no: u64) -> Result<(), SessionError> {
        let expected = self.sequences.expected();
        if new_seq_no < expected {
            let reason = RejectReason::value_incorrect(format!(
                "attempt to lower sequence number from {expected} to {new_seq_no}"
            ))
            .with_ref_tag(tags::NEW_SEQ_NO);
            self.send_admin(|proxy, seq, sid| proxy.reject(seq, seq_num, sid, &reason))?;
            return Ok(());
        }

        info!(
            session_id = %self.session_id,
            expected,
            new_seq_no,
            "sequence reset"
        );
        self.accept(new_seq_no - 1)
    }

    fn on_logout(&mut self, seq_num: Option<u64>, text: Option<&str>) -> Result<(), SessionError> {
        info!(
            session_id = %self.session_id,
            text = text.unwrap_or(""),
            "logout received"
        );
        if self.logout_sent_at_ns.is_none() {
            self.state = SessionState::LogoutReceived;
            self.send_admin(|proxy, seq, sid| proxy.logout(seq, sid))?;
        }
        if let Some(seq_num) = seq_num {
            self.accept(seq_num)?;
        }
        self.events.push(SessionEvent::LoggedOut);
        self.disconnect(DisconnectReason::Logout);
        Ok(())
    }

    fn on_gap(
        &mut self,
        msg: SessionMessage,
        expected: u64,
        received: u64,
    ) -> Result<(), SessionError> {
        match self.config.gap_policy {
            GapPolicy::Buffer => self.buffer(msg),
            GapPolicy::Drop => {
                debug!(session_id = %self.session_id, seq = received, "message dropped during gap");
            }
        }

        match self.gap.as_mut() {
            Some(gap) => {
                if self.config.gap_policy == GapPolicy::Drop {
                    gap.end = gap.end.max(received);
                }
                Ok(())
            }
            None => self.open_gap(expected, received),
        }
    }

    fn buffer(&mut self, msg: SessionMessage) {
        if self.buffered_len() >= self.config.max_buffered_messages {
            warn!(
                session_id = %self.session_id,
                seq = msg.seq_num(),
                max = self.config.max_buffered_messages,
                "gap buffer full, message dropped"
            );
            self.ctx.anomalies.record(AnomalyKind::BufferOverflow);
            return;
        }
        self.buffered.insert(msg.seq_num(), Some(msg));
    }

    fn open_gap(&mut self, expected: u64, received: u64) -> Result<(), SessionError> {
        let end = match self.config.gap_policy {
            GapPolicy::Buffer => received - 1,
            GapPolicy::Drop => received,
        };
        warn!(
            session_id = %self.session_id,
            expected,
            received,
            "sequence gap detected"
        );
        self.gap = Some(GapState {
            begin: expected,
            end,
            requested: false,
        });
        if self.state == SessionState::Active {
            self.state = SessionState::AwaitingResend;
        }
        self.request_gap()
    }

    fn request_gap(&mut self) -> Result<(), SessionError> {
        let Some(gap) = self.gap else {
            return Ok(());
        };
        if gap.requested {
            return Ok(());
        }
        let end = match self.config.gap_policy {
            GapPolicy::Buffer => gap.end,
            GapPolicy::Drop => 0,
        };
        let Some(window) = SequenceWindow::new(gap.begin, end) else {
            return Ok(());
        };

        match self.send_admin(|proxy, seq, sid| {
            proxy.resend_request(seq, window.begin(), window.end(), sid)
        }) {
            Ok(_) => {
                info!(session_id = %self.session_id, window = %window, "resend requested");
                if let Some(gap) = self.gap.as_mut() {
                    gap.requested = true;
                }
                Ok(())
            }
            Err(SessionError::BackPressured) => {
                debug!(session_id = %self.session_id, "resend request back pressured");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn drain_buffered(&mut self) -> Result<(), SessionError> {
        while !self.state.is_disconnected() {
            let expected = self.sequences.expected();
            self.buffered = self.buffered.split_off(&expected);
            let Some(entry) = self.buffered.remove(&expected) else {
                break;
            };
            match entry {
                None => self.accept(expected)?,
                Some(msg) => match self.process(&msg) {
                    Ok(()) => {}
                    Err(SessionError::BackPressured) => {
                        self.buffered.insert(expected, Some(msg));
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                },
            }
        }
        self.update_gap()
    }

    fn update_gap(&mut self) -> Result<(), SessionError> {
        let Some(gap) = self.gap else {
            return Ok(());
        };
        let expected = self.sequences.expected();
        if expected <= gap.end {
            return Ok(());
        }

        self.gap = None;
        if self.state == SessionState::AwaitingResend {
            self.state = SessionState::Active;
        }
        match self.buffered.keys().next().copied() {
            Some(next) => self.open_gap(expected, next),
            None => {
                info!(session_id = %self.session_id, expected, "sequence gap closed");
                Ok(())
            }
        }
    }

    fn start_resend(&mut self, window: SequenceWindow) -> Result<(), SessionError> {
        let last = window.last(self.sequences.last_sent());
        info!(
            session_id = %self.session_id,
            begin = window.begin(),
            end = last,
            "servicing resend request"
        );
        if window.begin() > last {
            return Ok(());
        }

        let stored = self
            .ctx
            .store
            .get_range(self.session_id, window.begin(), last)?;
        self.resend = Some(ResendProgress {
            next: window.begin(),
            end: last,
            stored: stored.into(),
        });
        self.continue_resend()
    }

    fn continue_resend(&mut self) -> Result<(), SessionError> {
        let now = self.now();
        while let Some(progress) = self.resend.as_mut() {
            if progress.next > progress.end {
                debug!(session_id = %self.session_id, "resend complete");
                self.resend = None;
                break;
            }

            let next = progress.next;
            while progress.stored.front().is_some_and(|m| m.seq_num < next) {
                progress.stored.pop_front();
            }
            let result = match progress.stored.front() {
                Some(stored) if stored.seq_num == next => self
                    .proxy
                    .resend(&stored.frame, self.session_id)
                    .map(|_| next + 1),
                upcoming => {
                    let new_seq_no = upcoming.map_or(progress.end + 1, |m| m.seq_num);
                    self.proxy
                        .sequence_reset(next, new_seq_no, true, self.session_id)
                        .map(|_| new_seq_no)
                }
            };

            match result {
                Ok(next) => {
                    progress.next = next;
                    self.heartbeat.on_message_sent(now);
                }
                Err(PublishError::BackPressured) => {
                    debug!(session_id = %self.session_id, seq = next, "resend back pressured");
                    return Ok(());
                }
                Err(e) => {
                    self.resend = None;
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    fn poll_established(&mut self, now: u64) -> Result<(), SessionError> {
        self.request_gap()?;
        self.continue_resend()?;
        self.drain_buffered()?;
        if !self.state.is_established() {
            return Ok(());
        }

        match self.heartbeat.poll(now) {
            HeartbeatAction::Idle => Ok(()),
            HeartbeatAction::SendHeartbeat => {
                self.send_admin(|proxy, seq, sid| proxy.heartbeat(None, seq, sid))?;
                Ok(())
            }
            HeartbeatAction::SendTestRequest => {
                let test_req_id = generate_test_req_id(now);
                self.send_admin(|proxy, seq, sid| proxy.test_request(&test_req_id, seq, sid))?;
                debug!(session_id = %self.session_id, test_req_id, "test request sent");
                self.heartbeat.on_test_request_sent(test_req_id, now);
                Ok(())
            }
            HeartbeatAction::TimedOut => {
                warn!(
                    session_id = %self.session_id,
                    silence_ms = self.heartbeat.silence_ns(now) / 1_000_000,
                    "heartbeat timeout"
                );
                self.send_admin(|proxy, seq, sid| {
                    proxy.logout_with_reason(seq, sid, "heartbeat timeout")
                })?;
                self.disconnect(DisconnectReason::HeartbeatTimeout);
                Ok(())
            }
        }
    }

    fn send_admin<F>(&mut self, send: F) -> Result<Position, SessionError>
    where
        F: FnOnce(&mut P, u64, SessionId) -> Result<Position, PublishError>,
    {
        let seq = self.sequences.next_sender_seq();
        let position = send(&mut self.proxy, seq.value(), self.session_id)?;
        self.sequences.on_sent(seq);
        self.heartbeat.on_message_sent(self.ctx.clock.nanos());
        self.persist()?;
        Ok(position)
    }

    fn accept(&mut self, seq_num: u64) -> Result<(), SessionError> {
        self.sequences.on_received(seq_num);
        self.persist()
    }

    fn persist(&self) -> Result<(), SessionError> {
        if self.session_id != SessionId::UNKNOWN {
            self.ctx
                .store
                .update_sequences(self.session_id, self.sequences.index())?;
        }
        Ok(())
    }

    fn disconnect(&mut self, reason: DisconnectReason) {
        if !self.state.is_disconnected() {
            info!(
                session_id = %self.session_id,
                connection_id = %self.connection_id,
                reason = %reason,
                "session disconnected"
            );
            self.events.push(SessionEvent::Disconnected(reason.clone()));
        }
        self.state = SessionState::Disconnected;
        self.resend = None;
        self.publish_disconnect(reason);
    }

    fn publish_disconnect(&mut self, reason: DisconnectReason) {
        match self.proxy.disconnect(self.connection_id, &reason) {
            Ok(_) => self.pending_disconnect = None,
            Err(PublishError::BackPressured) => self.pending_disconnect = Some(reason),
            Err(e) => {
                error!(
                    connection_id = %self.connection_id,
                    error = %e,
                    "failed to publish disconnect"
                );
                self.pending_disconnect = None;
            }
        }
    }

    fn invalid_state(&self, expected: &str) -> SessionError {
        SessionError::InvalidState {
            expected: expected.to_string(),
            current: self.state.to_string(),
        }
    }

    fn now(&self) -> u64 {
        self.ctx.clock.nanos()
    }
}

impl<P: SessionProxy> ApplicationSender for Session<P> {
    fn session_id(&self) -> SessionId {
        self.session_id
    }

    fn send(
        &mut self,
        msg_type: &MsgType,
        body: &dyn Fn(&mut dyn BodyWriter),
    ) -> Result<Position, SessionError> {
        if !self.state.can_send_application() {
            return Err(self.invalid_state("Active"));
        }

        let seq = self.sequences.next_sender_seq();
        let position = self
            .proxy
            .application(msg_type, seq.value(), self.session_id, body)?;
        self.ctx
            .store
            .store(self.session_id, seq.value(), self.proxy.last_frame())?;
        self.sequences.on_sent(seq);
        self.heartbeat.on_message_sent(self.now());
        self.persist()?;
        debug!(
            session_id = %self.session_id,
            seq = seq.value(),
            msg_type = %msg_type,
            "application message sent"
        );
        Ok(position)
    }
}

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
