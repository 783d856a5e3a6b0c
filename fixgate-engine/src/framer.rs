/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Per-connection session driving.
//!
//! The [`Framer`] owns every session of one processing context. It parses
//! inbound frames, archives them, feeds the state machine, and turns queued
//! [`SessionEvent`]s into [`Application`] callbacks. The live engine and each
//! reproduction run own one framer each.
//!
//! Inputs refused with [`SessionError::BackPressured`] stay at the head of
//! the connection's backlog, and later inputs queue behind them. The backlog
//! is offered again on the next inbound frame and on every [`Framer::poll`].

use crate::application::Application;
use crate::error::EngineError;
use crate::publication::LogHealth;
use bytes::Bytes;
use fixgate_core::error::{DecodeError, SessionError};
use fixgate_core::message::MsgType;
use fixgate_core::types::{ConnectionId, SessionId};
use fixgate_session::{
    CompositeKey, MessageOffsets, Publication, Session, SessionConfig, SessionContext,
    SessionEvent, SessionMessage, SessionParser, SessionProtocol, SessionProxy,
};
use fixgate_store::{Direction, DurableLog, LogRecord};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Work waiting for its turn on a session.
#[derive(Debug)]
enum Input {
    Logon,
    Message(SessionMessage),
    Undecodable {
        seq_num: Option<u64>,
        error: DecodeError,
    },
    Logout(Option<String>),
}

impl Input {
    fn apply<S: SessionProxy>(&self, session: &mut Session<S>) -> Result<(), SessionError> {
        match self {
            Self::Logon => session.send_logon().map(|_| ()),
            Self::Message(msg) => session.on_message(msg.clone()),
            Self::Undecodable { seq_num, error } => session.on_decode_error(*seq_num, error),
            Self::Logout(Some(text)) => session.start_logout_with_reason(text).map(|_| ()),
            Self::Logout(None) => session.start_logout().map(|_| ()),
        }
    }
}

struct Connection<P: SessionProtocol> {
    session: Session<P::Proxy>,
    parser: P::Parser,
    backlog: VecDeque<Input>,
}

impl<P: SessionProtocol> Connection<P> {
    fn new(session: Session<P::Proxy>, parser: P::Parser) -> Self {
        Self {
            session,
            parser,
            backlog: VecDeque::new(),
        }
    }

    /// Offers the backlog in order until it empties or back pressure returns.
    fn drain<A: Application>(&mut self, application: &A, connection_id: ConnectionId) {
        while let Some(input) = self.backlog.front() {
            if self.session.state().is_disconnected() {
                debug!(%connection_id, discarded = self.backlog.len(), "backlog dropped after disconnect");
                self.backlog.clear();
                break;
            }
            match input.apply(&mut self.session) {
                Err(SessionError::BackPressured) => {
                    debug!(%connection_id, backlog = self.backlog.len(), "back pressured, input kept");
                    break;
                }
                result => {
                    self.backlog.pop_front();
                    report(connection_id, result);
                }
            }
            dispatch(application, &mut self.session);
        }
        dispatch(application, &mut self.session);
    }

    fn is_finished(&self) -> bool {
        self.session.state().is_disconnected() && !self.session.has_pending_disconnect()
    }
}

struct Archive {
    log: Arc<dyn DurableLog>,
    health: Arc<LogHealth>,
    mask_passwords: bool,
}

/// Drives the sessions of one processing context.
pub struct Framer<P: SessionProtocol, A: Application> {
    protocol: Arc<P>,
    offsets: P::Offsets,
    config: Arc<SessionConfig>,
    ctx: SessionContext,
    application: Arc<A>,
    archive: Option<Archive>,
    connections: HashMap<ConnectionId, Connection<P>>,
}

impl<P: SessionProtocol, A: Application> Framer<P, A> {
    /// Creates a framer that does not archive inbound frames.
    #[must_use]
    pub fn new(
        protocol: Arc<P>,
        config: Arc<SessionConfig>,
        ctx: SessionContext,
        application: Arc<A>,
    ) -> Self {
        let offsets = protocol.make_offsets();
        Self {
            protocol,
            offsets,
            config,
            ctx,
            application,
            archive: None,
            connections: HashMap::new(),
        }
    }

    /// Archives inbound frames to `log`, masking logon passwords if asked.
    ///
    /// `health` is shared with the connections' publications.
    #[must_use]
    pub fn with_archive(
        mut self,
        log: Arc<dyn DurableLog>,
        health: Arc<LogHealth>,
        mask_passwords: bool,
    ) -> Self {
        self.archive = Some(Archive {
            log,
            health,
            mask_passwords,
        });
        self
    }

    /// Returns the shared session context.
    #[must_use]
    pub const fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Returns the number of connections with a session.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns true if no connection has a session.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Returns true if `connection_id` has a session.
    #[must_use]
    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains_key(&connection_id)
    }

    /// Returns the session bound to a connection.
    #[must_use]
    pub fn session(&self, connection_id: ConnectionId) -> Option<&Session<P::Proxy>> {
        self.connections.get(&connection_id).map(|c| &c.session)
    }

    /// Returns how many inputs of a connection wait on back pressure.
    #[must_use]
    pub fn backlog_len(&self, connection_id: ConnectionId) -> usize {
        self.connections
            .get(&connection_id)
            .map_or(0, |c| c.backlog.len())
    }

    /// Binds an acceptor session to a new inbound connection.
    ///
    /// # Errors
    /// Returns `EngineError::DuplicateConnection` if the connection already has one.
    pub fn accept(
        &mut self,
        connection_id: ConnectionId,
        publication: Arc<dyn Publication>,
    ) -> Result<(), EngineError> {
        if self.contains(connection_id) {
            return Err(EngineError::DuplicateConnection(connection_id));
        }
        let proxy = self
            .protocol
            .make_proxy(publication, Arc::clone(&self.ctx.clock));
        let session = Session::acceptor(
            Arc::clone(&self.config),
            self.ctx.clone(),
            connection_id,
            proxy,
        );
        let parser = self.protocol.make_parser(SessionId::UNKNOWN);
        self.connections
            .insert(connection_id, Connection::new(session, parser));
        debug!(%connection_id, protocol = self.protocol.name(), "acceptor session created");
        Ok(())
    }

    /// Binds an initiator session for `key` to an outbound connection and
    /// sends its Logon.
    ///
    /// # Errors
    /// Returns `EngineError::DuplicateConnection` if the connection already
    /// has a session.
    pub fn initiate(
        &mut self,
        connection_id: ConnectionId,
        key: CompositeKey,
        publication: Arc<dyn Publication>,
    ) -> Result<(), EngineError> {
        if self.contains(connection_id) {
            return Err(EngineError::DuplicateConnection(connection_id));
        }
        let proxy = self
            .protocol
            .make_proxy(publication, Arc::clone(&self.ctx.clock));
        let session = Session::initiator(
            Arc::clone(&self.config),
            self.ctx.clone(),
            connection_id,
            key,
            proxy,
        );
        let parser = self.protocol.make_parser(session.session_id());
        let connection = self
            .connections
            .entry(connection_id)
            .or_insert_with(|| Connection::new(session, parser));
        connection.backlog.push_back(Input::Logon);
        connection.drain(self.application.as_ref(), connection_id);
        self.check_health()
    }

    /// Handles one complete inbound frame.
    ///
    /// Every parsable Logon registers its composite key here, before the
    /// state machine decides on it, so a replay of the same frames allocates
    /// the same session ids.
    ///
    /// # Errors
    /// - `EngineError::UnknownConnection`: no session is bound to the connection
    /// - `EngineError::Store`: the frame could not be archived
    pub fn on_frame(&mut self, connection_id: ConnectionId, frame: &[u8]) -> Result<(), EngineError> {
        let Some(connection) = self.connections.get_mut(&connection_id) else {
            return Err(EngineError::UnknownConnection(connection_id));
        };
        let parsed = connection.parser.parse(frame);
        let session_id = inbound_session_id(&self.ctx, &connection.session, &parsed);

        if let Some(archive) = &self.archive {
            let msg_type = match &parsed {
                Ok(msg) => msg.header.msg_type.clone(),
                Err(_) => self
                    .offsets
                    .msg_type(frame)
                    .unwrap_or_else(|| MsgType::Custom(String::new())),
            };
            let body = match self.offsets.mask_credentials(frame) {
                Some(masked) if archive.mask_passwords => Bytes::from(masked),
                _ => Bytes::copy_from_slice(frame),
            };
            archive.log.append(LogRecord::message(
                self.ctx.clock.nanos(),
                Direction::Inbound,
                connection_id,
                session_id,
                msg_type,
                body,
            ))?;
        }

        let input = match parsed {
            Ok(msg) => Input::Message(msg),
            Err(error) => Input::Undecodable {
                seq_num: self.offsets.seq_num(frame),
                error,
            },
        };
        connection.backlog.push_back(input);
        connection.drain(self.application.as_ref(), connection_id);
        self.check_health()
    }

    /// Handles the transport closing underneath a session.
    ///
    /// # Errors
    /// Returns `EngineError::Store` if the close could not be archived.
    pub fn on_transport_closed(&mut self, connection_id: ConnectionId) -> Result<(), EngineError> {
        let Some(mut connection) = self.connections.remove(&connection_id) else {
            return Ok(());
        };
        if let Some(archive) = &self.archive {
            let mut record = LogRecord::disconnect(
                self.ctx.clock.nanos(),
                connection_id,
                connection.session.session_id(),
                "transport closed",
            );
            record.direction = Direction::Inbound;
            archive.log.append(record)?;
        }
        if !connection.backlog.is_empty() {
            warn!(%connection_id, discarded = connection.backlog.len(), "transport closed with inputs pending");
        }
        connection.session.terminate("transport closed");
        dispatch(self.application.as_ref(), &mut connection.session);
        info!(%connection_id, "transport closed");
        self.check_health()
    }

    /// Starts the logout handshake on a connection.
    ///
    /// # Errors
    /// Returns `EngineError::UnknownConnection` if no session is bound.
    pub fn logout(&mut self, connection_id: ConnectionId, reason: Option<&str>) -> Result<(), EngineError> {
        let Some(connection) = self.connections.get_mut(&connection_id) else {
            return Err(EngineError::UnknownConnection(connection_id));
        };
        connection
            .backlog
            .push_back(Input::Logout(reason.map(str::to_string)));
        connection.drain(self.application.as_ref(), connection_id);
        self.check_health()
    }

    /// Retries back pressured inputs, drives the timers of every session and
    /// drops sessions that are disconnected with nothing left to publish.
    ///
    /// # Errors
    /// Returns `EngineError::Store` if the durable log failed.
    pub fn poll(&mut self) -> Result<(), EngineError> {
        let application = self.application.as_ref();
        for (connection_id, connection) in &mut self.connections {
            connection.drain(application, *connection_id);
            if !connection.backlog.is_empty() {
                continue;
            }
            match connection.session.poll() {
                Ok(()) | Err(SessionError::BackPressured) => {}
                Err(e) => warn!(%connection_id, error = %e, "session poll failed"),
            }
            dispatch(application, &mut connection.session);
        }
        self.connections.retain(|_, connection| !connection.is_finished());
        self.check_health()
    }

    fn check_health(&self) -> Result<(), EngineError> {
        match self.archive.as_ref().and_then(|archive| archive.health.take()) {
            Some(err) => Err(EngineError::Store(err)),
            None => Ok(()),
        }
    }
}

/// Resolves the session an inbound frame belongs to before the state
/// machine has seen it, so an acceptor's Logon is archived under its id.
fn inbound_session_id<S: SessionProxy>(
    ctx: &SessionContext,
    session: &Session<S>,
    parsed: &Result<SessionMessage, DecodeError>,
) -> SessionId {
    if session.session_id() != SessionId::UNKNOWN {
        return session.session_id();
    }
    match parsed {
        Ok(msg) if msg.header.msg_type == MsgType::Logon => ctx
            .identity
            .on_logon(&msg.header)
            .map_or(SessionId::UNKNOWN, |key| ctx.ids.on_logon(key)),
        _ => SessionId::UNKNOWN,
    }
}

fn report(connection_id: ConnectionId, result: Result<(), SessionError>) {
    match result {
        Ok(()) => {}
        Err(e @ SessionError::LogonRejected { .. }) => {
            info!(%connection_id, error = %e, "logon rejected");
        }
        Err(e) => warn!(%connection_id, error = %e, "session error"),
    }
}

fn dispatch<A, S>(application: &A, session: &mut Session<S>)
where
    A: Application,
    S: SessionProxy,
{
    for event in session.take_events() {
        let session_id = session.session_id();
        match event {
            SessionEvent::LoggedOn => application.on_logon(session_id),
            SessionEvent::LoggedOut => application.on_logout(session_id),
            SessionEvent::Disconnected(reason) => application.on_disconnect(session_id, &reason),
            SessionEvent::Message(message) => {
                if let Err(e) = application.on_message(&mut *session, &message) {
                    warn!(%session_id, error = %e, "application failed to handle message");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publication::LogPublication;
    use fixgate_core::clock::ManualClock;
    use fixgate_core::types::{CompId, Position};
    use fixgate_session::{
        ApplicationSender, CapturePublication, DisconnectReason, FixProtocol, SessionState,
    };
    use fixgate_store::{MemoryLog, RecordKind};
    use parking_lot::Mutex;

    const T0: u64 = 1_791_000_000_000_000_000;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl Application for Recorder {
        fn on_logon(&self, session_id: SessionId) {
            self.calls.lock().push(format!("logon {session_id}"));
        }

        fn on_disconnect(&self, _session_id: SessionId, reason: &DisconnectReason) {
            self.calls.lock().push(format!("disconnect {reason}"));
        }

        fn on_message(
            &self,
            sender: &mut dyn ApplicationSender,
            message: &fixgate_core::message::OwnedMessage,
        ) -> Result<(), SessionError> {
            let cl_ord_id = message.get_field_str(11).unwrap_or_default().to_string();
            self.calls.lock().push(format!("order {cl_ord_id}"));
            sender.send(&MsgType::ExecutionReport, &|body| {
                body.put_str(11, &cl_ord_id);
                body.put_char(150, '0');
            })?;
            Ok(())
        }
    }

    struct Client {
        proxy: fixgate_session::FixProxy,
        seq: u64,
    }

    impl Client {
        fn new(protocol: &FixProtocol, clock: Arc<ManualClock>) -> Self {
            let mut proxy = protocol.make_proxy(Arc::new(CapturePublication::new()), clock);
            proxy.set_session(
                SessionId::new(1),
                CompositeKey::new(CompId::new("CLIENT").unwrap(), CompId::new("GW").unwrap()),
            );
            Self { proxy, seq: 0 }
        }

        fn logon(&mut self) -> Vec<u8> {
            self.seq += 1;
            self.proxy.logon(30, self.seq, SessionId::new(1), false).unwrap();
            self.proxy.last_frame().to_vec()
        }

        fn test_request(&mut self, id: &str) -> Vec<u8> {
            self.seq += 1;
            self.proxy.test_request(id, self.seq, SessionId::new(1)).unwrap();
            self.proxy.last_frame().to_vec()
        }

        fn order(&mut self, cl_ord_id: &str) -> Vec<u8> {
            self.seq += 1;
            self.proxy
                .application(&MsgType::NewOrderSingle, self.seq, SessionId::new(1), &|body| {
                    body.put_str(11, cl_ord_id);
                })
                .unwrap();
            self.proxy.last_frame().to_vec()
        }
    }

    struct Harness {
        framer: Framer<FixProtocol, Recorder>,
        app: Arc<Recorder>,
        log: Arc<MemoryLog>,
        clock: Arc<ManualClock>,
        protocol: FixProtocol,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(T0));
        let protocol = FixProtocol::new("FIX.4.4");
        let config = SessionConfig::new(CompId::new("GW").unwrap(), "FIX.4.4");
        let app = Arc::new(Recorder::default());
        let log = Arc::new(MemoryLog::new());
        let framer = Framer::new(
            Arc::new(protocol.clone()),
            Arc::new(config),
            SessionContext::new(clock.clone()),
            app.clone(),
        )
        .with_archive(log.clone(), Arc::new(LogHealth::new()), true);
        Harness {
            framer,
            app,
            log,
            clock,
            protocol,
        }
    }

    fn log_publication(h: &Harness, connection_id: ConnectionId) -> Arc<dyn Publication> {
        Arc::new(LogPublication::new(
            h.log.clone(),
            h.clock.clone(),
            Arc::new(LogHealth::new()),
            connection_id,
        ))
    }

    #[test]
    fn test_logon_and_order_are_archived_and_answered() {
        let mut h = harness();
        let cid = ConnectionId::new(1);
        let publication = log_publication(&h, cid);
        h.framer.accept(cid, publication).unwrap();

        let mut client = Client::new(&h.protocol, h.clock.clone());
        h.framer.on_frame(cid, &client.logon()).unwrap();
        h.framer.on_frame(cid, &client.order("ORD-1")).unwrap();

        let session = h.framer.session(cid).unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.last_received(), 2);

        let records = h.log.records();
        let directions: Vec<_> = records.iter().map(|r| r.direction).collect();
        assert_eq!(
            directions,
            vec![
                Direction::Inbound,
                Direction::Outbound,
                Direction::Inbound,
                Direction::Outbound
            ]
        );
        assert_eq!(records[0].msg_type(), Some(&MsgType::Logon));
        assert_eq!(records[0].session_id, session.session_id());
        assert_eq!(records[3].msg_type(), Some(&MsgType::ExecutionReport));

        let calls = h.app.calls.lock().clone();
        assert_eq!(calls, vec![format!("logon {}", session.session_id()), "order ORD-1".to_string()]);
    }

    #[test]
    fn test_unknown_connection() {
        let mut h = harness();
        assert!(matches!(
            h.framer.on_frame(ConnectionId::new(5), b"8=FIX.4.4\x01"),
            Err(EngineError::UnknownConnection(_))
        ));
    }

    #[test]
    fn test_duplicate_connection() {
        let mut h = harness();
        let cid = ConnectionId::new(1);
        h.framer.accept(cid, log_publication(&h, cid)).unwrap();
        assert!(matches!(
            h.framer.accept(cid, log_publication(&h, cid)),
            Err(EngineError::DuplicateConnection(_))
        ));
    }

    #[test]
    fn test_transport_close_is_archived_and_reported() {
        let mut h = harness();
        let cid = ConnectionId::new(1);
        h.framer.accept(cid, log_publication(&h, cid)).unwrap();
        let mut client = Client::new(&h.protocol, h.clock.clone());
        h.framer.on_frame(cid, &client.logon()).unwrap();

        h.framer.on_transport_closed(cid).unwrap();
        assert!(h.framer.is_empty());

        let closed = h
            .log
            .records()
            .into_iter()
            .find(|r| r.direction == Direction::Inbound && r.msg_type().is_none())
            .unwrap();
        assert_eq!(
            closed.kind,
            RecordKind::Disconnect {
                reason: "transport closed".to_string()
            }
        );
        assert!(
            h.app
                .calls
                .lock()
                .contains(&"disconnect transport closed".to_string())
        );
    }

    #[test]
    fn test_poll_drops_disconnected_sessions() {
        let mut h = harness();
        let cid = ConnectionId::new(1);
        h.framer.accept(cid, log_publication(&h, cid)).unwrap();

        h.clock.advance(11_000_000_000);
        h.framer.poll().unwrap();
        assert!(!h.framer.contains(cid));
        assert!(
            h.app
                .calls
                .lock()
                .contains(&"disconnect logon timeout".to_string())
        );
    }

    #[test]
    fn test_store_failure_in_publication_is_fatal() {
        #[derive(Debug)]
        struct BrokenLog;

        #[async_trait::async_trait]
        impl DurableLog for BrokenLog {
            fn append(&self, _record: LogRecord) -> Result<Position, fixgate_core::error::StoreError> {
                Err(fixgate_core::error::StoreError::AppendFailed {
                    reason: "disk full".to_string(),
                })
            }

            async fn read_window(
                &self,
                _window: fixgate_store::ReproductionWindow,
            ) -> Result<Vec<LogRecord>, fixgate_core::error::StoreError> {
                Ok(Vec::new())
            }

            fn next_position(&self) -> Position {
                Position::default()
            }
        }

        let clock = Arc::new(ManualClock::new(T0));
        let protocol = FixProtocol::new("FIX.4.4");
        let health = Arc::new(LogHealth::new());
        let mut framer = Framer::new(
            Arc::new(protocol.clone()),
            Arc::new(SessionConfig::new(CompId::new("GW").unwrap(), "FIX.4.4")),
            SessionContext::new(clock.clone()),
            Arc::new(Recorder::default()),
        )
        .with_archive(Arc::new(MemoryLog::new()), health.clone(), false);

        let cid = ConnectionId::new(1);
        let publication = Arc::new(LogPublication::new(
            Arc::new(BrokenLog),
            clock.clone(),
            health,
            cid,
        ));
        framer.accept(cid, publication).unwrap();

        let mut client = Client::new(&protocol, clock);
        let result = framer.on_frame(cid, &client.logon());
        assert!(matches!(result, Err(EngineError::Store(_))));
    }

    #[test]
    fn test_back_pressured_inputs_are_retried_in_order() {
        let mut h = harness();
        let cid = ConnectionId::new(1);
        let capture = Arc::new(CapturePublication::new());
        h.framer.accept(cid, capture.clone()).unwrap();

        let mut client = Client::new(&h.protocol, h.clock.clone());
        h.framer.on_frame(cid, &client.logon()).unwrap();

        capture.back_pressure_next(2);
        h.framer.on_frame(cid, &client.test_request("ABC")).unwrap();
        assert_eq!(h.framer.backlog_len(cid), 1);
        h.framer.on_frame(cid, &client.order("ORD-1")).unwrap();
        assert_eq!(h.framer.backlog_len(cid), 2);
        assert_eq!(h.framer.session(cid).unwrap().last_received(), 1);

        h.framer.poll().unwrap();
        assert_eq!(h.framer.backlog_len(cid), 0);

        let session = h.framer.session(cid).unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.last_received(), 3);
        assert_eq!(
            capture.msg_types(),
            vec![MsgType::Logon, MsgType::Heartbeat, MsgType::ExecutionReport]
        );
        let heartbeat = String::from_utf8_lossy(&capture.frames()[1].bytes).into_owned();
        assert!(heartbeat.contains("\x01112=ABC\x01"));
        assert!(h.app.calls.lock().contains(&"order ORD-1".to_string()));
    }

    #[test]
    fn test_disconnected_session_kept_until_notice_published() {
        let mut h = harness();
        let cid = ConnectionId::new(1);
        let capture = Arc::new(CapturePublication::new());
        h.framer.accept(cid, capture.clone()).unwrap();

        h.clock.advance(11_000_000_000);
        capture.back_pressure_next(1);
        h.framer.poll().unwrap();
        assert!(h.framer.contains(cid));
        assert!(h.framer.session(cid).unwrap().state().is_disconnected());
        assert!(capture.disconnects().is_empty());

        h.framer.poll().unwrap();
        assert!(!h.framer.contains(cid));
        assert_eq!(
            capture.disconnects(),
            vec![(cid, DisconnectReason::LogonTimeout)]
        );
    }

    #[test]
    fn test_rejected_logon_still_registers_its_key() {
        let mut h = harness();
        let rejected = ConnectionId::new(1);
        let accepted = ConnectionId::new(2);
        h.framer.accept(rejected, log_publication(&h, rejected)).unwrap();
        h.framer.accept(accepted, log_publication(&h, accepted)).unwrap();

        let mut stranger = Client::new(&h.protocol, h.clock.clone());
        stranger.proxy.set_session(
            SessionId::new(1),
            CompositeKey::new(CompId::new("CLIENT").unwrap(), CompId::new("OTHER").unwrap()),
        );
        h.framer.on_frame(rejected, &stranger.logon()).unwrap();
        assert!(h.framer.session(rejected).unwrap().state().is_disconnected());

        let mut client = Client::new(&h.protocol, h.clock.clone());
        h.framer.on_frame(accepted, &client.logon()).unwrap();

        let records = h.log.records();
        assert_eq!(records[0].session_id, SessionId::new(1));
        assert_eq!(h.framer.session(accepted).unwrap().session_id(), SessionId::new(2));
        assert_eq!(h.framer.context().ids.len(), 2);
    }
}
