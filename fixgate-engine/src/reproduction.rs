/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Reproduction of archived sessions.
//!
//! A run reads a [`ReproductionWindow`] of the durable log and replays it:
//!
//! 1. Records before the window run through a silent framer, which rebuilds
//!    the session id registry, sequence indices and the resend store.
//! 2. Inbound records inside the window are fed, in order, into a fresh
//!    [`Framer`] running the same protocol and application. A manual clock
//!    follows record timestamps, and every logged outbound record triggers a
//!    poll so timer-driven messages fall due at the same instants.
//! 3. Frames the replay produces are captured per connection and compared
//!    with the logged outbound frames after stripping volatile fields. Each
//!    divergence increments the anomaly counter.
//!
//! Connections already open when the window starts cannot be replayed from
//! their first message and are skipped.

use crate::application::Application;
use crate::error::EngineError;
use crate::framer::Framer;
use async_trait::async_trait;
use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};
use fixgate_core::clock::{EpochNanoClock, ManualClock};
use fixgate_core::error::PublishError;
use fixgate_core::message::MsgType;
use fixgate_core::types::{ConnectionId, Position, SessionId};
use fixgate_session::{
    AnomalyCounter, AnomalyHandler, AnomalyKind, AuthenticationStrategy, CapturePublication,
    CapturedFrame, CompositeKey, DisconnectReason, MessageOffsets, Publication, SessionConfig,
    SessionContext, SessionHeader, SessionIdStrategy, SessionIds, SessionParser, SessionProtocol,
};
use fixgate_store::{
    Direction, DurableLog, LogRecord, MemoryStore, MessageStore, RecordKind, ReproductionWindow,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Receives every frame a reproduction run produces.
pub trait ReproductionMessageHandler: Send + Sync + fmt::Debug {
    /// Called once per reproduced outbound frame.
    fn on_message(&self, connection_id: ConnectionId, frame: &[u8]);
}

/// A frame kept by [`StashingMessageHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StashedMessage {
    /// Connection the frame was produced on.
    pub connection_id: ConnectionId,
    /// Frame bytes.
    pub frame: Bytes,
}

/// Handler that stashes reproduced frames on a channel for later inspection.
#[derive(Debug, Clone)]
pub struct StashingMessageHandler {
    tx: Sender<StashedMessage>,
    rx: Receiver<StashedMessage>,
}

impl StashingMessageHandler {
    /// Creates an empty stash.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    /// Removes and returns everything stashed so far.
    #[must_use]
    pub fn drain(&self) -> Vec<StashedMessage> {
        self.rx.try_iter().collect()
    }

    /// Returns a receiver for consuming frames as they arrive.
    #[must_use]
    pub fn receiver(&self) -> Receiver<StashedMessage> {
        self.rx.clone()
    }
}

impl Default for StashingMessageHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ReproductionMessageHandler for StashingMessageHandler {
    fn on_message(&self, connection_id: ConnectionId, frame: &[u8]) {
        // The stash owns a receiver, so the channel never disconnects.
        let _ = self.tx.send(StashedMessage {
            connection_id,
            frame: Bytes::copy_from_slice(frame),
        });
    }
}

/// Outcome of a reproduction run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionStatus {
    /// Records read from the window.
    pub records: usize,
    /// Inbound frames fed to the replay.
    pub replayed: usize,
    /// Outbound frames the replay produced.
    pub captured: usize,
    /// Captured frames equal to their logged counterpart.
    pub matched: usize,
    /// Connections skipped because they were open before the window.
    pub skipped_connections: usize,
    /// Anomalies counted during the run.
    pub anomalies: u64,
}

impl CompletionStatus {
    /// Returns true if the replay reproduced the log without anomalies.
    #[inline]
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.anomalies == 0
    }
}

/// Object-safe entry point used by the engine handle.
#[async_trait]
pub trait ReproductionRunner: Send + Sync {
    /// Runs one reproduction over `window`.
    ///
    /// # Errors
    /// Returns `EngineError::Store` if the log cannot be read.
    async fn run(&self, window: ReproductionWindow) -> Result<CompletionStatus, EngineError>;
}

#[derive(Debug)]
struct ReplayPublication {
    connection_id: ConnectionId,
    capture: CapturePublication,
    handler: Option<Arc<dyn ReproductionMessageHandler>>,
}

impl Publication for ReplayPublication {
    fn publish(
        &self,
        frame: &[u8],
        session_id: SessionId,
        msg_type: &MsgType,
    ) -> Result<Position, PublishError> {
        let position = self.capture.publish(frame, session_id, msg_type)?;
        if let Some(handler) = &self.handler {
            handler.on_message(self.connection_id, frame);
        }
        Ok(position)
    }

    fn publish_disconnect(
        &self,
        connection_id: ConnectionId,
        reason: &DisconnectReason,
    ) -> Result<Position, PublishError> {
        self.capture.publish_disconnect(connection_id, reason)
    }
}

/// Replays durable log windows through a fresh framer.
pub struct ReproductionEngine<P: SessionProtocol, A: Application> {
    protocol: Arc<P>,
    config: Arc<SessionConfig>,
    application: Arc<A>,
    log: Arc<dyn DurableLog>,
    auth: Arc<dyn AuthenticationStrategy>,
    anomaly_handler: Option<Arc<dyn AnomalyHandler>>,
    handler: Option<Arc<dyn ReproductionMessageHandler>>,
}

impl<P: SessionProtocol, A: Application> ReproductionEngine<P, A> {
    /// Creates an engine replaying with `protocol`'s replay variant.
    #[must_use]
    pub fn new(
        protocol: &P,
        config: Arc<SessionConfig>,
        application: Arc<A>,
        log: Arc<dyn DurableLog>,
        auth: Arc<dyn AuthenticationStrategy>,
    ) -> Self {
        Self {
            protocol: Arc::new(protocol.for_replay()),
            config,
            application,
            log,
            auth,
            anomaly_handler: None,
            handler: None,
        }
    }

    /// Reports every anomaly count to `handler`.
    #[must_use]
    pub fn with_anomaly_handler(mut self, handler: Arc<dyn AnomalyHandler>) -> Self {
        self.anomaly_handler = Some(handler);
        self
    }

    /// Hands every reproduced frame to `handler`.
    #[must_use]
    pub fn with_message_handler(mut self, handler: Arc<dyn ReproductionMessageHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Replays `records` on top of the state left by `history`.
    ///
    /// # Errors
    /// Returns `EngineError` if the replay framer fails.
    pub fn replay(
        &self,
        history: &[LogRecord],
        records: &[LogRecord],
    ) -> Result<CompletionStatus, EngineError> {
        let parser = self.protocol.make_parser(SessionId::UNKNOWN);
        let offsets = self.protocol.make_offsets();
        let identity = self.protocol.identity();
        let ids = Arc::new(SessionIds::new());
        let store: Arc<dyn MessageStore> = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            history
                .first()
                .or_else(|| records.first())
                .map_or(0, |record| record.timestamp_ns),
        ));
        let base = SessionContext::new(Arc::clone(&clock) as Arc<dyn EpochNanoClock>)
            .with_ids(ids)
            .with_store(store)
            .with_auth(Arc::clone(&self.auth))
            .with_identity(Arc::clone(&identity));
        let mut replay: Replay<P> = Replay {
            parser,
            identity,
            clock,
            publications: BTreeMap::new(),
        };

        // History runs through its own framer, whose output and anomalies are
        // discarded, so ids, sequences and the resend store end up exactly
        // as the live sessions left them.
        let mut open = BTreeSet::new();
        let mut rebuild = Framer::new(
            Arc::clone(&self.protocol),
            Arc::clone(&self.config),
            base.clone().with_anomalies(Arc::new(AnomalyCounter::new())),
            Arc::clone(&self.application),
        );
        for record in history {
            match record.kind {
                RecordKind::Disconnect { .. } => open.remove(&record.connection_id),
                RecordKind::Message { .. } => open.insert(record.connection_id),
            };
            replay.step(&mut rebuild, record, None)?;
        }
        drop(rebuild);
        replay.publications.clear();

        let anomalies = match &self.anomaly_handler {
            Some(handler) => AnomalyCounter::new().with_handler(Arc::clone(handler)),
            None => AnomalyCounter::new(),
        };
        let anomalies = Arc::new(anomalies);
        let mut framer = Framer::new(
            Arc::clone(&self.protocol),
            Arc::clone(&self.config),
            base.with_anomalies(Arc::clone(&anomalies)),
            Arc::clone(&self.application),
        );

        let mut status = CompletionStatus {
            records: records.len(),
            skipped_connections: open.len(),
            ..CompletionStatus::default()
        };
        let mut expected: BTreeMap<ConnectionId, Vec<Bytes>> = BTreeMap::new();

        for record in records {
            if open.contains(&record.connection_id) {
                continue;
            }
            if record.is_outbound_message() {
                expected
                    .entry(record.connection_id)
                    .or_default()
                    .push(record.body.clone());
            }
            if replay.step(&mut framer, record, self.handler.as_ref())? {
                status.replayed += 1;
            }
        }

        for (connection_id, logged) in &expected {
            let captured = replay
                .publications
                .get(connection_id)
                .map(|publication| publication.capture.drain())
                .unwrap_or_default();
            status.captured += captured.len();
            status.matched += compare(
                *connection_id,
                logged,
                &captured,
                &offsets,
                &anomalies,
            );
        }
        for (connection_id, publication) in &replay.publications {
            if !expected.contains_key(connection_id) {
                let captured = publication.capture.drain();
                status.captured += captured.len();
                status.matched += compare(*connection_id, &[], &captured, &offsets, &anomalies);
            }
        }

        status.anomalies = anomalies.count();
        Ok(status)
    }
}

/// Feeds logged records into a framer the way live traffic reached it.
struct Replay<P: SessionProtocol> {
    parser: P::Parser,
    identity: Arc<dyn SessionIdStrategy>,
    clock: Arc<ManualClock>,
    publications: BTreeMap<ConnectionId, Arc<ReplayPublication>>,
}

impl<P: SessionProtocol> Replay<P> {
    /// Applies one record. Returns true if it was an inbound frame.
    fn step<A: Application>(
        &mut self,
        framer: &mut Framer<P, A>,
        record: &LogRecord,
        handler: Option<&Arc<dyn ReproductionMessageHandler>>,
    ) -> Result<bool, EngineError> {
        let connection_id = record.connection_id;
        self.clock.set(record.timestamp_ns);

        match (&record.kind, record.direction) {
            (RecordKind::Message { .. }, Direction::Inbound) => {
                if !framer.contains(connection_id) {
                    let publication = self.publication(connection_id, handler);
                    framer.accept(connection_id, publication)?;
                }
                framer.on_frame(connection_id, &record.body)?;
                Ok(true)
            }
            (RecordKind::Message { msg_type }, Direction::Outbound) => {
                if framer.contains(connection_id) {
                    framer.poll()?;
                    return Ok(false);
                }
                let key = (*msg_type == MsgType::Logon)
                    .then(|| self.parser.parse(&record.body).ok())
                    .flatten()
                    .and_then(|msg| {
                        logon_key(self.identity.as_ref(), Direction::Outbound, &msg.header)
                    });
                if let Some(key) = key {
                    let publication = self.publication(connection_id, handler);
                    framer.initiate(connection_id, key, publication)?;
                }
                Ok(false)
            }
            (RecordKind::Disconnect { .. }, Direction::Inbound) => {
                framer.on_transport_closed(connection_id)?;
                Ok(false)
            }
            (RecordKind::Disconnect { .. }, Direction::Outbound) => Ok(false),
        }
    }

    fn publication(
        &mut self,
        connection_id: ConnectionId,
        handler: Option<&Arc<dyn ReproductionMessageHandler>>,
    ) -> Arc<dyn Publication> {
        let publication = self.publications.entry(connection_id).or_insert_with(|| {
            Arc::new(ReplayPublication {
                connection_id,
                capture: CapturePublication::new(),
                handler: handler.cloned(),
            })
        });
        Arc::clone(publication) as Arc<dyn Publication>
    }
}

#[async_trait]
impl<P: SessionProtocol, A: Application> ReproductionRunner for ReproductionEngine<P, A> {
    async fn run(&self, window: ReproductionWindow) -> Result<CompletionStatus, EngineError> {
        let history = match window.preceding() {
            Some(preceding) => self.log.read_window(preceding).await?,
            None => Vec::new(),
        };
        let records = self.log.read_window(window).await?;
        info!(
            start_ns = window.start_ns(),
            end_ns = window.end_ns(),
            history = history.len(),
            records = records.len(),
            protocol = self.protocol.name(),
            "reproduction started"
        );

        let status = self.replay(&history, &records)?;
        if status.is_clean() {
            info!(
                replayed = status.replayed,
                matched = status.matched,
                "reproduction completed"
            );
        } else {
            warn!(
                replayed = status.replayed,
                matched = status.matched,
                anomalies = status.anomalies,
                "reproduction diverged"
            );
        }
        Ok(status)
    }
}

impl<P: SessionProtocol, A: Application> fmt::Debug for ReproductionEngine<P, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReproductionEngine")
            .field("protocol", &self.protocol.name())
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}

/// Derives the composite key of a logged Logon.
///
/// Outbound Logons carry our ids as sender, so the header is mirrored before
/// asking the identity strategy.
fn logon_key(
    identity: &dyn SessionIdStrategy,
    direction: Direction,
    header: &SessionHeader,
) -> Option<CompositeKey> {
    match direction {
        Direction::Inbound => identity.on_logon(header),
        Direction::Outbound => {
            let mirrored = SessionHeader {
                sender_comp_id: header.target_comp_id,
                target_comp_id: header.sender_comp_id,
                sender_sub_id: header.target_sub_id,
                target_sub_id: header.sender_sub_id,
                ..header.clone()
            };
            identity.on_logon(&mirrored)
        }
    }
}

fn compare<O: MessageOffsets>(
    connection_id: ConnectionId,
    logged: &[Bytes],
    captured: &[CapturedFrame],
    offsets: &O,
    anomalies: &AnomalyCounter,
) -> usize {
    let mut matched = 0;
    for index in 0..logged.len().max(captured.len()) {
        match (logged.get(index), captured.get(index)) {
            (Some(original), Some(replayed)) => {
                if offsets.strip_volatile(original) == offsets.strip_volatile(&replayed.bytes) {
                    matched += 1;
                } else {
                    warn!(%connection_id, index, msg_type = %replayed.msg_type, "reproduced frame differs");
                    anomalies.record(AnomalyKind::ReproductionMismatch);
                }
            }
            (Some(_), None) => {
                debug!(%connection_id, index, "logged frame was not reproduced");
                anomalies.record(AnomalyKind::MissingOutput);
            }
            (None, Some(replayed)) => {
                debug!(%connection_id, index, msg_type = %replayed.msg_type, "unexpected reproduced frame");
                anomalies.record(AnomalyKind::UnexpectedOutput);
            }
            (None, None) => {}
        }
    }
    matched
}
