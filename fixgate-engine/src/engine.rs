/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! The engine task and its handle.
//!
//! One tokio task owns the live [`Framer`]. Transports talk to it through an
//! [`EngineHandle`] over a bounded command channel, and a periodic tick
//! drives session timers while the wire is silent. Reproduction runs on
//! separately spawned tasks, one at a time.

use crate::application::Application;
use crate::error::EngineError;
use crate::framer::Framer;
use crate::publication::{LogHealth, LogPublication, Outbound};
use crate::reply::{Reply, ReplySender};
use crate::reproduction::{CompletionStatus, ReproductionRunner};
use bytes::Bytes;
use fixgate_core::clock::EpochNanoClock;
use fixgate_core::types::ConnectionId;
use fixgate_session::{CompositeKey, SessionProtocol};
use fixgate_store::{DurableLog, ReproductionWindow};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

enum Command {
    Accept {
        connection_id: ConnectionId,
        transport: mpsc::Sender<Outbound>,
    },
    Initiate {
        connection_id: ConnectionId,
        key: CompositeKey,
        transport: mpsc::Sender<Outbound>,
    },
    Frame {
        connection_id: ConnectionId,
        frame: Bytes,
    },
    TransportClosed {
        connection_id: ConnectionId,
    },
    Logout {
        connection_id: ConnectionId,
        reason: Option<String>,
    },
    Shutdown {
        done: ReplySender<()>,
    },
}

/// A configured engine, ready to be spawned.
pub struct Engine<P: SessionProtocol, A: Application> {
    pub(crate) framer: Framer<P, A>,
    pub(crate) reproduction: Arc<dyn ReproductionRunner>,
    pub(crate) log: Arc<dyn DurableLog>,
    pub(crate) clock: Arc<dyn EpochNanoClock>,
    pub(crate) health: Arc<LogHealth>,
    pub(crate) poll_interval: Duration,
    pub(crate) command_capacity: usize,
    pub(crate) outbound_capacity: usize,
}

impl<P: SessionProtocol, A: Application> Engine<P, A> {
    /// Spawns the engine task on the current tokio runtime.
    #[must_use]
    pub fn spawn(self) -> (EngineHandle, JoinHandle<Result<(), EngineError>>) {
        let (tx, rx) = mpsc::channel(self.command_capacity);
        let handle = EngineHandle {
            commands: tx,
            reproduction: Arc::clone(&self.reproduction),
            reproducing: Arc::new(AtomicBool::new(false)),
            next_connection: Arc::new(AtomicU64::new(1)),
            outbound_capacity: self.outbound_capacity,
        };
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) -> Result<(), EngineError> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(poll_interval_ms = self.poll_interval.as_millis() as u64, "engine started");

        loop {
            let result = tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown { done }) => {
                        let flushed = self.log.flush().await;
                        done.send(flushed.clone().map_err(EngineError::from));
                        info!("engine stopped");
                        return flushed.map_err(EngineError::from);
                    }
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = ticker.tick() => self.framer.poll(),
            };

            match result {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "engine stopped on fatal error");
                    return Err(e);
                }
                Err(e) => warn!(error = %e, "engine command failed"),
            }
        }

        self.log.flush().await?;
        info!("engine stopped, all handles dropped");
        Ok(())
    }

    fn handle(&mut self, command: Command) -> Result<(), EngineError> {
        match command {
            Command::Accept {
                connection_id,
                transport,
            } => {
                let publication = self.publication(connection_id, transport);
                self.framer.accept(connection_id, publication)
            }
            Command::Initiate {
                connection_id,
                key,
                transport,
            } => {
                let publication = self.publication(connection_id, transport);
                self.framer.initiate(connection_id, key, publication)
            }
            Command::Frame {
                connection_id,
                frame,
            } => self.framer.on_frame(connection_id, &frame),
            Command::TransportClosed { connection_id } => {
                self.framer.on_transport_closed(connection_id)
            }
            Command::Logout {
                connection_id,
                reason,
            } => self.framer.logout(connection_id, reason.as_deref()),
            Command::Shutdown { .. } => Ok(()),
        }
    }

    fn publication(
        &self,
        connection_id: ConnectionId,
        transport: mpsc::Sender<Outbound>,
    ) -> Arc<LogPublication> {
        Arc::new(
            LogPublication::new(
                Arc::clone(&self.log),
                Arc::clone(&self.clock),
                Arc::clone(&self.health),
                connection_id,
            )
            .with_transport(transport),
        )
    }
}

impl<P: SessionProtocol, A: Application> fmt::Debug for Engine<P, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("sessions", &self.framer.len())
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

/// Cloneable handle to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    reproduction: Arc<dyn ReproductionRunner>,
    reproducing: Arc<AtomicBool>,
    next_connection: Arc<AtomicU64>,
    outbound_capacity: usize,
}

impl EngineHandle {
    /// Allocates a connection id unique to this engine.
    #[must_use]
    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_connection.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates the channel a connection's writer task drains.
    #[must_use]
    pub fn transport_channel(&self) -> (mpsc::Sender<Outbound>, mpsc::Receiver<Outbound>) {
        mpsc::channel(self.outbound_capacity)
    }

    /// Registers an inbound connection; its session waits for a Logon.
    ///
    /// # Errors
    /// Returns `EngineError::Closed` if the engine has stopped.
    pub async fn accept(
        &self,
        connection_id: ConnectionId,
        transport: mpsc::Sender<Outbound>,
    ) -> Result<(), EngineError> {
        self.send(Command::Accept {
            connection_id,
            transport,
        })
        .await
    }

    /// Registers an outbound connection and logs on as `key`.
    ///
    /// # Errors
    /// Returns `EngineError::Closed` if the engine has stopped.
    pub async fn initiate(
        &self,
        connection_id: ConnectionId,
        key: CompositeKey,
        transport: mpsc::Sender<Outbound>,
    ) -> Result<(), EngineError> {
        self.send(Command::Initiate {
            connection_id,
            key,
            transport,
        })
        .await
    }

    /// Delivers one complete inbound frame.
    ///
    /// # Errors
    /// Returns `EngineError::Closed` if the engine has stopped.
    pub async fn on_frame(&self, connection_id: ConnectionId, frame: Bytes) -> Result<(), EngineError> {
        self.send(Command::Frame {
            connection_id,
            frame,
        })
        .await
    }

    /// Reports that a connection's transport closed.
    ///
    /// # Errors
    /// Returns `EngineError::Closed` if the engine has stopped.
    pub async fn on_transport_closed(&self, connection_id: ConnectionId) -> Result<(), EngineError> {
        self.send(Command::TransportClosed { connection_id }).await
    }

    /// Starts the logout handshake on a connection.
    ///
    /// # Errors
    /// Returns `EngineError::Closed` if the engine has stopped.
    pub async fn logout(
        &self,
        connection_id: ConnectionId,
        reason: Option<String>,
    ) -> Result<(), EngineError> {
        self.send(Command::Logout {
            connection_id,
            reason,
        })
        .await
    }

    /// Flushes the durable log and stops the engine task.
    ///
    /// # Errors
    /// Returns `EngineError::Closed` if the engine already stopped, or the
    /// flush error.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        let (done, reply) = Reply::channel();
        self.send(Command::Shutdown { done }).await?;
        reply.wait().await
    }

    /// Starts replaying `window` of the durable log.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns `EngineError::ReproductionInFlight` if a run has not completed yet.
    pub fn start_reproduction(
        &self,
        window: ReproductionWindow,
    ) -> Result<Reply<CompletionStatus>, EngineError> {
        if self
            .reproducing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EngineError::ReproductionInFlight);
        }

        let (done, reply) = Reply::channel();
        let runner = Arc::clone(&self.reproduction);
        let reproducing = Arc::clone(&self.reproducing);
        tokio::spawn(async move {
            let result = runner.run(window).await;
            reproducing.store(false, Ordering::Release);
            done.send(result);
        });
        Ok(reply)
    }

    /// Returns true while a reproduction run is in flight.
    #[must_use]
    pub fn is_reproducing(&self) -> bool {
        self.reproducing.load(Ordering::Acquire)
    }

    async fn send(&self, command: Command) -> Result<(), EngineError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| EngineError::Closed)
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("reproducing", &self.is_reproducing())
            .field("closed", &self.commands.is_closed())
            .finish_non_exhaustive()
    }
}
