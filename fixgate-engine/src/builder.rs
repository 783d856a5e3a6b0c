/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Engine builder for fluent configuration.
//!
//! This module provides a builder API for assembling an [`Engine`] from a
//! session configuration, a protocol, storage and the business application.

use crate::application::{Application, NoOpApplication};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::framer::Framer;
use crate::publication::LogHealth;
use crate::reproduction::{ReproductionEngine, ReproductionMessageHandler};
use fixgate_core::clock::{EpochNanoClock, SystemEpochClock};
use fixgate_session::{
    AnomalyCounter, AnomalyHandler, AuthenticationStrategy, FixProtocol, NoAuthentication,
    SessionConfig, SessionContext, SessionProtocol,
};
use fixgate_store::{DurableLog, MemoryLog, MemoryStore, MessageStore};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default interval between timer polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default capacity of the engine command channel.
pub const DEFAULT_COMMAND_CAPACITY: usize = 1024;

/// Default capacity of each connection's outbound channel.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Builder for configuring a FixGate engine.
pub struct EngineBuilder<P: SessionProtocol = FixProtocol, A: Application = NoOpApplication> {
    config: SessionConfig,
    protocol: P,
    application: Arc<A>,
    log: Arc<dyn DurableLog>,
    store: Arc<dyn MessageStore>,
    clock: Arc<dyn EpochNanoClock>,
    auth: Arc<dyn AuthenticationStrategy>,
    anomaly_handler: Option<Arc<dyn AnomalyHandler>>,
    reproduction_handler: Option<Arc<dyn ReproductionMessageHandler>>,
    poll_interval: Duration,
    clean_passwords: bool,
    command_capacity: usize,
    outbound_capacity: usize,
}

impl EngineBuilder<FixProtocol, NoOpApplication> {
    /// Creates a tag=value engine builder with in-memory storage.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        let protocol = FixProtocol::from_config(&config);
        Self {
            config,
            protocol,
            application: Arc::new(NoOpApplication),
            log: Arc::new(MemoryLog::new()),
            store: Arc::new(MemoryStore::new()),
            clock: Arc::new(SystemEpochClock),
            auth: Arc::new(NoAuthentication),
            anomaly_handler: None,
            reproduction_handler: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            clean_passwords: true,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

impl<P: SessionProtocol, A: Application> EngineBuilder<P, A> {
    /// Replaces the wire protocol.
    #[must_use]
    pub fn with_protocol<Q: SessionProtocol>(self, protocol: Q) -> EngineBuilder<Q, A> {
        EngineBuilder {
            config: self.config,
            protocol,
            application: self.application,
            log: self.log,
            store: self.store,
            clock: self.clock,
            auth: self.auth,
            anomaly_handler: self.anomaly_handler,
            reproduction_handler: self.reproduction_handler,
            poll_interval: self.poll_interval,
            clean_passwords: self.clean_passwords,
            command_capacity: self.command_capacity,
            outbound_capacity: self.outbound_capacity,
        }
    }

    /// Sets the business application.
    #[must_use]
    pub fn with_application<B: Application>(self, application: B) -> EngineBuilder<P, B> {
        EngineBuilder {
            config: self.config,
            protocol: self.protocol,
            application: Arc::new(application),
            log: self.log,
            store: self.store,
            clock: self.clock,
            auth: self.auth,
            anomaly_handler: self.anomaly_handler,
            reproduction_handler: self.reproduction_handler,
            poll_interval: self.poll_interval,
            clean_passwords: self.clean_passwords,
            command_capacity: self.command_capacity,
            outbound_capacity: self.outbound_capacity,
        }
    }

    /// Sets the durable log.
    #[must_use]
    pub fn with_log(mut self, log: Arc<dyn DurableLog>) -> Self {
        self.log = log;
        self
    }

    /// Sets the live message store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = store;
        self
    }

    /// Sets the epoch clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn EpochNanoClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the logon authentication strategy.
    #[must_use]
    pub fn with_auth(mut self, auth: Arc<dyn AuthenticationStrategy>) -> Self {
        self.auth = auth;
        self
    }

    /// Reports anomaly counts, live and during reproduction, to `handler`.
    #[must_use]
    pub fn with_anomaly_handler(mut self, handler: Arc<dyn AnomalyHandler>) -> Self {
        self.anomaly_handler = Some(handler);
        self
    }

    /// Hands every reproduced frame to `handler`.
    #[must_use]
    pub fn with_reproduction_handler(mut self, handler: Arc<dyn ReproductionMessageHandler>) -> Self {
        self.reproduction_handler = Some(handler);
        self
    }

    /// Sets the interval between timer polls.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Masks logon passwords before inbound frames reach the durable log.
    #[must_use]
    pub const fn with_password_cleaning(mut self, enabled: bool) -> Self {
        self.clean_passwords = enabled;
        self
    }

    /// Sets the capacity of the engine command channel.
    #[must_use]
    pub const fn with_command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity;
        self
    }

    /// Sets the capacity of each connection's outbound channel.
    #[must_use]
    pub const fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }

    /// Returns the session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Returns whether logon passwords are masked in the durable log.
    #[must_use]
    pub const fn cleans_passwords(&self) -> bool {
        self.clean_passwords
    }

    /// Returns the outbound channel capacity.
    #[must_use]
    pub const fn outbound_capacity(&self) -> usize {
        self.outbound_capacity
    }

    /// Returns the application handler.
    #[must_use]
    pub fn application(&self) -> Arc<A> {
        Arc::clone(&self.application)
    }

    /// Builds the engine.
    ///
    /// # Errors
    /// Returns `EngineError::Configuration` if the session configuration or
    /// a capacity is invalid.
    pub fn build(self) -> Result<Engine<P, A>, EngineError> {
        self.config
            .validate()
            .map_err(|e| EngineError::Configuration(e.to_string()))?;
        if self.command_capacity == 0 || self.outbound_capacity == 0 {
            return Err(EngineError::Configuration(
                "channel capacities must be positive".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(EngineError::Configuration(
                "poll_interval must be positive".to_string(),
            ));
        }

        let config = Arc::new(self.config);
        let mut anomalies = AnomalyCounter::new();
        if let Some(handler) = &self.anomaly_handler {
            anomalies = anomalies.with_handler(Arc::clone(handler));
        }
        let ctx = SessionContext::new(Arc::clone(&self.clock))
            .with_store(self.store)
            .with_auth(Arc::clone(&self.auth))
            .with_identity(self.protocol.identity())
            .with_anomalies(Arc::new(anomalies));

        // Masked passwords cannot be checked again on replay.
        let replay_auth: Arc<dyn AuthenticationStrategy> = if self.clean_passwords {
            Arc::new(NoAuthentication)
        } else {
            Arc::clone(&self.auth)
        };
        let mut reproduction = ReproductionEngine::new(
            &self.protocol,
            Arc::clone(&config),
            Arc::clone(&self.application),
            Arc::clone(&self.log),
            replay_auth,
        );
        if let Some(handler) = self.anomaly_handler {
            reproduction = reproduction.with_anomaly_handler(handler);
        }
        if let Some(handler) = self.reproduction_handler {
            reproduction = reproduction.with_message_handler(handler);
        }

        let health = Arc::new(LogHealth::new());
        let framer = Framer::new(Arc::new(self.protocol), config, ctx, self.application)
            .with_archive(Arc::clone(&self.log), Arc::clone(&health), self.clean_passwords);

        Ok(Engine {
            framer,
            reproduction: Arc::new(reproduction),
            log: self.log,
            clock: self.clock,
            health,
            poll_interval: self.poll_interval,
            command_capacity: self.command_capacity,
            outbound_capacity: self.outbound_capacity,
        })
    }
}

impl<P: SessionProtocol, A: Application> fmt::Debug for EngineBuilder<P, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("poll_interval", &self.poll_interval)
            .field("clean_passwords", &self.clean_passwords)
            .field("command_capacity", &self.command_capacity)
            .field("outbound_capacity", &self.outbound_capacity)
            .finish_non_exhaustive()
    }
}
