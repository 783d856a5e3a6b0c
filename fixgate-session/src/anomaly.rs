/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Anomaly counting.
//!
//! Anomalies are events that don't break a session but indicate the
//! counterparty or a reproduction diverged from expectations. The counter is
//! injected wherever it is needed; there is no process-wide instance.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Kind of anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnomalyKind {
    /// MsgSeqNum lower than expected without PossDupFlag.
    SequenceTooLow,
    /// Gap buffer full; a message was dropped.
    BufferOverflow,
    /// A reproduced frame differs from the logged one.
    ReproductionMismatch,
    /// A logged frame has no reproduced counterpart.
    MissingOutput,
    /// A reproduced frame has no logged counterpart.
    UnexpectedOutput,
    /// An inbound frame could not be decoded.
    DecodeFailure,
}

impl AnomalyKind {
    /// Returns the kind name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SequenceTooLow => "sequence too low",
            Self::BufferOverflow => "gap buffer overflow",
            Self::ReproductionMismatch => "reproduction mismatch",
            Self::MissingOutput => "missing output",
            Self::UnexpectedOutput => "unexpected output",
            Self::DecodeFailure => "decode failure",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observer notified with the running count on every anomaly.
pub trait AnomalyHandler: Send + Sync {
    /// Called after the count was incremented.
    fn on_anomaly(&self, count: u64);
}

impl<F> AnomalyHandler for F
where
    F: Fn(u64) + Send + Sync,
{
    fn on_anomaly(&self, count: u64) {
        self(count);
    }
}

/// Thread-safe anomaly tally.
#[derive(Default)]
pub struct AnomalyCounter {
    count: AtomicU64,
    handler: Option<Arc<dyn AnomalyHandler>>,
}

impl AnomalyCounter {
    /// Creates a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches an observer.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn AnomalyHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Records one anomaly and returns the new count.
    pub fn record(&self, kind: AnomalyKind) -> u64 {
        let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        warn!(anomaly = %kind, count, "anomaly recorded");
        if let Some(handler) = &self.handler {
            handler.on_anomaly(count);
        }
        count
    }

    /// Returns the current count.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for AnomalyCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnomalyCounter")
            .field("count", &self.count())
            .field("handler", &self.handler.is_some())
            .finish()
    }
}
