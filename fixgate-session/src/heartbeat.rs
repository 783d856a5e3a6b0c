/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Heartbeat and TestRequest timing.
//!
//! All decisions are taken against epoch nanoseconds supplied by the caller,
//! so a replay clock reproduces them exactly:
//! - outbound silence of one interval: send a Heartbeat
//! - inbound silence of `interval * test_request_factor`: send a TestRequest
//! - TestRequest unanswered for a further interval: the session has timed out

use std::time::Duration;

/// What the session should do on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Nothing is due.
    Idle,
    /// Outbound side has been quiet; send an unsolicited Heartbeat.
    SendHeartbeat,
    /// Inbound side has been quiet; probe with a TestRequest carrying a
    /// generated TestReqID, which the counterparty echoes in its Heartbeat.
    SendTestRequest,
    /// A TestRequest went unanswered.
    TimedOut,
}

/// Manages heartbeat timing for a FIX session.
#[derive(Debug, Clone)]
pub struct HeartbeatManager {
    interval_ns: u64,
    test_request_factor: f64,
    last_sent_ns: u64,
    last_received_ns: u64,
    test_request_pending: Option<String>,
    test_request_sent_ns: Option<u64>,
}

impl HeartbeatManager {
    /// Creates a new heartbeat manager.
    ///
    /// # Arguments
    /// * `interval` - The heartbeat interval
    /// * `test_request_factor` - Inbound silence multiple before probing
    /// * `now_ns` - Current epoch nanoseconds
    #[must_use]
    pub fn new(interval: Duration, test_request_factor: f64, now_ns: u64) -> Self {
        Self {
            interval_ns: duration_nanos(interval),
            test_request_factor,
            last_sent_ns: now_ns,
            last_received_ns: now_ns,
            test_request_pending: None,
            test_request_sent_ns: None,
        }
    }

    /// Changes the interval, as negotiated at logon.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval_ns = duration_nanos(interval);
    }

    /// Returns the heartbeat interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_nanos(self.interval_ns)
    }

    /// Records that a message was sent.
    #[inline]
    pub fn on_message_sent(&mut self, now_ns: u64) {
        self.last_sent_ns = now_ns;
    }

    /// Records that a message was received.
    ///
    /// Any inbound traffic proves liveness, so a pending TestRequest is
    /// cleared whether or not the Heartbeat echoes its id.
    pub fn on_message_received(&mut self, now_ns: u64) {
        self.last_received_ns = now_ns;
        self.test_request_pending = None;
        self.test_request_sent_ns = None;
    }

    /// Records that a TestRequest was sent.
    pub fn on_test_request_sent(&mut self, test_req_id: String, now_ns: u64) {
        self.test_request_pending = Some(test_req_id);
        self.test_request_sent_ns = Some(now_ns);
        self.last_sent_ns = now_ns;
    }

    /// Returns the pending TestRequest ID, if any.
    #[must_use]
    pub fn pending_test_request(&self) -> Option<&str> {
        self.test_request_pending.as_deref()
    }

    /// Decides what is due at `now_ns`.
    #[must_use]
    pub fn poll(&self, now_ns: u64) -> HeartbeatAction {
        if let Some(sent_ns) = self.test_request_sent_ns {
            if now_ns.saturating_sub(sent_ns) >= self.interval_ns {
                return HeartbeatAction::TimedOut;
            }
        } else if now_ns.saturating_sub(self.last_received_ns) >= self.test_request_threshold() {
            return HeartbeatAction::SendTestRequest;
        }

        if now_ns.saturating_sub(self.last_sent_ns) >= self.interval_ns {
            HeartbeatAction::SendHeartbeat
        } else {
            HeartbeatAction::Idle
        }
    }

    /// Returns nanoseconds since the last inbound message.
    #[must_use]
    pub const fn silence_ns(&self, now_ns: u64) -> u64 {
        now_ns.saturating_sub(self.last_received_ns)
    }

    /// Resets timers to `now_ns`.
    pub fn reset(&mut self, now_ns: u64) {
        self.last_sent_ns = now_ns;
        self.last_received_ns = now_ns;
        self.test_request_pending = None;
        self.test_request_sent_ns = None;
    }

    fn test_request_threshold(&self) -> u64 {
        (self.interval_ns as f64 * self.test_request_factor) as u64
    }
}

/// Generates a TestReqID from the current epoch time.
///
/// Derived from the injected clock rather than a random source so replays
/// emit the same id.
#[must_use]
pub fn generate_test_req_id(now_ns: u64) -> String {
    format!("TEST{now_ns}")
}

fn duration_nanos(interval: Duration) -> u64 {
    u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX)
}
