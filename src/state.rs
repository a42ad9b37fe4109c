//! # Connection state machine.
//!
//! ```text
//!             connected()               failed()
//! Connecting ───────────► Streaming ───────────► Backoff(delay)
//!     ▲  │                    │                      │
//!     │  │ failed()           │ request_shutdown()   │ retry()
//!     │  └────────────────────┼──────► Backoff       │
//!     └───────────────────────┼──────────────────────┘
//!                             ▼
//!   (any live phase) ───► ShuttingDown ───► Stopped
//! ```
//!
//! [`ConnectionState`] is owned by a single supervisor; it holds the failure
//! count, the current (pre-jitter) backoff delay, the time of the last
//! successful connection and whether shutdown was requested.

use std::time::Duration;

use tokio::time::Instant;

use crate::backoff::BackoffPolicy;

/// Where the supervisor currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Streaming,
    /// Waiting the contained (jittered) delay before reconnecting.
    Backoff(Duration),
    ShuttingDown,
    Stopped,
}

/// Per-station connection bookkeeping.
#[derive(Debug)]
pub struct ConnectionState {
    phase: Phase,
    failures: u32,
    delay: Duration,
    last_connected: Option<Instant>,
    shutdown_requested: bool,
    floor: Duration,
}

impl ConnectionState {
    pub fn new(policy: &BackoffPolicy) -> Self {
        Self {
            phase: Phase::Connecting,
            failures: 0,
            delay: policy.floor,
            last_connected: None,
            shutdown_requested: false,
            floor: policy.floor,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Consecutive transport failures since the last successful connection.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Current backoff delay before jitter.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn last_connected(&self) -> Option<Instant> {
        self.last_connected
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    /// `Connecting → Streaming`; clears the failure count and delay.
    pub fn connected(&mut self) {
        if self.phase != Phase::Connecting {
            return;
        }
        self.phase = Phase::Streaming;
        self.failures = 0;
        self.delay = self.floor;
        self.last_connected = Some(Instant::now());
    }

    /// `Connecting | Streaming → Backoff`; returns the jittered delay to wait.
    pub fn failed(&mut self, policy: &BackoffPolicy) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.delay = policy.base_delay(self.failures);
        let wait = policy.next(self.failures);
        if matches!(self.phase, Phase::Connecting | Phase::Streaming) {
            self.phase = Phase::Backoff(wait);
        }
        wait
    }

    /// `Backoff → Connecting`, or `ShuttingDown` if shutdown was requested meanwhile.
    pub fn retry(&mut self) {
        if !matches!(self.phase, Phase::Backoff(_)) {
            return;
        }
        self.phase = if self.shutdown_requested {
            Phase::ShuttingDown
        } else {
            Phase::Connecting
        };
    }

    /// Any live phase → `ShuttingDown`.
    pub fn request_shutdown(&mut self) {
        self.shutdown_requested = true;
        if self.phase != Phase::Stopped {
            self.phase = Phase::ShuttingDown;
        }
    }

    /// Enter the terminal phase.
    pub fn stop(&mut self) {
        self.phase = Phase::Stopped;
    }

    /// Whether the failure count has gone past `max_retries` (`None` = unlimited).
    pub fn exhausted(&self, max_retries: Option<u32>) -> bool {
        max_retries.is_some_and(|max| self.failures > max)
    }
}
