//! # Supervisor lifecycle events.
//!
//! Every state transition of a [`Supervisor`](crate::supervisor::Supervisor)
//! is published on a [`Bus`], a thin wrapper over [`tokio::sync::broadcast`].
//!
//! ## Rules
//! - `publish()` never blocks; events are dropped when nobody listens.
//! - Slow receivers observe `RecvError::Lagged(n)` and skip `n` oldest events.
//! - A receiver only sees events sent after it subscribed.

use std::time::Duration;

use tokio::sync::broadcast;

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A connection attempt is starting (`attempt` is 1-based since the last success).
    Connecting { attempt: u32 },
    /// The stream was established.
    Connected,
    /// The current connection attempt failed.
    TransportFailed { failures: u32, error: String },
    /// Reconnect scheduled after `delay`.
    BackoffScheduled { delay: Duration },
    /// A change was announced and acknowledged.
    Notified { title: String },
    /// A change could not be announced; it stays pending.
    NotifyFailed { title: String },
    /// Shutdown was requested.
    ShutdownRequested,
    /// The retry cap was exceeded.
    RetriesExhausted { failures: u32 },
    /// The supervisor reached its terminal state.
    Stopped,
}

/// An event together with the station it concerns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub station: String,
    pub kind: EventKind,
}

/// Broadcast channel for supervisor events.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus holding at most `capacity` undelivered events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, station: &str, kind: EventKind) {
        let _ = self.tx.send(Event {
            station: station.to_string(),
            kind,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        bus.publish("radiospiral", EventKind::Connected);

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.station, "radiospiral");
        assert_eq!(ev.kind, EventKind::Connected);
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = Bus::new(0);
        bus.publish("radiospiral", EventKind::Stopped);
    }
}
