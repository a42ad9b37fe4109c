//! # Supervisor: keeps one station's event stream alive and announces changes.
//!
//! ```text
//! loop {
//!   Connecting   ──► source.connect()        (cancellable)
//!   │                 ├─ Ok  ──► Streaming (failures = 0)
//!   │                 └─ Err ──► Backoff
//!   Streaming    ──► stream.next_snapshot()  (cancellable)
//!   │                 ├─ Ok(snapshot) ──► tracker.consider()
//!   │                 │                      └─ Changed ──► notifier.notify()
//!   │                 │                                       └─ true ──► tracker.acknowledge()
//!   │                 └─ Err ──► Backoff
//!   Backoff      ──► sleep(delay)            (cancellable) ──► Connecting
//!   ShuttingDown ──► drop stream ──► Stopped
//! }
//! ```
//!
//! ## Rules
//! - The two suspension points (stream read, backoff sleep) both race the
//!   cancellation token, so shutdown is observed immediately.
//! - A notification already in flight when shutdown arrives gets up to
//!   `grace` to finish; after that it is abandoned and not acknowledged.
//! - With a retry cap, exceeding it stops the supervisor with
//!   [`RunError::RetriesExhausted`].

use std::time::Duration;

use tokio::select;
use tokio_util::sync::CancellationToken;

use crate::backoff::BackoffPolicy;
use crate::error::{RunError, StreamError};
use crate::events::{Bus, EventKind};
use crate::notifier::Notifier;
use crate::source::{EventSource, SnapshotStream};
use crate::state::{ConnectionState, Phase};
use crate::tracker::{StateTracker, Verdict};
use crate::types::Snapshot;

/// Tunables for a [`Supervisor`].
#[derive(Debug, Clone, Copy)]
pub struct SupervisorOptions {
    pub backoff: BackoffPolicy,
    /// `None` retries forever.
    pub max_retries: Option<u32>,
    /// How long an in-flight notification may run after shutdown was requested.
    pub grace: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            max_retries: None,
            grace: Duration::from_secs(5),
        }
    }
}

/// Drives one station from connection to shutdown.
pub struct Supervisor<S: EventSource, N: Notifier> {
    source: S,
    notifier: N,
    opts: SupervisorOptions,
    tracker: StateTracker,
    state: ConnectionState,
    bus: Bus,
    cancel: CancellationToken,
    /// Id of the last event seen, sent as `Last-Event-ID` on the next connection.
    last_event_id: Option<String>,
}

impl<S: EventSource, N: Notifier> Supervisor<S, N> {
    pub fn new(source: S, notifier: N, opts: SupervisorOptions, cancel: CancellationToken) -> Self {
        Self {
            state: ConnectionState::new(&opts.backoff),
            source,
            notifier,
            opts,
            tracker: StateTracker::new(),
            bus: Bus::default(),
            cancel,
            last_event_id: None,
        }
    }

    /// Publish lifecycle events on `bus` instead of a private one.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = bus;
        self
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    /// Run until shutdown or retry exhaustion.
    ///
    /// Returns `Ok(())` after a requested shutdown.
    pub async fn run(&mut self) -> Result<(), RunError> {
        let mut stream: Option<S::Stream> = None;

        loop {
            match self.state.phase() {
                Phase::Connecting => {
                    let attempt = self.state.failures() + 1;
                    log::info!(
                        "[{}] Connecting (attempt {})",
                        self.source.station(),
                        attempt
                    );
                    self.publish(EventKind::Connecting { attempt });

                    let res = select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            self.begin_shutdown();
                            continue;
                        }
                        res = self.source.connect(self.last_event_id.as_deref()) => res,
                    };

                    match res {
                        Ok(s) => {
                            if self.state.failures() > 0 {
                                log::info!(
                                    "[{}] Reconnected after {} failures, resetting backoff",
                                    self.source.station(),
                                    self.state.failures()
                                );
                            }
                            log::info!(
                                "[{}] Connection established, listening for events...",
                                self.source.station()
                            );
                            self.state.connected();
                            self.publish(EventKind::Connected);
                            stream = Some(s);
                        }
                        Err(e) => self.transport_failed(e)?,
                    }
                }
                Phase::Streaming => {
                    let Some(active) = stream.as_mut() else {
                        // Streaming always holds a connection; treat a missing one as closed
                        self.transport_failed(StreamError::Closed)?;
                        continue;
                    };

                    let res = select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            self.begin_shutdown();
                            continue;
                        }
                        res = active.next_snapshot() => res,
                    };

                    match res {
                        Ok(snapshot) => self.handle_snapshot(snapshot).await,
                        Err(e) => {
                            if let Some(id) = stream.as_ref().and_then(|s| s.last_event_id()) {
                                self.last_event_id = Some(id.to_string());
                            }
                            stream = None;
                            self.transport_failed(e)?;
                        }
                    }
                }
                Phase::Backoff(delay) => {
                    log::info!(
                        "[{}] Reconnecting in {:.1} seconds...",
                        self.source.station(),
                        delay.as_secs_f64()
                    );
                    self.publish(EventKind::BackoffScheduled { delay });

                    select! {
                        biased;
                        _ = self.cancel.cancelled() => self.begin_shutdown(),
                        _ = tokio::time::sleep(delay) => self.state.retry(),
                    }
                }
                Phase::ShuttingDown => {
                    // Dropping the stream closes the connection
                    drop(stream.take());
                    self.state.stop();
                }
                Phase::Stopped => {
                    log::info!("[{}] Stopped", self.source.station());
                    self.publish(EventKind::Stopped);
                    return Ok(());
                }
            }
        }
    }

    /// Compare, announce, and acknowledge only on confirmed delivery.
    async fn handle_snapshot(&mut self, snapshot: Snapshot) {
        if self.tracker.consider(&snapshot) == Verdict::Unchanged {
            log::debug!(
                "[{}] Unchanged: \"{}\" by {}",
                snapshot.station,
                snapshot.title,
                snapshot.artist
            );
            return;
        }

        if snapshot.is_idle() {
            log::info!("[{}] Nothing playing", snapshot.station);
            self.tracker.acknowledge(snapshot);
            return;
        }

        let title = snapshot.title.clone();
        if self.dispatch(&snapshot).await {
            self.tracker.acknowledge(snapshot);
            self.publish(EventKind::Notified { title });
        } else {
            self.publish(EventKind::NotifyFailed { title });
        }
    }

    /// Run the notifier, giving it `grace` to finish if shutdown arrives meanwhile.
    async fn dispatch(&self, snapshot: &Snapshot) -> bool {
        let notify = self.notifier.notify(snapshot);
        tokio::pin!(notify);

        select! {
            biased;
            delivered = &mut notify => delivered,
            _ = self.cancel.cancelled() => {
                log::info!(
                    "[{}] Shutdown requested, waiting up to {:?} for notification",
                    snapshot.station,
                    self.opts.grace
                );
                match tokio::time::timeout(self.opts.grace, &mut notify).await {
                    Ok(delivered) => delivered,
                    Err(_) => {
                        log::warn!(
                            "[{}] Abandoned notification for \"{}\" after {:?}",
                            snapshot.station,
                            snapshot.title,
                            self.opts.grace
                        );
                        false
                    }
                }
            }
        }
    }

    /// Record a transport failure and move to `Backoff`, or stop if the cap is hit.
    fn transport_failed(&mut self, err: StreamError) -> Result<(), RunError> {
        let wait = self.state.failed(&self.opts.backoff);
        let failures = self.state.failures();
        let error = err.to_string();

        log::warn!(
            "[{}] Error during event stream ({}): {}",
            self.source.station(),
            err.as_label(),
            error
        );
        self.publish(EventKind::TransportFailed {
            failures,
            error: error.clone(),
        });

        if self.state.exhausted(self.opts.max_retries) {
            log::error!(
                "[{}] Max retries ({}) exceeded, giving up",
                self.source.station(),
                self.opts.max_retries.unwrap_or_default()
            );
            self.state.stop();
            self.publish(EventKind::RetriesExhausted { failures });
            self.publish(EventKind::Stopped);
            return Err(RunError::RetriesExhausted {
                station: self.source.station().to_string(),
                failures,
                last_error: error,
            });
        }

        log::debug!(
            "[{}] Backoff {:?} (base {:?}, failures {})",
            self.source.station(),
            wait,
            self.state.delay(),
            failures
        );
        Ok(())
    }

    fn begin_shutdown(&mut self) {
        if !self.state.shutdown_requested() {
            log::info!("[{}] Shutdown requested", self.source.station());
            self.publish(EventKind::ShutdownRequested);
        }
        self.state.request_shutdown();
    }

    fn publish(&self, kind: EventKind) {
        self.bus.publish(self.source.station(), kind);
    }
}
