//! Relays now-playing changes from AzuraCast stations to a chat webhook.
//!
//! Each station gets a [`supervisor::Supervisor`] that keeps its SSE
//! connection alive with exponential backoff, suppresses duplicate updates
//! via [`tracker::StateTracker`] and announces real changes through a
//! [`notifier::Notifier`].

pub mod app;
pub mod backoff;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod notifier;
pub mod shutdown;
pub mod source;
pub mod sse;
pub mod state;
pub mod supervisor;
pub mod tracker;
pub mod types;
