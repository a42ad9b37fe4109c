//! Error types for the relay.
//!
//! - [`StreamError`] transport failures of the event stream, recovered by the supervisor.
//! - [`ParseError`] a single unusable frame, skipped by the event source.
//! - [`DeliveryError`] a failed webhook post, swallowed by the notifier.
//! - [`ConfigError`] missing or malformed settings, fatal at startup.
//! - [`RunError`] failures that reach the process boundary.

use std::time::Duration;
use thiserror::Error;

/// Transport-level failure of one stream connection.
#[derive(Error, Debug)]
pub enum StreamError {
    /// The HTTP request could not be sent or the connection could not be established.
    #[error("failed to connect: {0}")]
    Connect(#[source] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("unexpected status {status}")]
    Status { status: reqwest::StatusCode },

    /// Reading the response body failed mid-stream.
    #[error("failed to read stream: {0}")]
    Read(#[source] reqwest::Error),

    /// The server closed the stream.
    #[error("stream closed by server")]
    Closed,

    /// The byte stream does not follow the event-stream framing rules.
    #[error("malformed framing: {0}")]
    Framing(String),

    /// No bytes arrived within the idle timeout.
    #[error("no data received for {0:?}")]
    IdleTimeout(Duration),
}

impl StreamError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            StreamError::Connect(_) => "stream_connect",
            StreamError::Status { .. } => "stream_status",
            StreamError::Read(_) => "stream_read",
            StreamError::Closed => "stream_closed",
            StreamError::Framing(_) => "stream_framing",
            StreamError::IdleTimeout(_) => "stream_idle_timeout",
        }
    }
}

/// A frame whose payload could not be turned into a snapshot.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload for {channel} has no now-playing data")]
    MissingNowPlaying { channel: String },
}

/// A webhook delivery attempt that did not succeed.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("webhook rejected message with status {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Missing or malformed configuration, detected once before the loop starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid webhook URL {url:?}: {reason}")]
    InvalidWebhook { url: String, reason: String },

    #[error("invalid server {server:?}: {reason}")]
    InvalidServer { server: String, reason: String },

    #[error("invalid station shortcode {0:?}")]
    InvalidStation(String),

    #[error("invalid log level {0:?}")]
    InvalidLogLevel(String),

    #[error("invalid backoff: {0}")]
    InvalidBackoff(String),

    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("invalid log rotation: {0}")]
    InvalidLogRotation(String),
}

/// Failures surfaced at the process boundary.
#[derive(Error, Debug)]
pub enum RunError {
    /// A station failed more than the configured retry cap in a row.
    #[error("station {station}: gave up after {failures} consecutive failures; last error: {last_error}")]
    RetriesExhausted {
        station: String,
        failures: u32,
        last_error: String,
    },

    /// Something needed to start the relay could not be set up.
    #[error("startup failed: {0}")]
    Startup(String),

    /// A station task panicked or was aborted.
    #[error("station task failed: {0}")]
    Task(String),
}

impl RunError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::Startup(_) | RunError::Task(_) => 1,
            RunError::RetriesExhausted { .. } => 3,
        }
    }
}
