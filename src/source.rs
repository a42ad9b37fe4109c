use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Response, Url};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{ParseError, StreamError};
use crate::sse::{Frame, SseDecoder};
use crate::types::{NowPlayingPayload, Snapshot, TagRules};

/// Opens fresh connections to a now-playing feed.
///
/// Every call to [`EventSource::connect`] starts a new connection; the stream
/// picks up from whatever the server considers current.
#[async_trait]
pub trait EventSource: Send + Sync {
    type Stream: SnapshotStream;

    /// Identifier of the station this source follows (for logs).
    fn station(&self) -> &str;

    /// Open a connection, resuming after `last_event_id` when the server assigned one.
    async fn connect(&self, last_event_id: Option<&str>) -> Result<Self::Stream, StreamError>;
}

/// Lazy, endless sequence of snapshots from one connection.
#[async_trait]
pub trait SnapshotStream: Send {
    /// Wait for the next snapshot.
    ///
    /// Returns an error once the connection is unusable; the stream must not be
    /// polled again after that.
    async fn next_snapshot(&mut self) -> Result<Snapshot, StreamError>;

    /// Id of the last event received on this connection, if the server sends ids.
    fn last_event_id(&self) -> Option<&str>;
}

/// Settings for [`AzuracastSource`].
#[derive(Debug, Clone)]
pub struct SourceOptions {
    /// Base URL of the AzuraCast server.
    pub server: Url,
    /// Station shortcode.
    pub station: String,
    /// Optional API key, sent as `X-API-Key`.
    pub api_key: Option<String>,
    /// SSE event type carrying now-playing updates.
    pub event_type: String,
    /// A connection silent for this long is treated as dead.
    pub idle_timeout: Duration,
    /// Log every extracted snapshot verbatim.
    pub debug_metadata: bool,
    pub tag_rules: TagRules,
}

/// Event source backed by the AzuraCast now-playing SSE endpoint.
#[derive(Clone)]
pub struct AzuracastSource {
    client: Client,
    url: Url,
    opts: SourceOptions,
}

impl AzuracastSource {
    pub fn new(client: Client, opts: SourceOptions) -> Self {
        let url = stream_url(&opts.server, &opts.station);
        Self { client, url, opts }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl EventSource for AzuracastSource {
    type Stream = AzuracastStream;

    fn station(&self) -> &str {
        &self.opts.station
    }

    async fn connect(&self, last_event_id: Option<&str>) -> Result<AzuracastStream, StreamError> {
        log::debug!("Opening event stream {}", self.url);

        let mut request = self
            .client
            .get(self.url.clone())
            .header(header::ACCEPT, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache");
        if let Some(key) = &self.opts.api_key {
            request = request.header("X-API-Key", key);
        }
        if let Some(id) = last_event_id {
            log::debug!("Resuming after event {}", id);
            request = request.header("Last-Event-ID", id);
        }

        let response = tokio::time::timeout(self.opts.idle_timeout, request.send())
            .await
            .map_err(|_| StreamError::IdleTimeout(self.opts.idle_timeout))?
            .map_err(StreamError::Connect)?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Status { status });
        }

        Ok(AzuracastStream {
            response,
            decoder: SseDecoder::new(),
            channel: channel_name(&self.opts.station),
            opts: self.opts.clone(),
        })
    }
}

/// One open connection to the now-playing feed.
pub struct AzuracastStream {
    response: Response,
    decoder: SseDecoder,
    channel: String,
    opts: SourceOptions,
}

#[async_trait]
impl SnapshotStream for AzuracastStream {
    async fn next_snapshot(&mut self) -> Result<Snapshot, StreamError> {
        loop {
            // Drain frames already buffered before touching the socket
            while let Some(frame) = self.decoder.next_frame() {
                if let Some(snapshot) = self.handle_frame(frame) {
                    return Ok(snapshot);
                }
            }

            let chunk = tokio::time::timeout(self.opts.idle_timeout, self.response.chunk())
                .await
                .map_err(|_| StreamError::IdleTimeout(self.opts.idle_timeout))?
                .map_err(StreamError::Read)?;

            match chunk {
                Some(bytes) => self.decoder.push(&bytes)?,
                None => return Err(StreamError::Closed),
            }
        }
    }

    fn last_event_id(&self) -> Option<&str> {
        self.decoder.last_event_id()
    }
}

impl AzuracastStream {
    /// Turn a frame into a snapshot, or `None` when it should be skipped.
    fn handle_frame(&self, frame: Frame) -> Option<Snapshot> {
        if frame.event != self.opts.event_type {
            log::debug!("Skipping '{}' event", frame.event);
            return None;
        }

        match extract_snapshot(&frame.data, &self.channel, &self.opts.tag_rules) {
            Ok(Some(snapshot)) => {
                if self.opts.debug_metadata {
                    log::info!("Metadata: {:?}", snapshot);
                }
                Some(snapshot)
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("Skipping unusable frame: {} - {}", e, frame.data);
                None
            }
        }
    }
}

/// Build the SSE subscription URL for a station.
///
/// A base path on `server` (AzuraCast behind a reverse-proxy prefix) is kept.
pub fn stream_url(server: &Url, station: &str) -> Url {
    let mut channels = serde_json::Map::new();
    channels.insert(channel_name(station), serde_json::json!({ "recover": true }));
    let subs = serde_json::json!({ "subs": channels });

    let mut url = server.clone();
    let path = format!(
        "{}/api/live/nowplaying/sse",
        server.path().trim_end_matches('/')
    );
    url.set_path(&path);
    url.set_query(None);
    url.query_pairs_mut()
        .append_pair("cf_connect", &subs.to_string());
    url
}

/// Name of the publication channel for a station.
pub fn channel_name(station: &str) -> String {
    format!("station:{}", station)
}

#[derive(Debug, Deserialize)]
struct Publication {
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ConnectSub {
    #[serde(default)]
    publications: Vec<Publication>,
}

#[derive(Debug, Deserialize)]
struct Connect {
    #[serde(default)]
    subs: std::collections::HashMap<String, ConnectSub>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    connect: Option<Connect>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default, rename = "pub")]
    publication: Option<Publication>,
}

/// Pull the station's snapshot out of one `data` payload.
///
/// Returns `Ok(None)` for keep-alives and publications for other channels.
pub fn extract_snapshot(
    data: &str,
    channel: &str,
    rules: &TagRules,
) -> Result<Option<Snapshot>, ParseError> {
    let message: Message = serde_json::from_str(data)?;

    let publication = if let Some(connect) = message.connect {
        // Initial frame replays recent publications; the last one is current
        connect
            .subs
            .into_iter()
            .find(|(name, _)| name == channel)
            .and_then(|(_, sub)| sub.publications.into_iter().last())
    } else if message.channel.as_deref() == Some(channel) {
        message.publication
    } else {
        None
    };

    let Some(data) = publication.and_then(|p| p.data) else {
        return Ok(None);
    };

    let np = data
        .get("np")
        .cloned()
        .ok_or_else(|| ParseError::MissingNowPlaying {
            channel: channel.to_string(),
        })?;
    let np: NowPlayingPayload = serde_json::from_value(np)?;

    let station = channel.strip_prefix("station:").unwrap_or(channel);
    Ok(Some(Snapshot::from_payload(station, np, rules)))
}
