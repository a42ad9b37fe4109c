use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use reqwest::{Client, Url};
use serde::Serialize;

use crate::error::DeliveryError;
use crate::types::Snapshot;

/// Webhook body limits (Discord rejects longer values).
const MAX_TITLE: usize = 256;
const MAX_DESCRIPTION: usize = 4096;

/// Announces a changed snapshot somewhere.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Make one delivery attempt.
    ///
    /// Returns `true` only when the message was accepted. Failures are logged
    /// and reported as `false`; they never propagate.
    async fn notify(&self, snapshot: &Snapshot) -> bool;
}

/// Posts now-playing embeds to a Discord-compatible webhook.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: Url,
    username: Option<String>,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(client: Client, url: Url) -> Self {
        Self {
            client,
            url,
            username: None,
            timeout: Duration::from_secs(10),
        }
    }

    /// Override the display name of the posting user.
    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Single POST of `message`; any 2xx status counts as delivered.
    pub async fn deliver(&self, message: &WebhookMessage) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.url.clone())
            .timeout(self.timeout)
            .json(message)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Rejected { status, body })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, snapshot: &Snapshot) -> bool {
        let message = WebhookMessage::from_snapshot(snapshot, self.username.clone());

        match self.deliver(&message).await {
            Ok(()) => {
                log::info!(
                    "[{}] Announced \"{}\" by {}",
                    snapshot.station,
                    snapshot.title,
                    snapshot.artist
                );
                true
            }
            Err(e) => {
                log::error!(
                    "[{}] Failed to send webhook for \"{}\" by {} ({}): {}",
                    snapshot.station,
                    snapshot.title,
                    snapshot.artist,
                    self.url.host_str().unwrap_or("webhook"),
                    e
                );
                false
            }
        }
    }
}

/// JSON body of a webhook post.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WebhookMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Embed {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Thumbnail>,
    pub footer: Footer,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Thumbnail {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Footer {
    pub text: String,
}

impl WebhookMessage {
    pub fn from_snapshot(snapshot: &Snapshot, username: Option<String>) -> Self {
        let album_part = if snapshot.album.is_empty() {
            String::new()
        } else {
            format!("from _{}_ by ", snapshot.album)
        };
        let description = format!(
            "{}{} ({})",
            album_part,
            snapshot.artist,
            format_clock(snapshot.duration_secs)
        );

        let mut footer = format!("DJ: {}", snapshot.streamer);
        if snapshot.live {
            footer.push_str(" [LIVE]");
        }

        let embed = Embed {
            title: truncate(&snapshot.title, MAX_TITLE),
            description: truncate(&description, MAX_DESCRIPTION),
            timestamp: snapshot.played_at.and_then(format_timestamp),
            thumbnail: snapshot
                .art_url
                .as_ref()
                .map(|url| Thumbnail { url: url.clone() }),
            footer: Footer { text: footer },
        };

        Self {
            username,
            embeds: vec![embed],
        }
    }
}

/// Seconds as `HH:MM:SS`.
pub fn format_clock(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

/// Unix seconds as RFC 3339 (UTC); `None` for out-of-range values.
fn format_timestamp(unix: i64) -> Option<String> {
    DateTime::from_timestamp(unix, 0).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Cut `text` to at most `max` characters, marking the cut with an ellipsis.
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
