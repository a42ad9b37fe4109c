use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::LevelFilter;
use reqwest::Url;

use crate::backoff::{BackoffPolicy, JitterPolicy};
use crate::error::ConfigError;
use crate::logging::Rotation;
use crate::supervisor::SupervisorOptions;
use crate::types::TagRules;

/// Command line, with every option also readable from the environment.
#[derive(Parser, Debug, Clone)]
#[command(name = "nowplaying-relay")]
#[command(version)]
#[command(about = "Relays now-playing changes from an AzuraCast station to a chat webhook")]
pub struct Cli {
    /// AzuraCast server host or base URL
    #[arg(long, env = "AZURACAST_SERVER")]
    pub server: Option<String>,

    /// Station shortcode(s) to follow
    #[arg(long, env = "AZURACAST_STATION", value_delimiter = ',')]
    pub station: Vec<String>,

    /// API key sent with the stream request
    #[arg(long, env = "AZURACAST_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Webhook URL that receives now-playing posts
    #[arg(long, env = "NOW_PLAYING_WEBHOOK", hide_env_values = true)]
    pub webhook: Option<String>,

    /// Display name for webhook posts
    #[arg(long, env = "WEBHOOK_USERNAME")]
    pub webhook_username: Option<String>,

    /// Give up on a single webhook post after this many seconds
    #[arg(long, env = "WEBHOOK_TIMEOUT", default_value_t = 10)]
    pub webhook_timeout_secs: u64,

    /// Log verbosity (error, warn, info, debug, trace, off)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Also append log records to this file
    #[arg(long, env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Rotate the log file once it grows past this many bytes
    #[arg(long, env = "LOG_MAX_BYTES", default_value_t = crate::logging::DEFAULT_MAX_BYTES)]
    pub log_max_bytes: usize,

    /// Number of rotated log files to keep
    #[arg(long, env = "LOG_BACKUPS", default_value_t = crate::logging::DEFAULT_BACKUPS)]
    pub log_backups: usize,

    /// Log every extracted metadata snapshot
    #[arg(long, env = "DEBUG_METADATA")]
    pub debug_metadata: bool,

    /// Give up after this many consecutive failures (default: never)
    #[arg(long, env = "MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Reconnect delay after the first failure, in seconds
    #[arg(long, default_value_t = 1.0)]
    pub backoff_floor_secs: f64,

    /// Upper bound for the reconnect delay, in seconds
    #[arg(long, default_value_t = 300.0)]
    pub backoff_ceiling_secs: f64,

    /// Jitter spread: delays are multiplied by a factor in [1 - j, 1 + j]; 0 disables
    #[arg(long, default_value_t = 0.5)]
    pub jitter: f64,

    /// Time an in-flight notification may take to finish on shutdown, in seconds
    #[arg(long, default_value_t = 5)]
    pub grace_secs: u64,

    /// Treat a stream silent for this long as dead, in seconds
    #[arg(long, default_value_t = 90)]
    pub idle_timeout_secs: u64,

    /// SSE event type that carries now-playing updates
    #[arg(long, default_value = crate::sse::DEFAULT_EVENT)]
    pub event_type: String,

    /// Streamer name shown when nobody is live
    #[arg(long, env = "DEFAULT_STREAMER", default_value = "AutoDJ")]
    pub default_streamer: String,

    /// Live streamer whose title and artist tags arrive swapped (repeatable)
    #[arg(long = "swapped-tag-streamer")]
    pub swapped_tag_streamers: Vec<String>,
}

/// Validated settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: Url,
    pub stations: Vec<String>,
    pub api_key: Option<String>,
    pub webhook: Url,
    pub webhook_username: Option<String>,
    pub webhook_timeout: Duration,
    pub log_level: LevelFilter,
    pub log_file: Option<PathBuf>,
    pub log_rotation: Rotation,
    pub debug_metadata: bool,
    pub idle_timeout: Duration,
    pub event_type: String,
    pub tag_rules: TagRules,
    pub supervisor: SupervisorOptions,
}

impl Cli {
    /// Check everything once, before any connection is attempted.
    pub fn into_settings(self) -> Result<Settings, ConfigError> {
        let server = self
            .server
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("server (--server / AZURACAST_SERVER)"))?;
        let server = parse_server(server)?;

        let stations: Vec<String> = self
            .station
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if stations.is_empty() {
            return Err(ConfigError::Missing("station (--station / AZURACAST_STATION)"));
        }
        if let Some(bad) = stations.iter().find(|s| !is_valid_shortcode(s)) {
            return Err(ConfigError::InvalidStation(bad.clone()));
        }

        let webhook = self
            .webhook
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("webhook URL (--webhook / NOW_PLAYING_WEBHOOK)"))?;
        let webhook = parse_webhook(webhook)?;

        let log_level = self
            .log_level
            .trim()
            .parse::<LevelFilter>()
            .map_err(|_| ConfigError::InvalidLogLevel(self.log_level.clone()))?;

        let backoff = parse_backoff(
            self.backoff_floor_secs,
            self.backoff_ceiling_secs,
            self.jitter,
        )?;

        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout(
                "idle timeout must be at least one second".to_string(),
            ));
        }
        if self.webhook_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout(
                "webhook timeout must be at least one second".to_string(),
            ));
        }
        if self.log_max_bytes == 0 {
            return Err(ConfigError::InvalidLogRotation(
                "log file size limit must be positive".to_string(),
            ));
        }

        Ok(Settings {
            server,
            stations,
            api_key: self.api_key.filter(|k| !k.is_empty()),
            webhook,
            webhook_username: self.webhook_username.filter(|u| !u.is_empty()),
            webhook_timeout: Duration::from_secs(self.webhook_timeout_secs),
            log_level,
            log_file: self.log_file,
            log_rotation: Rotation {
                max_bytes: self.log_max_bytes,
                backups: self.log_backups,
            },
            debug_metadata: self.debug_metadata,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            event_type: self.event_type,
            tag_rules: TagRules {
                default_streamer: self.default_streamer,
                swapped_tag_streamers: self.swapped_tag_streamers,
            },
            supervisor: SupervisorOptions {
                backoff,
                max_retries: self.max_retries,
                grace: Duration::from_secs(self.grace_secs),
            },
        })
    }
}

/// Accept a bare host (`spiral.radio`) or a full base URL.
fn parse_server(server: &str) -> Result<Url, ConfigError> {
    let candidate = if server.contains("://") {
        server.to_string()
    } else {
        format!("https://{}", server)
    };

    let url = Url::parse(&candidate).map_err(|e| ConfigError::InvalidServer {
        server: server.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ConfigError::InvalidServer {
            server: server.to_string(),
            reason: "expected an http(s) host".to_string(),
        });
    }
    Ok(url)
}

fn parse_webhook(webhook: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(webhook).map_err(|e| ConfigError::InvalidWebhook {
        url: webhook.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidWebhook {
            url: webhook.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidWebhook {
            url: webhook.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}

fn parse_backoff(floor: f64, ceiling: f64, jitter: f64) -> Result<BackoffPolicy, ConfigError> {
    if !floor.is_finite() || floor <= 0.0 {
        return Err(ConfigError::InvalidBackoff(format!(
            "floor must be positive, got {}",
            floor
        )));
    }
    if !ceiling.is_finite() || ceiling < floor {
        return Err(ConfigError::InvalidBackoff(format!(
            "ceiling {} is below floor {}",
            ceiling, floor
        )));
    }
    if !jitter.is_finite() || !(0.0..=1.0).contains(&jitter) {
        return Err(ConfigError::InvalidBackoff(format!(
            "jitter must be within 0..=1, got {}",
            jitter
        )));
    }

    let floor_delay = backoff_secs("floor", floor)?;
    let ceiling_delay = backoff_secs("ceiling", ceiling)?;
    // Jitter may stretch a delay to ceiling * (1 + jitter) before it is clamped
    backoff_secs("jittered ceiling", ceiling * (1.0 + jitter))?;

    Ok(BackoffPolicy {
        floor: floor_delay,
        ceiling: ceiling_delay,
        factor: 2.0,
        jitter: JitterPolicy::from_spread(jitter),
    })
}

fn backoff_secs(what: &str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|e| {
        ConfigError::InvalidBackoff(format!("{} of {} seconds: {}", what, secs, e))
    })
}

fn is_valid_shortcode(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["nowplaying-relay"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn base_args() -> Vec<&'static str> {
        vec![
            "--server",
            "spiral.radio",
            "--station",
            "radiospiral",
            "--webhook",
            "https://discord.com/api/webhooks/1/abc",
        ]
    }

    #[test]
    fn test_defaults() {
        let settings = parse(&base_args()).into_settings().unwrap();
        assert_eq!(settings.server.as_str(), "https://spiral.radio/");
        assert_eq!(settings.stations, vec!["radiospiral"]);
        assert_eq!(settings.log_level, LevelFilter::Info);
        assert!(!settings.debug_metadata);
        assert_eq!(settings.supervisor.max_retries, None);
        assert_eq!(settings.supervisor.backoff.floor, Duration::from_secs(1));
        assert_eq!(settings.supervisor.backoff.ceiling, Duration::from_secs(300));
        assert_eq!(
            settings.supervisor.backoff.jitter,
            JitterPolicy::Proportional { spread: 0.5 }
        );
        assert_eq!(settings.supervisor.grace, Duration::from_secs(5));
        assert_eq!(settings.webhook_timeout, Duration::from_secs(10));
        assert_eq!(settings.log_rotation.max_bytes, 10 * 1024 * 1024);
        assert_eq!(settings.log_rotation.backups, 5);
        assert_eq!(settings.event_type, "message");
        assert_eq!(settings.tag_rules.default_streamer, "AutoDJ");
    }

    #[test]
    fn test_multiple_stations_and_options() {
        let mut args = base_args();
        args[3] = "one, two";
        args.extend_from_slice(&[
            "--max-retries",
            "5",
            "--log-level",
            "DEBUG",
            "--jitter",
            "0",
            "--swapped-tag-streamer",
            "Cypress Rosewood",
            "--debug-metadata",
            "--webhook-timeout-secs",
            "3",
            "--log-max-bytes",
            "1024",
            "--log-backups",
            "2",
        ]);
        let settings = parse(&args).into_settings().unwrap();
        assert_eq!(settings.stations, vec!["one", "two"]);
        assert_eq!(settings.supervisor.max_retries, Some(5));
        assert_eq!(settings.log_level, LevelFilter::Debug);
        assert_eq!(settings.supervisor.backoff.jitter, JitterPolicy::None);
        assert_eq!(
            settings.tag_rules.swapped_tag_streamers,
            vec!["Cypress Rosewood"]
        );
        assert!(settings.debug_metadata);
        assert_eq!(settings.webhook_timeout, Duration::from_secs(3));
        assert_eq!(settings.log_rotation.max_bytes, 1024);
        assert_eq!(settings.log_rotation.backups, 2);
    }

    #[test]
    fn test_missing_webhook() {
        let cli = parse(&["--server", "spiral.radio", "--station", "radiospiral"]);
        let err = cli.into_settings().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(what) if what.contains("webhook")));
    }

    #[test]
    fn test_missing_station() {
        let cli = parse(&[
            "--server",
            "spiral.radio",
            "--webhook",
            "https://discord.com/api/webhooks/1/abc",
        ]);
        let err = cli.into_settings().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(what) if what.contains("station")));
    }

    #[test]
    fn test_malformed_webhook() {
        for bad in ["not a url", "ftp://example.com/hook", "discord.com/api/webhooks"] {
            let mut args = base_args();
            args[5] = bad;
            let err = parse(&args).into_settings().unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidWebhook { .. }),
                "{} gave {:?}",
                bad,
                err
            );
        }
    }

    #[test]
    fn test_server_with_scheme_kept() {
        let mut args = base_args();
        args[1] = "http://localhost:8080";
        let settings = parse(&args).into_settings().unwrap();
        assert_eq!(settings.server.as_str(), "http://localhost:8080/");
    }

    #[test]
    fn test_invalid_values() {
        let mut args = base_args();
        args[3] = "bad/station";
        assert!(matches!(
            parse(&args).into_settings().unwrap_err(),
            ConfigError::InvalidStation(_)
        ));

        let mut args = base_args();
        args.extend_from_slice(&["--log-level", "loud"]);
        assert!(matches!(
            parse(&args).into_settings().unwrap_err(),
            ConfigError::InvalidLogLevel(_)
        ));

        let mut args = base_args();
        args.extend_from_slice(&["--backoff-floor-secs", "10", "--backoff-ceiling-secs", "5"]);
        assert!(matches!(
            parse(&args).into_settings().unwrap_err(),
            ConfigError::InvalidBackoff(_)
        ));
    }

    #[test]
    fn test_huge_backoff_is_rejected_not_panicking() {
        for (flag, value) in [
            ("--backoff-ceiling-secs", "1e30"),
            ("--backoff-floor-secs", "1e30"),
        ] {
            let mut args = base_args();
            args.extend_from_slice(&[flag, value]);
            if flag == "--backoff-floor-secs" {
                args.extend_from_slice(&["--backoff-ceiling-secs", "1e31"]);
            }
            let err = parse(&args).into_settings().unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidBackoff(_)),
                "{} {} gave {:?}",
                flag,
                value,
                err
            );
        }
    }

    #[test]
    fn test_ceiling_must_leave_room_for_jitter() {
        // Fits a Duration on its own, but not once stretched by 1.5
        let ceiling = (u64::MAX as f64 / 1.2).to_string();
        let mut args = base_args();
        args.extend_from_slice(&["--backoff-ceiling-secs", &ceiling, "--jitter", "0.5"]);
        assert!(matches!(
            parse(&args).into_settings().unwrap_err(),
            ConfigError::InvalidBackoff(msg) if msg.contains("jittered")
        ));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut args = base_args();
        args.extend_from_slice(&["--webhook-timeout-secs", "0"]);
        assert!(matches!(
            parse(&args).into_settings().unwrap_err(),
            ConfigError::InvalidTimeout(_)
        ));

        let mut args = base_args();
        args.extend_from_slice(&["--log-max-bytes", "0"]);
        assert!(matches!(
            parse(&args).into_settings().unwrap_err(),
            ConfigError::InvalidLogRotation(_)
        ));
    }
}
