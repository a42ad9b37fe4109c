//! Process wiring: one supervisor per station on a shared runtime and HTTP client.

use std::time::Duration;

use reqwest::Client;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::error::RunError;
use crate::events::Bus;
use crate::notifier::WebhookNotifier;
use crate::shutdown;
use crate::source::{AzuracastSource, SourceOptions};
use crate::supervisor::Supervisor;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Run the relay until a signal arrives or a station gives up.
pub fn run(settings: Settings) -> Result<(), RunError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| RunError::Startup(format!("failed to build runtime: {}", e)))?;

    let shutdown = CancellationToken::new();
    shutdown::install(shutdown.clone()).map_err(|e| RunError::Startup(format!("{:#}", e)))?;

    runtime.block_on(run_stations(settings, shutdown, Bus::default()))
}

/// Drive every configured station until `shutdown` fires or one exhausts its retries.
///
/// Lifecycle events of all stations go to `bus`, tagged with their station.
pub async fn run_stations(
    settings: Settings,
    shutdown: CancellationToken,
    bus: Bus,
) -> Result<(), RunError> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| RunError::Startup(format!("failed to build HTTP client: {}", e)))?;

    let notifier = WebhookNotifier::new(client.clone(), settings.webhook.clone())
        .with_username(settings.webhook_username.clone())
        .with_timeout(settings.webhook_timeout);

    let mut tasks = JoinSet::new();
    for station in &settings.stations {
        let source = AzuracastSource::new(
            client.clone(),
            SourceOptions {
                server: settings.server.clone(),
                station: station.clone(),
                api_key: settings.api_key.clone(),
                event_type: settings.event_type.clone(),
                idle_timeout: settings.idle_timeout,
                debug_metadata: settings.debug_metadata,
                tag_rules: settings.tag_rules.clone(),
            },
        );
        log::info!("[{}] Following {}", station, source.url());

        let mut supervisor = Supervisor::new(
            source,
            notifier.clone(),
            settings.supervisor,
            shutdown.child_token(),
        )
        .with_bus(bus.clone());
        tasks.spawn(async move { supervisor.run().await });
    }

    let mut outcome = Ok(());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                log::error!("{}", e);
                if outcome.is_ok() {
                    // One station giving up takes the others down with it
                    shutdown.cancel();
                    outcome = Err(e);
                }
            }
            Err(e) => {
                log::error!("Station task failed: {}", e);
                if outcome.is_ok() {
                    shutdown.cancel();
                    outcome = Err(RunError::Task(e.to_string()));
                }
            }
        }
    }

    log::info!("All stations stopped");
    outcome
}
