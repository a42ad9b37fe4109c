use std::process::ExitCode;

use clap::Parser;

use nowplaying_relay::config::Cli;
use nowplaying_relay::{app, logging};

fn main() -> ExitCode {
    let settings = match Cli::parse().into_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::from(2);
        }
    };

    if let Err(e) = logging::init(
        settings.log_level,
        settings.log_file.as_deref(),
        settings.log_rotation,
    ) {
        eprintln!("Failed to initialize logging: {:#}", e);
        return ExitCode::from(1);
    }

    log::info!(
        "Starting nowplaying-relay for {} station(s) on {}",
        settings.stations.len(),
        settings.server
    );

    let result = app::run(settings);
    let code = match &result {
        Ok(()) => {
            log::info!("Shut down cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Exiting: {}", e);
            ExitCode::from(e.exit_code())
        }
    };

    logging::flush();
    code
}
