use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

/// Exit status used when a second signal forces the process down.
pub const FORCED_EXIT_CODE: i32 = 130;

/// Route SIGINT/SIGTERM to `token`.
///
/// The first signal cancels the token so every supervisor can wind down. A
/// second one exits immediately.
pub fn install(token: CancellationToken) -> anyhow::Result<()> {
    let signalled = Arc::new(AtomicBool::new(false));

    ctrlc::set_handler(move || on_signal(&token, &signalled))
        .context("Failed to set signal handler")?;
    Ok(())
}

fn on_signal(token: &CancellationToken, signalled: &AtomicBool) {
    if signalled.swap(true, Ordering::SeqCst) {
        log::warn!("Received second interrupt signal, exiting now");
        crate::logging::flush();
        std::process::exit(FORCED_EXIT_CODE);
    }

    log::info!("Received interrupt signal, shutting down...");
    token.cancel();
}
