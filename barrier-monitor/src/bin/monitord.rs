//! The barrier-monitor daemon.

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};

use barrier_monitor::clock::SystemClock;
use barrier_monitor::config::{DEFAULT_CONFIG_PATH, Settings};
use barrier_monitor::daemon::Daemon;
use barrier_monitor::tracing::{self, prelude::*};

fn main() -> Result<()> {
    // Both need a single-threaded process to read the local UTC offset, so
    // they run before the runtime starts its workers.
    let clock = SystemClock::local();
    tracing::init_journald_or_stdout();

    let path = env::var("BARRIER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let settings =
        Settings::load(&path).with_context(|| format!("loading configuration from {path}"))?;
    info!(config = %path, circuits = settings.circuits.len(), "Configuration loaded");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting tokio runtime")?;

    runtime.block_on(async move {
        let daemon = Daemon::new(settings, Arc::new(clock));
        let shutdown = daemon.shutdown_token();
        tokio::spawn(async move {
            wait_for_signal().await;
            shutdown.cancel();
        });
        daemon.run().await
    })?;

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
        _ = term.recv() => info!("Received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received Ctrl-C");
}
