//! # Notify Relay
//!
//! Binary entry point for the notification relay.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes structured logging
//! - Drains the configured queue into the configured broadcaster
//! - Stops gracefully on SIGINT or SIGTERM
//!
//! Exit codes: 3 for configuration errors, 4 when the relay cannot start,
//! 5 when it does not stop within the shutdown window.

use anyhow::Context;
use notify_relay_core::CancellationToken;
use notify_relay_service::{shutdown_signal, telemetry, Relay, RelayConfig, RelayError};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        let exit_code = e
            .downcast_ref::<RelayError>()
            .map(RelayError::exit_code)
            .unwrap_or(1);

        if tracing::dispatcher::has_been_set() {
            error!(error = %format!("{:#}", e), exit_code, "Notify relay terminated");
        } else {
            eprintln!("notify-relay: {:#}", e);
        }

        std::process::exit(exit_code);
    }

    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let config = RelayConfig::load()
        .map_err(RelayError::from)
        .context("Could not load relay configuration")?;

    telemetry::init(&config.logging)
        .map_err(RelayError::from)
        .context("Could not initialize logging")?;

    info!(
        queue = %config.queue.queue_name,
        provider = %config.queue.provider.provider_type(),
        "Starting notify relay"
    );

    let shutdown = CancellationToken::new();
    let relay = Relay::from_config(config, &shutdown)?;

    let signal = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal.cancel();
    });

    let stats = relay.run().await?;
    info!(
        receives = stats.receives,
        receive_failures = stats.receive_failures,
        delete_failures = stats.delete_failures,
        "Notify relay exited"
    );

    Ok(())
}
