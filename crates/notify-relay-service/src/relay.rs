//! Wiring of queue, broadcaster and processor into a running relay.

use crate::config::{BroadcasterConfig, RelayConfig};
use crate::error::RelayError;
use notify_relay_core::{
    CancellationToken, ChannelBroadcaster, NotificationBroadcaster, QueueProcessor,
    SignalRBroadcaster, StatsSnapshot,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};

#[cfg(test)]
#[path = "relay_tests.rs"]
mod tests;

/// A configured processor bound to the host shutdown signal
pub struct Relay {
    processor: QueueProcessor,
    shutdown: CancellationToken,
    shutdown_timeout: Duration,
    local_feed: Option<broadcast::Receiver<String>>,
}

impl Relay {
    /// Build the relay described by `config`
    ///
    /// With the in-process broadcaster the host logs every notification it
    /// relays.
    pub fn from_config(
        config: RelayConfig,
        shutdown: &CancellationToken,
    ) -> Result<Self, RelayError> {
        config.validate()?;

        let (broadcaster, local_feed): (Arc<dyn NotificationBroadcaster>, _) =
            match &config.broadcaster {
                BroadcasterConfig::InProcess(in_process) => {
                    let channel = ChannelBroadcaster::new(in_process.capacity);
                    let feed = channel.subscribe();
                    (Arc::new(channel), Some(feed))
                }
                BroadcasterConfig::SignalR(signalr) => {
                    let broadcaster = SignalRBroadcaster::from_connection_string(
                        &signalr.connection_string,
                        &signalr.hub,
                        signalr.target.clone(),
                        Duration::from_secs(signalr.request_timeout_seconds),
                    )?;
                    info!(hub_url = %broadcaster.hub_url(), "Using hub broadcaster");
                    (Arc::new(broadcaster), None)
                }
            };

        let mut relay = Self::with_broadcaster(config, broadcaster, shutdown)?;
        relay.local_feed = local_feed;
        Ok(relay)
    }

    /// Build a relay that delivers through a caller-supplied broadcaster
    pub fn with_broadcaster(
        config: RelayConfig,
        broadcaster: Arc<dyn NotificationBroadcaster>,
        shutdown: &CancellationToken,
    ) -> Result<Self, RelayError> {
        let shutdown_timeout = config.shutdown_timeout();

        let processor = QueueProcessor::new(config.processor, config.queue, broadcaster)
            .map_err(RelayError::Processor)?
            .with_shutdown_signal(shutdown);

        Ok(Self {
            processor,
            shutdown: shutdown.clone(),
            shutdown_timeout,
            local_feed: None,
        })
    }

    pub fn processor(&self) -> &QueueProcessor {
        &self.processor
    }

    /// Run until the shutdown signal fires, then stop within the shutdown window
    ///
    /// Returns the processing counters of the run.
    pub async fn run(self) -> Result<StatsSnapshot, RelayError> {
        let Relay {
            processor,
            shutdown,
            shutdown_timeout,
            local_feed,
        } = self;

        let feed_task = local_feed.map(|feed| tokio::spawn(log_local_notifications(feed)));

        processor.start().await.map_err(RelayError::Startup)?;
        info!("Relay running");

        shutdown.cancelled().await;
        info!(
            timeout_seconds = shutdown_timeout.as_secs(),
            "Shutdown requested; waiting for in-flight notifications"
        );

        let stopped = processor.stop(shutdown_timeout).await;
        let stats = processor.stats();
        drop(processor);

        if let Some(task) = feed_task {
            task.abort();
        }

        stopped.map_err(RelayError::Shutdown)?;

        info!(
            delivered = stats.delivered,
            dropped = stats.dropped,
            deferred = stats.deferred,
            "Relay stopped"
        );
        Ok(stats)
    }
}

async fn log_local_notifications(mut feed: broadcast::Receiver<String>) {
    loop {
        match feed.recv().await {
            Ok(payload) => info!(payload = %payload, "Notification relayed"),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Notification log fell behind; skipped notifications")
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Resolve when the process receives SIGINT or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
