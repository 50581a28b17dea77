//! Tests for relay wiring and the run lifecycle.

use super::*;
use crate::config::{InProcessBroadcasterConfig, SignalRBroadcasterConfig};
use notify_queue::{AzureStorageQueueConfig, InMemoryConfig, ProviderConfig};

fn seeded_config(bodies: &[&str]) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.queue.provider = ProviderConfig::InMemory(InMemoryConfig {
        seed_messages: bodies.iter().map(|b| b.to_string()).collect(),
    });
    config
}

fn cancel_after(shutdown: &CancellationToken, delay: Duration) {
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        trigger.cancel();
    });
}

#[tokio::test(start_paused = true)]
async fn test_in_process_relay_delivers_seeded_messages() {
    let shutdown = CancellationToken::new();
    let relay = Relay::from_config(seeded_config(&["first", "second"]), &shutdown)
        .expect("relay builds");

    cancel_after(&shutdown, Duration::from_secs(1));
    let stats = relay.run().await.expect("relay stops cleanly");

    assert_eq!(stats.delivered, 2);
    assert_eq!(stats.dropped, 0);
    assert_eq!(stats.deferred, 0);
}

#[tokio::test(start_paused = true)]
async fn test_supplied_broadcaster_receives_payloads_in_order() {
    let shutdown = CancellationToken::new();
    let channel = ChannelBroadcaster::default();
    let mut subscriber = channel.subscribe();

    let relay = Relay::with_broadcaster(
        seeded_config(&[r#"{"id":1}"#, r#"{"id":2}"#]),
        Arc::new(channel),
        &shutdown,
    )
    .expect("relay builds");
    let running = tokio::spawn(relay.run());

    assert_eq!(subscriber.recv().await.unwrap(), r#"{"id":1}"#);
    assert_eq!(subscriber.recv().await.unwrap(), r#"{"id":2}"#);

    shutdown.cancel();
    let stats = running.await.unwrap().expect("relay stops cleanly");
    assert_eq!(stats.delivered, 2);
}

#[tokio::test]
async fn test_cancelled_shutdown_never_polls() {
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let relay = Relay::from_config(seeded_config(&["ignored"]), &shutdown).expect("relay builds");
    let stats = relay.run().await.expect("relay stops cleanly");

    assert_eq!(stats.receives, 0);
    assert_eq!(stats.delivered, 0);
}

#[test]
fn test_malformed_hub_connection_string_is_configuration_error() {
    let mut config = RelayConfig::default();
    config.broadcaster = BroadcasterConfig::SignalR(SignalRBroadcasterConfig {
        connection_string: "Endpoint=https://relay.service.signalr.net;Version=1.0;".to_string(),
        ..Default::default()
    });

    let error = Relay::from_config(config, &CancellationToken::new())
        .err()
        .expect("missing access key is rejected");

    assert!(matches!(error, RelayError::Broadcaster(_)));
    assert_eq!(error.exit_code(), 3);
}

#[test]
fn test_invalid_processor_settings_are_rejected() {
    let mut config = RelayConfig::default();
    config.processor.polling.batch_size = 0;

    let error = Relay::from_config(config, &CancellationToken::new())
        .err()
        .expect("invalid batch size is rejected");

    assert_eq!(error.exit_code(), 3);
    assert!(error.to_string().contains("batch_size"));
}

#[test]
fn test_zero_capacity_channel_is_rejected() {
    let mut config = RelayConfig::default();
    config.broadcaster = BroadcasterConfig::InProcess(InProcessBroadcasterConfig { capacity: 0 });

    let error = Relay::from_config(config, &CancellationToken::new())
        .err()
        .expect("zero capacity is rejected");

    assert_eq!(error.exit_code(), 3);
}

#[tokio::test]
async fn test_unusable_queue_fails_startup() {
    let mut config = RelayConfig::default();
    config.queue.provider = ProviderConfig::AzureStorage(AzureStorageQueueConfig {
        account_name: Some("relaystore".to_string()),
        ..Default::default()
    });

    let shutdown = CancellationToken::new();
    let relay = Relay::from_config(config, &shutdown).expect("relay builds");

    let error = relay.run().await.err().expect("startup fails");

    assert!(matches!(error, RelayError::Startup(_)));
    assert_eq!(error.exit_code(), 4);
}
