// tests/integration/serializer_test.rs

//! Tests for `CommandSerializer` driven directly against a fake device.

use super::fixtures::{FakeDevice, STATUS_REPLY};
use super::test_helpers::{init_tracing, test_config, wait_for};
use linebroker::core::{BrokerError, BrokerState};
use std::sync::Arc;
use std::time::Duration;

async fn connected_state(device: &FakeDevice) -> Arc<BrokerState> {
    init_tracing();
    let state = BrokerState::new(test_config(device.addr()));
    assert!(state.link.connect().await);
    state
}

#[tokio::test]
async fn test_send_returns_reply() {
    let device = FakeDevice::start().await;
    let state = connected_state(&device).await;

    let reply = state
        .serializer
        .send("Status", Duration::from_millis(200))
        .await
        .unwrap();
    assert_eq!(reply, STATUS_REPLY);
    assert_eq!(state.stats.commands_processed(), 1);

    state.shutdown().await;
}

#[tokio::test]
async fn test_send_strips_client_terminator_before_framing() {
    let device = FakeDevice::start().await;
    let state = connected_state(&device).await;

    state
        .serializer
        .send("Power1Off\r\n", Duration::from_millis(100))
        .await
        .unwrap();
    assert_eq!(state.serializer.frame("Power1Off"), "Power1Off\r\n");
    assert_eq!(state.serializer.frame("Power1Off\r\n"), "Power1Off\r\n");
    assert_eq!(device.received(), vec!["Power1Off"]);

    state.shutdown().await;
}

#[tokio::test]
async fn test_silence_is_success_with_empty_body() {
    let device = FakeDevice::start().await;
    let state = connected_state(&device).await;

    let reply = state
        .serializer
        .send("Power1On", Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(reply, "");
    assert_eq!(state.stats.commands_processed(), 1);
    assert_eq!(state.stats.commands_failed(), 0);
    assert!(state.link.is_connected());

    state.shutdown().await;
}

#[tokio::test]
async fn test_empty_command_is_rejected_without_counting() {
    let device = FakeDevice::start().await;
    let state = connected_state(&device).await;

    let err = state
        .serializer
        .send("  \r\n", Duration::from_millis(50))
        .await
        .unwrap_err();
    assert_eq!(err, BrokerError::EmptyCommand);
    assert_eq!(state.stats.commands_processed(), 0);
    assert_eq!(state.stats.commands_failed(), 0);
    assert!(device.received().is_empty());

    state.shutdown().await;
}

#[tokio::test]
async fn test_commands_are_strictly_serialized() {
    let device = FakeDevice::start().await;
    let state = connected_state(&device).await;

    let mut tasks = Vec::new();
    for i in 0..10 {
        let state = state.clone();
        tasks.push(tokio::spawn(async move {
            let command = format!("Route{i}");
            let reply = state
                .serializer
                .send(&command, Duration::from_millis(200))
                .await
                .unwrap();
            (command, reply)
        }));
    }
    for task in tasks {
        let (command, reply) = task.await.unwrap();
        assert_eq!(reply, format!("ACK {command}"));
    }
    assert_eq!(state.stats.commands_processed(), 10);
    assert_eq!(device.received().len(), 10);

    state.shutdown().await;
}

#[tokio::test]
async fn test_send_connects_inline_when_disconnected() {
    let device = FakeDevice::start().await;
    init_tracing();
    let state = BrokerState::new(test_config(device.addr()));
    assert!(!state.link.is_connected());

    let reply = state
        .serializer
        .send("Status", Duration::from_millis(200))
        .await
        .unwrap();
    assert_eq!(reply, STATUS_REPLY);
    assert_eq!(state.stats.snapshot().successful_connections, 1);

    state.shutdown().await;
}

#[tokio::test]
async fn test_send_without_device_fails_not_connected() {
    let mut device = FakeDevice::start().await;
    device.stop().await;
    init_tracing();
    let state = BrokerState::new(test_config(device.addr()));

    let err = state
        .serializer
        .send("Status", Duration::from_millis(50))
        .await
        .unwrap_err();
    assert_eq!(err, BrokerError::NotConnected);

    let stats = state.snapshot();
    assert_eq!(stats.commands_failed, 1);
    assert_eq!(stats.commands_processed, 0);
    assert_eq!(
        stats.last_error.as_deref(),
        Some("Not connected to upstream device")
    );

    state.shutdown().await;
}

#[tokio::test]
async fn test_hangup_fails_command_and_schedules_reconnect() {
    let device = FakeDevice::start().await;
    let state = connected_state(&device).await;

    let err = state
        .serializer
        .send("Hangup", Duration::from_millis(200))
        .await
        .unwrap_err();
    assert_eq!(err, BrokerError::UpstreamClosed);
    assert_eq!(state.stats.commands_failed(), 1);

    let link = state.link.clone();
    assert!(wait_for(Duration::from_secs(2), || link.is_connected()).await);
    assert_eq!(device.connections(), 2);

    let reply = state
        .serializer
        .send("Status", Duration::from_millis(200))
        .await
        .unwrap();
    assert_eq!(reply, STATUS_REPLY);

    state.shutdown().await;
}

#[tokio::test]
async fn test_queue_rejections_do_not_drop_the_link() {
    let device = FakeDevice::start().await;
    init_tracing();
    let mut config = test_config(device.addr());
    config.queue.max_pending = 1;
    let state = BrokerState::new(config);
    assert!(state.link.connect().await);

    let busy = state.clone();
    let in_flight = tokio::spawn(async move {
        busy.serializer
            .send("Slow", Duration::from_secs(1))
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = state
        .serializer
        .send("Status", Duration::from_millis(200))
        .await
        .unwrap_err();
    assert_eq!(err, BrokerError::QueueFull);
    assert!(state.link.is_connected());
    assert!(!state.link.is_reconnecting());

    assert_eq!(in_flight.await.unwrap().unwrap(), "SlowDone");
    assert_eq!(state.stats.commands_failed(), 1);

    state.shutdown().await;
}
