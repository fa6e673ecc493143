// tests/integration/client_test.rs

//! Tests for `BrokerClient` against a running broker.

use super::fixtures::{FakeDevice, STATUS_REPLY};
use super::test_helpers::TestBroker;
use linebroker::BrokerClient;
use linebroker::core::BrokerError;
use std::time::Duration;

#[tokio::test]
async fn test_client_rejects_empty_request_locally() {
    let device = FakeDevice::start().await;
    let broker = TestBroker::start(device.addr()).await;
    let mut client = broker.client().await;

    assert_eq!(client.send("   ").await.unwrap_err(), BrokerError::EmptyCommand);
    assert_eq!(client.send("Status").await.unwrap(), STATUS_REPLY);

    broker.stop().await;
}

#[tokio::test]
async fn test_client_reconnect_and_wait() {
    let device = FakeDevice::start().await;
    let broker = TestBroker::start(device.addr()).await;
    let mut client = broker.client().await;

    client.reconnect().await.unwrap();
    assert!(client.wait_for_upstream().await.unwrap());
    assert_eq!(client.send("Status").await.unwrap(), STATUS_REPLY);

    let stats = client.status().await.unwrap();
    assert!(stats.successful_connections >= 1);
    assert_eq!(stats.commands_processed, 1);

    broker.stop().await;
}

#[tokio::test]
async fn test_client_reply_timeout() {
    let device = FakeDevice::start().await;
    let mut config = super::test_helpers::test_config(device.addr());
    config.upstream.command_timeout = Duration::from_secs(1);
    let broker = TestBroker::with_config(config).await;
    let mut client = broker
        .client()
        .await
        .with_reply_timeout(Duration::from_millis(50));

    let err = client.send("Slow").await.unwrap_err();
    assert!(matches!(err, BrokerError::Protocol(_)));

    broker.stop().await;
}

#[tokio::test]
async fn test_client_refuses_requests_after_reply_timeout() {
    let device = FakeDevice::start().await;
    let mut config = super::test_helpers::test_config(device.addr());
    config.upstream.command_timeout = Duration::from_secs(1);
    let broker = TestBroker::with_config(config).await;
    let mut client = broker
        .client()
        .await
        .with_reply_timeout(Duration::from_millis(50));

    assert!(matches!(
        client.send("Slow").await.unwrap_err(),
        BrokerError::Protocol(_)
    ));

    // The late "SlowDone" must never be handed out as the answer to Status.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let err = client.send("Status").await.unwrap_err();
    assert_eq!(
        err,
        BrokerError::Protocol("connection desynchronized".into())
    );

    let mut fresh = broker.client().await;
    assert_eq!(fresh.send("Status").await.unwrap(), STATUS_REPLY);

    broker.stop().await;
}

#[tokio::test]
async fn test_client_rejects_multi_line_request() {
    let device = FakeDevice::start().await;
    let broker = TestBroker::start(device.addr()).await;
    let mut client = broker.client().await;

    for line in ["Alpha\nBeta", "Alpha\r\nBeta", "Alpha\r"] {
        assert!(matches!(
            client.send(line).await.unwrap_err(),
            BrokerError::Protocol(_)
        ));
    }

    // Nothing was written, so the client stays in step.
    assert_eq!(client.send("Status").await.unwrap(), STATUS_REPLY);
    assert_eq!(client.send("Gamma").await.unwrap(), "ACK Gamma");
    assert_eq!(device.received(), vec!["Status", "Gamma"]);

    broker.stop().await;
}

#[tokio::test]
async fn test_client_connect_refused() {
    let mut device = FakeDevice::start().await;
    let addr = device.addr();
    device.stop().await;

    let err = BrokerClient::connect(addr).await.unwrap_err();
    assert!(matches!(
        err,
        BrokerError::Io(_) | BrokerError::ConnectTimeout(_)
    ));
}
