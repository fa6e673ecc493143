// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests

#![allow(dead_code)]

use linebroker::config::Config;
use linebroker::core::BrokerState;
use linebroker::{BrokerClient, BrokerServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Sets up minimal tracing for tests (ignores the error if already initialized).
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("warn"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

/// A configuration pointed at `device` with every timing shrunk to milliseconds.
pub fn test_config(device: SocketAddr) -> Config {
    let mut config = Config::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.upstream.host = device.ip().to_string();
    config.upstream.port = device.port();
    config.upstream.connect_timeout = Duration::from_millis(500);
    config.upstream.banner_timeout = Duration::from_millis(50);
    config.upstream.drain_timeout = Duration::from_millis(10);
    config.upstream.settle_delay = Duration::from_millis(5);
    config.upstream.command_timeout = Duration::from_millis(200);
    config.upstream.reconnect_min_delay = Duration::from_millis(50);
    config.upstream.reconnect_max_delay = Duration::from_millis(400);
    config.client.wait_interval = Duration::from_millis(20);
    config.client.wait_attempts = 50;
    config.queue.wait_timeout = Duration::from_secs(2);
    config
}

/// A broker running in the background on an ephemeral port.
pub struct TestBroker {
    pub addr: SocketAddr,
    pub state: Arc<BrokerState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestBroker {
    /// Starts a broker for `device` with [`test_config`].
    pub async fn start(device: SocketAddr) -> Self {
        Self::with_config(test_config(device)).await
    }

    pub async fn with_config(config: Config) -> Self {
        init_tracing();
        let server = BrokerServer::bind(config)
            .await
            .expect("Failed to start broker");
        let addr = server.local_addr().expect("Broker has no local address");
        let state = server.state();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(async move {
            let _ = shutdown_rx.await;
        }));

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub async fn client(&self) -> BrokerClient {
        BrokerClient::connect(self.addr)
            .await
            .expect("Failed to connect to broker")
    }

    /// A raw line-oriented connection, for checking exact bytes on the wire.
    pub async fn raw(&self) -> RawClient {
        let stream = TcpStream::connect(self.addr)
            .await
            .expect("Failed to connect to broker");
        RawClient::new(stream)
    }

    /// Triggers graceful shutdown and waits for the accept loop to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = tokio::time::timeout(Duration::from_secs(10), handle).await;
        }
    }
}

impl Drop for TestBroker {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// A client that speaks plain lines, with no interpretation of replies.
pub struct RawClient {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl RawClient {
    fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    pub async fn send_line(&mut self, line: &str) {
        self.send_raw(format!("{line}\n").as_bytes()).await;
    }

    /// Reads one reply line without its terminator. `None` means the broker closed the connection.
    pub async fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let n = tokio::time::timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("Timed out waiting for a reply line")
            .unwrap_or(0);
        if n == 0 {
            return None;
        }
        Some(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Asserts that no reply arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        let mut line = String::new();
        let read = tokio::time::timeout(window, self.reader.read_line(&mut line)).await;
        assert!(read.is_err(), "Expected no reply, got {:?}", line);
    }
}

/// Polls `condition` until it holds or `limit` passes. Returns the final result.
pub async fn wait_for(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
