// src/core/upstream/link.rs

//! Owns the one persistent connection to the controlled device.
//!
//! `UpstreamLink` is the only component that touches the device socket. The
//! connection lock (`conn`) guards every state transition and every byte that
//! crosses the socket: callers that need to talk to the device borrow an
//! [`UpstreamSession`], which holds that lock for the whole exchange, so a
//! reconnect can never tear the socket away mid-write.

use super::backoff::Backoff;
use crate::config::UpstreamConfig;
use crate::core::BrokerError;
use crate::core::metrics;
use crate::core::state::StatsRegistry;
use bytes::Bytes;
use parking_lot::Mutex as SyncMutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// Upper bound on reads performed by one pre-command drain, so a device that
// never stops talking cannot stall the command path.
const MAX_DRAIN_READS: usize = 32;

/// The single, exclusively owned connection to the upstream device.
#[derive(Debug)]
pub struct UpstreamLink {
    host: String,
    port: u16,
    connect_timeout: Duration,
    banner_timeout: Duration,
    read_buffer_size: usize,
    /// The connection lock. `Some` exactly when `connected` is true.
    conn: Mutex<Option<TcpStream>>,
    connected: AtomicBool,
    /// Set while a physical connect attempt is running.
    connecting: AtomicBool,
    /// Single-flight guard for the background reconnect job.
    reconnecting: AtomicBool,
    closed: AtomicBool,
    backoff: SyncMutex<Backoff>,
    reconnect_task: SyncMutex<Option<JoinHandle<()>>>,
    stats: Arc<StatsRegistry>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Clears a flag when dropped, including when the owning future is cancelled.
struct FlagGuard<'a>(&'a AtomicBool);

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Holds the reconnect single-flight flag for the lifetime of a spawned job.
struct ReconnectFlight(Arc<UpstreamLink>);

impl Drop for ReconnectFlight {
    fn drop(&mut self) {
        self.0.reconnecting.store(false, Ordering::Release);
        self.0.stats.set_reconnecting(false);
    }
}

impl UpstreamLink {
    /// Creates a disconnected link. Nothing touches the network until `connect`.
    pub fn new(
        config: &UpstreamConfig,
        stats: Arc<StatsRegistry>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            connect_timeout: config.connect_timeout,
            banner_timeout: config.banner_timeout,
            read_buffer_size: config.read_buffer_size,
            conn: Mutex::new(None),
            connected: AtomicBool::new(false),
            connecting: AtomicBool::new(false),
            reconnecting: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            backoff: SyncMutex::new(Backoff::new(
                config.reconnect_min_delay,
                config.reconnect_max_delay,
            )),
            reconnect_task: SyncMutex::new(None),
            stats,
            shutdown_tx,
        }
    }

    /// The `host:port` this link connects to.
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting.load(Ordering::Acquire)
    }

    /// The delay the reconnect loop will wait before its next attempt.
    pub fn reconnect_delay(&self) -> Duration {
        self.backoff.lock().current()
    }

    /// Opens the connection if it is not already open.
    ///
    /// Only one physical attempt runs at a time. A caller that arrives while
    /// another attempt is in flight gets `false` immediately instead of
    /// starting a second one.
    pub async fn connect(&self) -> bool {
        self.attempt(false).await
    }

    /// One connect attempt. With `backoff_on_failure`, a failed dial advances
    /// the reconnect delay under the connection lock.
    async fn attempt(&self, backoff_on_failure: bool) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        if self
            .connecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Connect to {} already in progress.", self.target());
            return false;
        }
        let _attempt = FlagGuard(&self.connecting);

        let mut conn = self.conn.lock().await;
        if conn.is_some() {
            self.backoff.lock().reset();
            return true;
        }

        self.stats.record_connection_attempt();
        metrics::CONNECTION_ATTEMPTS_TOTAL.inc();
        info!("Connecting to upstream device at {}...", self.target());

        match self.open().await {
            Ok(stream) => {
                *conn = Some(stream);
                self.backoff.lock().reset();
                self.set_connected(true);
                self.stats.record_successful_connection();
                metrics::SUCCESSFUL_CONNECTIONS_TOTAL.inc();
                info!("Connected to upstream device at {}.", self.target());
                true
            }
            Err(e) => {
                warn!("Failed to connect to upstream device at {}: {}", self.target(), e);
                self.stats.record_error(e.to_string());
                if backoff_on_failure {
                    self.backoff.lock().advance();
                }
                false
            }
        }
    }

    /// Dials the device and discards its greeting.
    async fn open(&self) -> Result<TcpStream, BrokerError> {
        let dial = TcpStream::connect((self.host.as_str(), self.port));
        let mut stream = tokio::time::timeout(self.connect_timeout, dial)
            .await
            .map_err(|_| BrokerError::ConnectTimeout(self.connect_timeout))??;
        stream.set_nodelay(true)?;

        let discarded =
            drain_stream(&mut stream, self.read_buffer_size, self.banner_timeout, 1).await?;
        if discarded > 0 {
            debug!("Discarded {} byte(s) of device greeting.", discarded);
        }
        Ok(stream)
    }

    /// Closes the connection if one is open. Safe to call at any time.
    pub async fn disconnect(&self) {
        let mut conn = self.conn.lock().await;
        self.clear(&mut conn).await;
    }

    /// Drops the handle and the connected flag together, under the connection lock.
    async fn clear(&self, conn: &mut Option<TcpStream>) {
        if let Some(mut stream) = conn.take() {
            let _ = stream.shutdown().await;
            info!("Disconnected from upstream device at {}.", self.target());
        }
        self.set_connected(false);
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
        self.stats.set_connected(connected);
        metrics::UPSTREAM_CONNECTED.set(if connected { 1.0 } else { 0.0 });
    }

    /// Disconnects, then retries `connect` with exponential backoff until it succeeds.
    ///
    /// Runs until connected or until the link is closed. Use
    /// [`schedule_reconnect`](Self::schedule_reconnect) to run it in the background.
    pub async fn reconnect(&self) {
        self.disconnect().await;

        loop {
            if self.closed.load(Ordering::Acquire) {
                return;
            }
            let delay = self.reconnect_delay();
            info!("Reconnecting to {} in {:?}...", self.target(), delay);
            tokio::time::sleep(delay).await;

            if self.attempt(true).await || self.is_connected() {
                return;
            }
        }
    }

    /// Starts `reconnect` as a background job unless one is already running.
    ///
    /// Returns `true` if a new job was spawned. The job stops early on shutdown.
    pub fn schedule_reconnect(self: &Arc<Self>) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        if self
            .reconnecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Reconnect already running; ignoring trigger.");
            return false;
        }
        self.stats.set_reconnecting(true);

        // Held until the handle is stored.
        let mut slot = self.reconnect_task.lock();
        let flight = ReconnectFlight(Arc::clone(self));
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let link = &flight.0;
            tokio::select! {
                _ = link.reconnect() => {}
                _ = shutdown_rx.recv() => {
                    info!("Reconnect job stopped by shutdown.");
                }
            }
        });
        *slot = Some(handle);
        true
    }

    /// Borrows the connection for one command exchange.
    ///
    /// Waits for the connection lock; fails with `NotConnected` if there is no
    /// open connection once the lock is held.
    pub async fn session(&self) -> Result<UpstreamSession<'_>, BrokerError> {
        let conn = self.conn.lock().await;
        if conn.is_none() {
            return Err(BrokerError::NotConnected);
        }
        Ok(UpstreamSession {
            link: self,
            conn,
            read_buffer_size: self.read_buffer_size,
        })
    }

    /// Shuts the link down for good: cancels any reconnect job and disconnects.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(handle) = self.reconnect_task.lock().take() {
            handle.abort();
        }
        self.disconnect().await;
    }
}

/// Exclusive access to the device connection for the duration of one exchange.
///
/// Holding a session holds the connection lock. Any I/O failure drops the
/// connection before the error is returned, so the link never reports
/// "connected" over a dead socket.
pub struct UpstreamSession<'a> {
    link: &'a UpstreamLink,
    conn: MutexGuard<'a, Option<TcpStream>>,
    read_buffer_size: usize,
}

impl UpstreamSession<'_> {
    /// Discards output the device sent on its own since the last exchange.
    ///
    /// Stops at the first read that finds nothing within `window`. Returns the
    /// number of bytes thrown away.
    pub async fn drain_pending(&mut self, window: Duration) -> Result<usize, BrokerError> {
        let size = self.read_buffer_size;
        let stream = self.stream()?;
        let result = drain_stream(stream, size, window, MAX_DRAIN_READS).await;
        self.check(result).await
    }

    /// Writes one already-terminated command line.
    pub async fn write_line(&mut self, line: &[u8]) -> Result<(), BrokerError> {
        let stream = self.stream()?;
        let result = async {
            stream.write_all(line).await?;
            stream.flush().await?;
            Ok::<_, BrokerError>(())
        }
        .await;
        self.check(result).await
    }

    /// Reads whatever the device sends within `timeout`, up to one buffer.
    ///
    /// `Ok(None)` means nothing arrived in time.
    pub async fn read_reply(&mut self, timeout: Duration) -> Result<Option<Bytes>, BrokerError> {
        let size = self.read_buffer_size;
        let stream = self.stream()?;
        let mut buf = vec![0u8; size];
        let result = match tokio::time::timeout(timeout, stream.read(&mut buf)).await {
            Err(_) => Ok(None),
            Ok(Ok(0)) => Err(BrokerError::UpstreamClosed),
            Ok(Ok(n)) => {
                buf.truncate(n);
                Ok(Some(Bytes::from(buf)))
            }
            Ok(Err(e)) => Err(e.into()),
        };
        self.check(result).await
    }

    fn stream(&mut self) -> Result<&mut TcpStream, BrokerError> {
        self.conn.as_mut().ok_or(BrokerError::NotConnected)
    }

    async fn check<T>(&mut self, result: Result<T, BrokerError>) -> Result<T, BrokerError> {
        if let Err(e) = &result
            && e.is_link_failure()
        {
            warn!("Upstream I/O failed: {}. Dropping connection.", e);
            self.link.clear(&mut self.conn).await;
        }
        result
    }
}

/// Reads and discards until a read finds nothing within `window`, the peer
/// closes, or `max_reads` reads have returned data.
async fn drain_stream(
    stream: &mut TcpStream,
    buffer_size: usize,
    window: Duration,
    max_reads: usize,
) -> Result<usize, BrokerError> {
    let mut buf = vec![0u8; buffer_size];
    let mut discarded = 0;
    for _ in 0..max_reads {
        match tokio::time::timeout(window, stream.read(&mut buf)).await {
            Err(_) => break,
            Ok(Ok(0)) => return Err(BrokerError::UpstreamClosed),
            Ok(Ok(n)) => discarded += n,
            Ok(Err(e)) => return Err(e.into()),
        }
    }
    Ok(discarded)
}
