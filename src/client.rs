// src/client.rs

//! A small asynchronous client for the broker's line protocol.
//!
//! Services that need the device talk to the broker through this instead of
//! opening their own device session.

use crate::core::protocol::{META_PREFIX, MetaCommand};
use crate::core::{BrokerError, BrokerStats};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::{Framed, LinesCodec};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
// Covers a full queue wait plus one device exchange with default settings.
const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(40);

/// A connection to a running broker.
#[derive(Debug)]
pub struct BrokerClient {
    /// `None` once an exchange failed and the reply stream can no longer be
    /// matched to requests.
    framed: Option<Framed<TcpStream, LinesCodec>>,
    reply_timeout: Duration,
}

impl BrokerClient {
    /// Connects with a short timeout.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, BrokerError> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| BrokerError::ConnectTimeout(CONNECT_TIMEOUT))??;
        Ok(Self {
            framed: Some(Framed::new(stream, LinesCodec::new())),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        })
    }

    /// Overrides how long to wait for each reply line.
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Sends one line and returns the reply line exactly as received.
    ///
    /// A timeout or transport failure leaves a reply unaccounted for, so the
    /// client refuses every later request with `Protocol`.
    pub async fn request(&mut self, line: &str) -> Result<String, BrokerError> {
        if line.trim().is_empty() {
            return Err(BrokerError::EmptyCommand);
        }
        if line.contains(['\r', '\n']) {
            return Err(BrokerError::Protocol(
                "request must be a single line".into(),
            ));
        }
        let framed = self
            .framed
            .as_mut()
            .ok_or_else(|| BrokerError::Protocol("connection desynchronized".into()))?;
        let result = exchange(framed, line, self.reply_timeout).await;
        if result.is_err() {
            self.framed = None;
        }
        result
    }

    /// Sends a device command. An `ERROR:` reply becomes `BrokerError::Remote`.
    pub async fn send(&mut self, command: &str) -> Result<String, BrokerError> {
        let reply = self.request(command).await?;
        match reply.strip_prefix("ERROR:") {
            Some(message) => Err(BrokerError::Remote(message.trim().to_string())),
            None => Ok(reply),
        }
    }

    /// Fetches and parses the broker's statistics.
    pub async fn status(&mut self) -> Result<BrokerStats, BrokerError> {
        let reply = self.send(&meta_line(MetaCommand::Status)).await?;
        Ok(serde_json::from_str(&reply)?)
    }

    /// Asks the broker to reconnect to the device in the background.
    pub async fn reconnect(&mut self) -> Result<(), BrokerError> {
        self.send(&meta_line(MetaCommand::Reconnect)).await?;
        Ok(())
    }

    /// Blocks until the broker reports its device connection is up or its wait bound passes.
    pub async fn wait_for_upstream(&mut self) -> Result<bool, BrokerError> {
        let reply = self.request(&meta_line(MetaCommand::Wait)).await?;
        Ok(reply.starts_with("OK"))
    }
}

async fn exchange(
    framed: &mut Framed<TcpStream, LinesCodec>,
    line: &str,
    reply_timeout: Duration,
) -> Result<String, BrokerError> {
    framed.send(line).await?;
    match tokio::time::timeout(reply_timeout, framed.next()).await {
        Err(_) => Err(BrokerError::Protocol(format!(
            "no reply within {reply_timeout:?}"
        ))),
        Ok(None) => Err(BrokerError::Protocol("broker closed the connection".into())),
        Ok(Some(reply)) => Ok(reply?),
    }
}

fn meta_line(meta: MetaCommand) -> String {
    format!("{META_PREFIX}{meta}")
}
