// src/core/state/core.rs

//! Defines `BrokerState`, the owned aggregate every task works against.

use super::stats::{BrokerStats, StatsRegistry};
use crate::config::Config;
use crate::core::BrokerError;
use crate::core::serializer::CommandSerializer;
use crate::core::upstream::UpstreamLink;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// All shared broker state, constructed once at startup.
///
/// Wrapped in an `Arc` and handed to the accept loop, every client session,
/// and the background tasks. There is no global instance.
#[derive(Debug)]
pub struct BrokerState {
    pub config: Arc<Config>,
    pub stats: Arc<StatsRegistry>,
    pub link: Arc<UpstreamLink>,
    pub serializer: CommandSerializer,
    /// Broadcasts the shutdown signal to sessions and background jobs.
    pub shutdown_tx: broadcast::Sender<()>,
}

impl BrokerState {
    /// Builds the state for a validated configuration. Does not connect.
    pub fn new(config: Config) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        let stats = Arc::new(StatsRegistry::new(
            config.upstream.host.clone(),
            config.upstream.port,
        ));
        let link = Arc::new(UpstreamLink::new(
            &config.upstream,
            stats.clone(),
            shutdown_tx.clone(),
        ));
        let serializer = CommandSerializer::new(&config, link.clone(), stats.clone());

        Arc::new(Self {
            config: Arc::new(config),
            stats,
            link,
            serializer,
            shutdown_tx,
        })
    }

    pub fn snapshot(&self) -> BrokerStats {
        self.stats.snapshot()
    }

    /// The single-line JSON document served by `BROKER:STATUS`.
    pub fn status_json(&self) -> Result<String, BrokerError> {
        serde_json::to_string(&self.snapshot())
            .map_err(|e| BrokerError::Internal(format!("status encoding failed: {e}")))
    }

    /// Polls the link until it reports connected, at most `wait_attempts`
    /// times spaced by `wait_interval`.
    pub async fn wait_until_connected(&self) -> bool {
        let client = &self.config.client;
        let mut attempts = 0;
        while !self.link.is_connected() && attempts < client.wait_attempts {
            tokio::time::sleep(client.wait_interval).await;
            attempts += 1;
        }
        self.link.is_connected()
    }

    /// Signals shutdown to every subscriber and closes the upstream link.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        self.link.close().await;
        info!("Upstream link closed.");
    }
}
