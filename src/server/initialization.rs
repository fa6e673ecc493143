// src/server/initialization.rs

//! Handles broker initialization: state construction, listener bind, and the
//! first upstream connect.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::BrokerState;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Initializes all broker components before starting the main loop.
///
/// A bind failure is fatal. A failed first connect is not: the broker serves
/// clients with a disconnected status while a background job keeps retrying.
pub async fn setup(config: Config) -> Result<ServerContext> {
    log_startup_info(&config);

    let listener = TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?;
    let local_addr = listener.local_addr()?;
    let connection_permits = Arc::new(Semaphore::new(config.max_clients));

    let state = BrokerState::new(config);
    info!("Broker state initialized.");

    if !state.link.connect().await {
        warn!(
            "Initial connection to {} failed; retrying in the background.",
            state.link.target()
        );
        state.link.schedule_reconnect();
    }

    info!("Broker listening on {}", local_addr);
    info!("Proxying to upstream device at {}", state.link.target());

    Ok(ServerContext {
        state,
        listener,
        background_tasks: JoinSet::new(),
        connection_permits,
    })
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    let upstream = &config.upstream;
    info!(
        "Upstream timing: connect {:?}, settle {:?}, reply {:?}, drain {:?}.",
        upstream.connect_timeout,
        upstream.settle_delay,
        upstream.command_timeout,
        upstream.drain_timeout
    );
    info!(
        "Reconnect backoff from {:?} up to {:?}.",
        upstream.reconnect_min_delay, upstream.reconnect_max_delay
    );
    info!(
        "Accepting up to {} clients; command queue holds {} with a {:?} wait limit.",
        config.max_clients, config.queue.max_pending, config.queue.wait_timeout
    );
}
