// src/server/context.rs

use crate::core::BrokerState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Holds all the initialized state required to run the broker's main loop.
pub struct ServerContext {
    pub state: Arc<BrokerState>,
    pub listener: TcpListener,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
    /// One permit per allowed concurrent client session.
    pub connection_permits: Arc<Semaphore>,
}
