// src/server/mod.rs

//! `BrokerServer`: binds the client listener, owns the broker state, and runs
//! the accept loop until shutdown.

use crate::config::Config;
use crate::core::BrokerState;
use anyhow::Result;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

mod connection_loop;
mod context;
mod initialization;
mod metrics_server;
mod spawner;

pub use connection_loop::shutdown_signal;

/// A bound, initialized broker that has not started accepting yet.
pub struct BrokerServer {
    ctx: context::ServerContext,
}

impl BrokerServer {
    /// Binds the listener, makes the first upstream connect attempt, and
    /// spawns background tasks.
    pub async fn bind(config: Config) -> Result<Self> {
        let mut ctx = initialization::setup(config).await?;
        spawner::spawn_all(&mut ctx)?;
        Ok(Self { ctx })
    }

    /// The address clients connect to. Useful when the configured port is 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.ctx.listener.local_addr()?)
    }

    pub fn state(&self) -> Arc<BrokerState> {
        self.ctx.state.clone()
    }

    /// Serves clients until `shutdown` resolves, then shuts down gracefully.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        connection_loop::run(self.ctx, shutdown).await;
    }
}

/// The main broker entry point: serves until SIGINT or SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    let server = BrokerServer::bind(config).await?;
    server.run_until(shutdown_signal()).await;
    Ok(())
}
