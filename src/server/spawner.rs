// src/server/spawner.rs

//! Spawns the broker's long-running background tasks.

use super::context::ServerContext;
use super::metrics_server;
use anyhow::Result;
use tracing::info;

/// Spawns all optional background tasks into the context's JoinSet.
///
/// The reconnect job is not started here: `UpstreamLink` spawns it on demand
/// and guarantees at most one runs at a time.
pub fn spawn_all(ctx: &mut ServerContext) -> Result<()> {
    let state = &ctx.state;

    if state.config.metrics.enabled {
        let metrics_state = state.clone();
        let shutdown_rx = state.shutdown_tx.subscribe();
        ctx.background_tasks.spawn(async move {
            metrics_server::run_metrics_server(metrics_state, shutdown_rx).await;
            Ok(())
        });
    } else {
        info!("Prometheus metrics server is disabled in the configuration.");
    }

    info!("All background tasks have been spawned.");
    Ok(())
}
