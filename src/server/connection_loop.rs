// src/server/connection_loop.rs

//! Contains the main loop for accepting client connections and handling graceful shutdown.

use super::context::ServerContext;
use crate::connection::ConnectionHandler;
use crate::core::metrics;
use crate::core::protocol::Reply;
use std::future::Future;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

// How long open sessions get to finish their current reply after shutdown.
const CLIENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
const BACKGROUND_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to register SIGTERM handler: {}. Only Ctrl-C will stop the broker.", e);
            let _ = tokio::signal::ctrl_c().await;
            info!("SIGINT received, initiating graceful shutdown.");
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("SIGINT received, initiating graceful shutdown."),
        _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown."),
    }
}

/// The main loop: accepts clients until `shutdown` resolves, then tears down in order.
pub async fn run<F>(ctx: ServerContext, shutdown: F)
where
    F: Future<Output = ()>,
{
    let ServerContext {
        state,
        listener,
        mut background_tasks,
        connection_permits,
    } = ctx;
    let mut session_id_counter: u64 = 0;
    let mut client_tasks = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                break;
            }

            Some(res) = background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            },

            res = listener.accept() => {
                let (mut socket, addr) = match res {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                };
                metrics::CLIENTS_ACCEPTED_TOTAL.inc();

                let Ok(permit) = connection_permits.clone().try_acquire_owned() else {
                    warn!("Rejecting {}: client limit of {} reached.", addr, state.config.max_clients);
                    client_tasks.spawn(async move {
                        let reply = format!("{}\n", Reply::Error("Too many clients".to_string()));
                        let _ = socket.write_all(reply.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                    continue;
                };

                session_id_counter = session_id_counter.wrapping_add(1);
                let shutdown_rx = state.shutdown_tx.subscribe();
                let mut handler = ConnectionHandler::new(
                    socket,
                    addr,
                    state.clone(),
                    session_id_counter,
                    shutdown_rx,
                );
                client_tasks.spawn(async move {
                    let _permit = permit;
                    if let Err(e) = handler.run().await {
                        if e.is_normal_disconnect() {
                            debug!("Connection from {} ended: {}", addr, e);
                        } else {
                            warn!("Connection from {} terminated unexpectedly: {}", addr, e);
                        }
                    }
                });
            },

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!("A client handler panicked: {e:?}");
                }
            },
        }
    }

    info!("Shutting down. Closing listener and signalling all sessions.");
    drop(listener);
    if state.shutdown_tx.send(()).is_err() {
        debug!("No subscribers for the shutdown signal.");
    }

    let drained = tokio::time::timeout(CLIENT_DRAIN_TIMEOUT, async {
        while client_tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            "{} client session(s) still busy after {:?}; cancelling them.",
            client_tasks.len(),
            CLIENT_DRAIN_TIMEOUT
        );
        client_tasks.shutdown().await;
    }
    info!("All client connections closed.");

    state.shutdown().await;

    if tokio::time::timeout(BACKGROUND_DRAIN_TIMEOUT, async {
        while background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
        background_tasks.shutdown().await;
    }
    info!("Broker shutdown complete.");
}
