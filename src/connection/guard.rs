// src/connection/guard.rs

//! Defines `ClientGuard`, an RAII guard that keeps the active-client count exact.

use crate::core::state::StatsRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// Unregisters a client session from the active set when its handler exits,
/// whichever way it exits (normal close, error, panic unwinding, or abort).
pub struct ClientGuard {
    stats: Arc<StatsRegistry>,
    session_id: u64,
    addr: SocketAddr,
}

impl ClientGuard {
    /// Registers the session and returns the guard that will remove it.
    pub fn register(stats: Arc<StatsRegistry>, session_id: u64, addr: SocketAddr) -> Self {
        stats.register_client(session_id, addr);
        info!(
            "Client connected: {} ({} active)",
            addr,
            stats.active_clients()
        );
        Self {
            stats,
            session_id,
            addr,
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        if !self.stats.unregister_client(self.session_id) {
            debug!(
                "Client {} (session {}) was already unregistered.",
                self.addr, self.session_id
            );
            return;
        }
        info!(
            "Client disconnected: {} ({} active)",
            self.addr,
            self.stats.active_clients()
        );
    }
}
