// src/core/state/stats.rs

//! Contains the broker's health counters and the snapshot served by `BROKER:STATUS`.

use crate::core::metrics;
use chrono::{DateTime, Local};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A point-in-time copy of every broker statistic.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BrokerStats {
    pub started_at: DateTime<Local>,
    pub upstream_host: String,
    pub upstream_port: u16,
    pub connected: bool,
    pub reconnecting: bool,
    pub connection_attempts: u64,
    pub successful_connections: u64,
    pub commands_processed: u64,
    pub commands_failed: u64,
    pub active_clients: usize,
    pub last_command_at: Option<DateTime<Local>>,
    pub last_error: Option<String>,
}

/// Holds all mutable statistics describing broker health.
///
/// Counters only ever grow. The active-client set tracks current sessions
/// exactly: each session is registered once on accept and removed once on close.
#[derive(Debug)]
pub struct StatsRegistry {
    started_at: DateTime<Local>,
    upstream_host: String,
    upstream_port: u16,
    connected: AtomicBool,
    reconnecting: AtomicBool,
    connection_attempts: AtomicU64,
    successful_connections: AtomicU64,
    commands_processed: AtomicU64,
    commands_failed: AtomicU64,
    clients: DashMap<u64, SocketAddr>,
    last_command_at: Mutex<Option<DateTime<Local>>>,
    last_error: Mutex<Option<String>>,
}

impl StatsRegistry {
    pub fn new(upstream_host: impl Into<String>, upstream_port: u16) -> Self {
        Self {
            started_at: Local::now(),
            upstream_host: upstream_host.into(),
            upstream_port,
            connected: AtomicBool::new(false),
            reconnecting: AtomicBool::new(false),
            connection_attempts: AtomicU64::new(0),
            successful_connections: AtomicU64::new(0),
            commands_processed: AtomicU64::new(0),
            commands_failed: AtomicU64::new(0),
            clients: DashMap::new(),
            last_command_at: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub fn set_reconnecting(&self, reconnecting: bool) {
        self.reconnecting.store(reconnecting, Ordering::Relaxed);
    }

    pub fn record_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_successful_connection(&self) {
        self.successful_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a command that completed, with or without a reply.
    pub fn record_command_success(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
        *self.last_command_at.lock() = Some(Local::now());
        metrics::COMMANDS_PROCESSED_TOTAL.inc();
    }

    /// Counts a failed command and remembers why it failed.
    pub fn record_command_failure(&self, error: impl Into<String>) {
        self.commands_failed.fetch_add(1, Ordering::Relaxed);
        self.record_error(error);
        metrics::COMMANDS_FAILED_TOTAL.inc();
    }

    pub fn record_error(&self, error: impl Into<String>) {
        *self.last_error.lock() = Some(error.into());
    }

    /// Adds a session to the active set.
    pub fn register_client(&self, session_id: u64, addr: SocketAddr) {
        if self.clients.insert(session_id, addr).is_none() {
            metrics::ACTIVE_CLIENTS.inc();
        }
    }

    /// Removes a session from the active set. Returns false if it was not registered.
    pub fn unregister_client(&self, session_id: u64) -> bool {
        let removed = self.clients.remove(&session_id).is_some();
        if removed {
            metrics::ACTIVE_CLIENTS.dec();
        }
        removed
    }

    pub fn active_clients(&self) -> usize {
        self.clients.len()
    }

    pub fn commands_processed(&self) -> u64 {
        self.commands_processed.load(Ordering::Relaxed)
    }

    pub fn commands_failed(&self) -> u64 {
        self.commands_failed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> BrokerStats {
        BrokerStats {
            started_at: self.started_at,
            upstream_host: self.upstream_host.clone(),
            upstream_port: self.upstream_port,
            connected: self.connected.load(Ordering::Relaxed),
            reconnecting: self.reconnecting.load(Ordering::Relaxed),
            connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
            successful_connections: self.successful_connections.load(Ordering::Relaxed),
            commands_processed: self.commands_processed(),
            commands_failed: self.commands_failed(),
            active_clients: self.active_clients(),
            last_command_at: *self.last_command_at.lock(),
            last_error: self.last_error.lock().clone(),
        }
    }
}
