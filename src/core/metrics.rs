// src/core/metrics.rs

//! Defines and registers Prometheus metrics for broker monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, Histogram, TextEncoder, register_counter, register_gauge, register_histogram,
};

lazy_static! {
    // --- Gauges ---
    /// 1 while the upstream device connection is open, 0 otherwise.
    pub static ref UPSTREAM_CONNECTED: Gauge =
        register_gauge!("linebroker_upstream_connected", "Upstream device connection state (1 for connected, 0 for disconnected).").unwrap();
    /// The number of client sessions currently open.
    pub static ref ACTIVE_CLIENTS: Gauge =
        register_gauge!("linebroker_active_clients", "Number of currently connected clients.").unwrap();
    /// Commands admitted to the queue that are still waiting for the command lock.
    pub static ref PENDING_COMMANDS: Gauge =
        register_gauge!("linebroker_pending_commands", "Number of commands waiting for the command lock.").unwrap();

    // --- Counters ---
    pub static ref CONNECTION_ATTEMPTS_TOTAL: Counter =
        register_counter!("linebroker_connection_attempts_total", "Total number of upstream connection attempts.").unwrap();
    pub static ref SUCCESSFUL_CONNECTIONS_TOTAL: Counter =
        register_counter!("linebroker_successful_connections_total", "Total number of successful upstream connections.").unwrap();
    pub static ref COMMANDS_PROCESSED_TOTAL: Counter =
        register_counter!("linebroker_commands_processed_total", "Total number of device commands completed.").unwrap();
    pub static ref COMMANDS_FAILED_TOTAL: Counter =
        register_counter!("linebroker_commands_failed_total", "Total number of device commands that failed.").unwrap();
    pub static ref CLIENTS_ACCEPTED_TOTAL: Counter =
        register_counter!("linebroker_clients_accepted_total", "Total number of client connections accepted.").unwrap();

    // --- Histograms ---
    /// Time spent holding the command lock, from drain to reply.
    pub static ref COMMAND_LATENCY_SECONDS: Histogram =
        register_histogram!("linebroker_command_latency_seconds", "Latency of device command exchanges in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_else(|e| format!("# failed to encode metrics: {e}\n"))
}
