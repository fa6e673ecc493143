// src/lib.rs

pub mod cli;
pub mod client;
pub mod config;
pub mod connection;
pub mod core;
pub mod server;

// Re-export
pub use crate::client::BrokerClient;
pub use crate::server::BrokerServer;
