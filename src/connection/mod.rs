// src/connection/mod.rs

//! Manages the lifecycle of a single client TCP connection: line framing,
//! meta-command handling, and forwarding to the device.

mod guard;
mod handler;

pub use guard::ClientGuard;
pub use handler::ConnectionHandler;
