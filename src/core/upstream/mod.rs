// src/core/upstream/mod.rs

//! The connection to the controlled device and its reconnect policy.

mod backoff;
mod link;

pub use backoff::Backoff;
pub use link::{UpstreamLink, UpstreamSession};
