// src/core/mod.rs

//! The central module containing the broker's core logic and data structures.

pub mod errors;
pub mod metrics;
pub mod protocol;
pub mod serializer;
pub mod state;
pub mod upstream;

pub use errors::BrokerError;
pub use serializer::CommandSerializer;
pub use state::{BrokerState, BrokerStats, StatsRegistry};
pub use upstream::UpstreamLink;
