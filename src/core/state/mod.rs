// src/core/state/mod.rs

//! Defines the central `BrokerState` struct and its statistics registry.

mod core;
mod stats;

pub use self::core::BrokerState;
pub use stats::{BrokerStats, StatsRegistry};
