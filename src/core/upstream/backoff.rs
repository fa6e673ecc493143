// src/core/upstream/backoff.rs

//! Exponential reconnect delay with a floor and a cap.

use std::time::Duration;

/// Tracks the delay to wait before the next reconnect attempt.
///
/// The delay starts at `min`, doubles after each failed attempt, and never
/// exceeds `max`. A successful connect resets it to `min`.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Creates a new `Backoff`. A `max` below `min` is raised to `min`.
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self {
            min,
            max,
            current: min,
        }
    }

    /// The delay to wait before the next attempt.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Records a failed attempt, doubling the delay up to the cap.
    pub fn advance(&mut self) {
        self.current = self.current.saturating_mul(2).min(self.max);
    }

    /// Records a successful attempt.
    pub fn reset(&mut self) {
        self.current = self.min;
    }
}
