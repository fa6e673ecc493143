// src/core/serializer.rs

//! Serializes device commands so exactly one request/response pair is in
//! flight on the upstream connection at any instant.

use crate::config::Config;
use crate::core::BrokerError;
use crate::core::metrics;
use crate::core::state::StatsRegistry;
use crate::core::upstream::UpstreamLink;
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

/// Turns the result of a reply read into the text returned to the caller.
///
/// No-reply policy: many device commands legitimately produce no output, so a
/// read that times out is a successful exchange with an empty body, never an
/// error. Callers rely on this.
///
/// Clients get exactly one line per request, so output spanning several
/// device lines is joined with single spaces.
pub fn reply_text(reply: Option<Bytes>) -> String {
    let Some(bytes) = reply else {
        return String::new();
    };
    String::from_utf8_lossy(&bytes)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keeps the gauge of queued commands accurate across every exit path.
struct PendingGuard;

impl PendingGuard {
    fn new() -> Self {
        metrics::PENDING_COMMANDS.inc();
        Self
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        metrics::PENDING_COMMANDS.dec();
    }
}

/// Funnels commands from every client through one lock onto the upstream link.
#[derive(Debug)]
pub struct CommandSerializer {
    link: Arc<UpstreamLink>,
    stats: Arc<StatsRegistry>,
    /// The command lock. Fair, so commands are serviced in arrival order.
    command_lock: Mutex<()>,
    /// Bounds how many commands may hold or wait for the command lock.
    admission: Semaphore,
    queue_wait_timeout: Duration,
    drain_timeout: Duration,
    settle_delay: Duration,
    command_timeout: Duration,
    line_terminator: String,
}

impl CommandSerializer {
    pub fn new(config: &Config, link: Arc<UpstreamLink>, stats: Arc<StatsRegistry>) -> Self {
        Self {
            link,
            stats,
            command_lock: Mutex::new(()),
            admission: Semaphore::new(config.queue.max_pending),
            queue_wait_timeout: config.queue.wait_timeout,
            drain_timeout: config.upstream.drain_timeout,
            settle_delay: config.upstream.settle_delay,
            command_timeout: config.upstream.command_timeout,
            line_terminator: config.upstream.line_terminator.clone(),
        }
    }

    /// The reply timeout used when a caller has no opinion.
    pub fn default_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Sends one command to the device and returns its reply.
    ///
    /// An empty `Ok` body means the device stayed silent for `timeout`. On a
    /// link failure the error is returned right away and a background
    /// reconnect is scheduled.
    pub async fn send(&self, command: &str, timeout: Duration) -> Result<String, BrokerError> {
        let command = command.trim_end_matches(['\r', '\n']);
        if command.trim().is_empty() {
            return Err(BrokerError::EmptyCommand);
        }

        let Ok(_permit) = self.admission.try_acquire() else {
            return Err(self.fail(BrokerError::QueueFull));
        };
        let pending = PendingGuard::new();

        let Ok(_turn) = tokio::time::timeout(self.queue_wait_timeout, self.command_lock.lock()).await
        else {
            return Err(self.fail(BrokerError::QueueTimeout));
        };
        drop(pending);

        let started = Instant::now();
        let result = self.exchange(command, timeout).await;
        metrics::COMMAND_LATENCY_SECONDS.observe(started.elapsed().as_secs_f64());

        match result {
            Ok(reply) => {
                debug!("Command {:?} -> {:?}", command, reply);
                self.stats.record_command_success();
                Ok(reply)
            }
            Err(e) => {
                warn!("Command {:?} failed: {}", command, e);
                if e.is_link_failure() {
                    self.link.schedule_reconnect();
                }
                Err(self.fail(e))
            }
        }
    }

    /// One drain, write, settle, read cycle. Runs with the command lock held.
    async fn exchange(&self, command: &str, timeout: Duration) -> Result<String, BrokerError> {
        if !self.link.is_connected() && !self.link.connect().await {
            return Err(BrokerError::NotConnected);
        }

        let mut session = self.link.session().await?;
        let stale = session.drain_pending(self.drain_timeout).await?;
        if stale > 0 {
            debug!("Discarded {} byte(s) of unsolicited device output.", stale);
        }

        session.write_line(self.frame(command).as_bytes()).await?;
        tokio::time::sleep(self.settle_delay).await;
        let reply = session.read_reply(timeout).await?;
        Ok(reply_text(reply))
    }

    /// Appends the device line terminator unless the command already carries it.
    pub fn frame(&self, command: &str) -> String {
        if command.ends_with(&self.line_terminator) {
            command.to_string()
        } else {
            format!("{command}{}", self.line_terminator)
        }
    }

    fn fail(&self, error: BrokerError) -> BrokerError {
        self.stats.record_command_failure(error.to_string());
        error
    }
}
