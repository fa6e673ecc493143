// src/config.rs

//! Manages broker configuration: defaults, TOML loading, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::warn;

/// Settings for the single connection to the controlled device.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpstreamConfig {
    /// Host of the device. There is no sensible default, so an empty value fails validation.
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_upstream_port")]
    pub port: u16,
    /// Terminator appended to forwarded commands that do not already end with it.
    #[serde(default = "default_line_terminator")]
    pub line_terminator: String,
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Grace window for discarding the greeting a device prints right after connect.
    #[serde(with = "humantime_serde", default = "default_banner_timeout")]
    pub banner_timeout: Duration,
    /// Bound on the pre-command drain of unsolicited output.
    #[serde(with = "humantime_serde", default = "default_drain_timeout")]
    pub drain_timeout: Duration,
    /// Pause between writing a command and reading its reply.
    #[serde(with = "humantime_serde", default = "default_settle_delay")]
    pub settle_delay: Duration,
    /// How long to wait for a reply. Expiry is not an error.
    #[serde(with = "humantime_serde", default = "default_command_timeout")]
    pub command_timeout: Duration,
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    #[serde(with = "humantime_serde", default = "default_reconnect_min_delay")]
    pub reconnect_min_delay: Duration,
    #[serde(with = "humantime_serde", default = "default_reconnect_max_delay")]
    pub reconnect_max_delay: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_upstream_port(),
            line_terminator: default_line_terminator(),
            connect_timeout: default_connect_timeout(),
            banner_timeout: default_banner_timeout(),
            drain_timeout: default_drain_timeout(),
            settle_delay: default_settle_delay(),
            command_timeout: default_command_timeout(),
            read_buffer_size: default_read_buffer_size(),
            reconnect_min_delay: default_reconnect_min_delay(),
            reconnect_max_delay: default_reconnect_max_delay(),
        }
    }
}

fn default_upstream_port() -> u16 {
    23
}
fn default_line_terminator() -> String {
    "\r\n".to_string()
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_banner_timeout() -> Duration {
    Duration::from_secs(1)
}
fn default_drain_timeout() -> Duration {
    Duration::from_millis(100)
}
fn default_settle_delay() -> Duration {
    Duration::from_millis(300)
}
fn default_command_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_read_buffer_size() -> usize {
    4096
}
fn default_reconnect_min_delay() -> Duration {
    Duration::from_secs(1)
}
fn default_reconnect_max_delay() -> Duration {
    Duration::from_secs(30)
}

/// Settings applied to every client session.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClientConfig {
    #[serde(with = "humantime_serde", default = "default_idle_timeout")]
    pub idle_timeout: Duration,
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
    /// Poll spacing for `BROKER:WAIT`.
    #[serde(with = "humantime_serde", default = "default_wait_interval")]
    pub wait_interval: Duration,
    /// Poll bound for `BROKER:WAIT`.
    #[serde(default = "default_wait_attempts")]
    pub wait_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            idle_timeout: default_idle_timeout(),
            max_line_length: default_max_line_length(),
            wait_interval: default_wait_interval(),
            wait_attempts: default_wait_attempts(),
        }
    }
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(300)
}
fn default_max_line_length() -> usize {
    8192
}
fn default_wait_interval() -> Duration {
    Duration::from_secs(1)
}
fn default_wait_attempts() -> u32 {
    30
}

/// Backpressure on the command lock.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct QueueConfig {
    /// Commands allowed to hold or wait for the command lock at once.
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
    /// Longest a command may wait for the command lock.
    #[serde(with = "humantime_serde", default = "default_queue_wait_timeout")]
    pub wait_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_pending: default_max_pending(),
            wait_timeout: default_queue_wait_timeout(),
        }
    }
}

fn default_max_pending() -> usize {
    64
}
fn default_queue_wait_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_host")]
    pub host: String,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_metrics_host(),
            port: default_metrics_port(),
        }
    }
}

fn default_metrics_host() -> String {
    "0.0.0.0".to_string()
}
fn default_metrics_port() -> u16 {
    9323
}

/// The fully resolved broker configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            max_clients: default_max_clients(),
            upstream: UpstreamConfig::default(),
            client: ClientConfig::default(),
            queue: QueueConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    2323
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_clients() -> usize {
    1024
}

impl Config {
    /// Reads and parses a TOML file. Validation is left to the caller so that
    /// command-line overrides can be applied first.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Failed to parse TOML from '{path}'"))
    }

    /// Parses a configuration from TOML text, filling every missing key with its default.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Validates the resolved configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients cannot be 0"));
        }

        let upstream = &self.upstream;
        if upstream.host.trim().is_empty() {
            return Err(anyhow!(
                "upstream.host is required (set it in the config file or pass --upstream-host)"
            ));
        }
        if upstream.port == 0 {
            return Err(anyhow!("upstream.port cannot be 0"));
        }
        if upstream.line_terminator.is_empty() {
            return Err(anyhow!("upstream.line_terminator cannot be empty"));
        }
        if upstream.read_buffer_size == 0 {
            return Err(anyhow!("upstream.read_buffer_size cannot be 0"));
        }
        if upstream.reconnect_min_delay.is_zero() {
            return Err(anyhow!("upstream.reconnect_min_delay must be greater than 0"));
        }
        if upstream.reconnect_min_delay > upstream.reconnect_max_delay {
            return Err(anyhow!(
                "upstream.reconnect_min_delay cannot exceed upstream.reconnect_max_delay"
            ));
        }
        if upstream.command_timeout.is_zero() {
            warn!("upstream.command_timeout is 0; every reply will be treated as empty.");
        }

        if self.client.max_line_length == 0 {
            return Err(anyhow!("client.max_line_length cannot be 0"));
        }
        if self.client.wait_attempts == 0 {
            return Err(anyhow!("client.wait_attempts cannot be 0"));
        }
        if self.queue.max_pending == 0 {
            return Err(anyhow!("queue.max_pending cannot be 0"));
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.port {
                return Err(anyhow!(
                    "metrics.port cannot be the same as the client listen port"
                ));
            }
        }
        Ok(())
    }
}
