// src/cli.rs

//! Command-line arguments and how they layer over the configuration file.

use crate::config::Config;
use anyhow::Result;
use clap::Parser;

/// Shares one line-oriented device session between many TCP clients.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file. Flags below override its values.
    #[arg(long)]
    pub config: Option<String>,

    /// Host or IP of the controlled device.
    #[arg(long)]
    pub upstream_host: Option<String>,

    /// Port of the controlled device (default 23).
    #[arg(long)]
    pub upstream_port: Option<u16>,

    /// Address to accept clients on (default 0.0.0.0).
    #[arg(long)]
    pub listen_host: Option<String>,

    /// Port to accept clients on (default 2323).
    #[arg(long)]
    pub listen_port: Option<u16>,

    /// Log filter directive, e.g. `info` or `linebroker=debug`.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Shorthand for `--log-level debug`.
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Loads the config file if one was given, applies flag overrides, and validates.
    pub fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(host) = &self.upstream_host {
            config.upstream.host = host.clone();
        }
        if let Some(port) = self.upstream_port {
            config.upstream.port = port;
        }
        if let Some(host) = &self.listen_host {
            config.host = host.clone();
        }
        if let Some(port) = self.listen_port {
            config.port = port;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if self.debug {
            config.log_level = "debug".to_string();
        }

        config.validate()?;
        Ok(config)
    }
}
