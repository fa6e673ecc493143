// src/core/protocol/command.rs

//! Classifies client lines and defines the replies the broker writes back.

use crate::core::BrokerError;
use std::fmt;
use std::str::FromStr;
use strum_macros::{AsRefStr, Display, EnumString};

/// Lines starting with this prefix (any case) are handled by the broker itself
/// and are never forwarded to the device.
pub const META_PREFIX: &str = "BROKER:";

/// Commands the broker answers locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum MetaCommand {
    /// Reply with a JSON snapshot of broker statistics.
    Status,
    /// Start a background reconnect and acknowledge immediately.
    Reconnect,
    /// Block this session until the device is connected or the wait bound passes.
    Wait,
}

/// What a single client line asks the broker to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound<'a> {
    /// Blank line. Ignored without a reply.
    Empty,
    Meta(MetaCommand),
    /// A `BROKER:` line naming no known meta-command.
    UnknownMeta(&'a str),
    /// Anything else goes to the device verbatim.
    Forward(&'a str),
}

impl<'a> Inbound<'a> {
    pub fn parse(line: &'a str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Inbound::Empty;
        }

        let Some(rest) = strip_meta_prefix(trimmed) else {
            return Inbound::Forward(trimmed);
        };
        match MetaCommand::from_str(rest) {
            Ok(meta) => Inbound::Meta(meta),
            Err(_) => Inbound::UnknownMeta(rest),
        }
    }
}

fn strip_meta_prefix(line: &str) -> Option<&str> {
    let head = line.get(..META_PREFIX.len())?;
    head.eq_ignore_ascii_case(META_PREFIX)
        .then(|| &line[META_PREFIX.len()..])
}

/// A single line written back to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Raw device output, possibly empty.
    Device(String),
    /// `OK`, or `OK: <detail>` when the detail is non-empty.
    Ok(String),
    /// `ERROR: <message>`.
    Error(String),
    /// The JSON status document.
    Status(String),
}

impl Reply {
    pub fn ok(detail: impl Into<String>) -> Self {
        Reply::Ok(detail.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

impl From<BrokerError> for Reply {
    fn from(e: BrokerError) -> Self {
        Reply::Error(e.to_string())
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Device(text) | Reply::Status(text) => f.write_str(text),
            Reply::Ok(detail) if detail.is_empty() => f.write_str("OK"),
            Reply::Ok(detail) => write!(f, "OK: {detail}"),
            Reply::Error(message) => write!(f, "ERROR: {message}"),
        }
    }
}
