// src/core/errors.rs

//! Defines the primary error type for the broker.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Every failure a broker component can report.
///
/// The `Display` text is exactly what a client sees after the `ERROR: ` prefix,
/// so messages are kept short and free of internal detail.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("{0}")]
    Io(Arc<std::io::Error>),

    #[error("Connection timeout after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Not connected to upstream device")]
    NotConnected,

    #[error("Upstream device closed the connection")]
    UpstreamClosed,

    #[error("Command queue is full")]
    QueueFull,

    #[error("Timed out waiting for the command lock")]
    QueueTimeout,

    #[error("Empty command")]
    EmptyCommand,

    #[error("Line too long")]
    LineTooLong,

    #[error("Unknown broker command '{0}'")]
    UnknownMetaCommand(String),

    #[error("Broker is shutting down")]
    ShuttingDown,

    /// An `ERROR:` reply received by `BrokerClient`.
    #[error("{0}")]
    Remote(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// `std::io::Error` is not cloneable, so it lives behind an `Arc`.
impl Clone for BrokerError {
    fn clone(&self) -> Self {
        match self {
            BrokerError::Io(e) => BrokerError::Io(Arc::clone(e)),
            BrokerError::ConnectTimeout(d) => BrokerError::ConnectTimeout(*d),
            BrokerError::NotConnected => BrokerError::NotConnected,
            BrokerError::UpstreamClosed => BrokerError::UpstreamClosed,
            BrokerError::QueueFull => BrokerError::QueueFull,
            BrokerError::QueueTimeout => BrokerError::QueueTimeout,
            BrokerError::EmptyCommand => BrokerError::EmptyCommand,
            BrokerError::LineTooLong => BrokerError::LineTooLong,
            BrokerError::UnknownMetaCommand(s) => BrokerError::UnknownMetaCommand(s.clone()),
            BrokerError::ShuttingDown => BrokerError::ShuttingDown,
            BrokerError::Remote(s) => BrokerError::Remote(s.clone()),
            BrokerError::Protocol(s) => BrokerError::Protocol(s.clone()),
            BrokerError::Internal(s) => BrokerError::Internal(s.clone()),
        }
    }
}

impl PartialEq for BrokerError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (BrokerError::Io(e1), BrokerError::Io(e2)) => e1.kind() == e2.kind(),
            (BrokerError::ConnectTimeout(d1), BrokerError::ConnectTimeout(d2)) => d1 == d2,
            (BrokerError::UnknownMetaCommand(s1), BrokerError::UnknownMetaCommand(s2)) => s1 == s2,
            (BrokerError::Remote(s1), BrokerError::Remote(s2)) => s1 == s2,
            (BrokerError::Protocol(s1), BrokerError::Protocol(s2)) => s1 == s2,
            (BrokerError::Internal(s1), BrokerError::Internal(s2)) => s1 == s2,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl BrokerError {
    /// Returns true if this failure means the upstream session is no longer usable
    /// and a background reconnect should be scheduled.
    pub fn is_link_failure(&self) -> bool {
        matches!(self, BrokerError::Io(_) | BrokerError::UpstreamClosed)
    }

    /// Returns true for socket errors that just mean the peer went away.
    pub fn is_normal_disconnect(&self) -> bool {
        matches!(self, BrokerError::Io(e) if matches!(
            e.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionAborted
        ))
    }
}

impl From<std::io::Error> for BrokerError {
    fn from(e: std::io::Error) -> Self {
        BrokerError::Io(Arc::new(e))
    }
}

impl From<LinesCodecError> for BrokerError {
    fn from(e: LinesCodecError) -> Self {
        match e {
            LinesCodecError::Io(io) => io.into(),
            LinesCodecError::MaxLineLengthExceeded => BrokerError::LineTooLong,
        }
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(e: serde_json::Error) -> Self {
        BrokerError::Protocol(format!("invalid status payload: {e}"))
    }
}
