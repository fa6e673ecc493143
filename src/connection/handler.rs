// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a client connection.

use super::guard::ClientGuard;
use crate::core::protocol::{ClientLine, Inbound, LineCodec, MetaCommand, Reply};
use crate::core::{BrokerError, BrokerState};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// Serves one client: reads a line, answers it, repeats.
///
/// The session holds no state between lines. It ends when the client closes
/// the socket, stays silent past the idle timeout, hits a socket error, or the
/// broker shuts down. A line that is being answered is always answered in full
/// before shutdown is observed.
pub struct ConnectionHandler {
    framed: Framed<TcpStream, LineCodec>,
    addr: SocketAddr,
    state: Arc<BrokerState>,
    guard: ClientGuard,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ConnectionHandler {
    /// Creates a handler for an accepted socket and registers it as an active client.
    pub fn new(
        socket: TcpStream,
        addr: SocketAddr,
        state: Arc<BrokerState>,
        session_id: u64,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let codec = LineCodec::new(state.config.client.max_line_length);
        let guard = ClientGuard::register(state.stats.clone(), session_id, addr);
        Self {
            framed: Framed::new(socket, codec),
            addr,
            state,
            guard,
            shutdown_rx,
        }
    }

    /// The main event loop for the connection.
    pub async fn run(&mut self) -> Result<(), BrokerError> {
        let idle_timeout = self.state.config.client.idle_timeout;
        loop {
            tokio::select! {
                // Prioritize shutdown signals over other events.
                biased;
                _ = self.shutdown_rx.recv() => {
                    info!("Connection handler for {} received shutdown signal.", self.addr);
                    let _ = self.framed.send(Reply::from(BrokerError::ShuttingDown)).await;
                    break;
                }
                result = tokio::time::timeout(idle_timeout, self.framed.next()) => {
                    match result {
                        Err(_) => {
                            info!("Client {} idle for {:?}; closing.", self.addr, idle_timeout);
                            break;
                        }
                        Ok(None) => {
                            debug!("Connection from {} closed by peer.", self.addr);
                            break;
                        }
                        Ok(Some(Err(e))) => {
                            if e.is_normal_disconnect() {
                                debug!("Connection from {} closed by peer: {}", self.addr, e);
                            } else {
                                warn!("Connection error for {}: {}", self.addr, e);
                            }
                            break;
                        }
                        Ok(Some(Ok(line))) => {
                            if let Some(reply) = self.dispatch(line).await {
                                self.framed.send(reply).await?;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Answers one line. `None` means the line gets no reply.
    async fn dispatch(&mut self, line: ClientLine) -> Option<Reply> {
        let session_id = self.guard.session_id();
        let text = match line {
            ClientLine::Line(text) => text,
            ClientLine::Overlong => {
                warn!("Session {}: discarded an overlong line.", session_id);
                return Some(BrokerError::LineTooLong.into());
            }
        };

        match Inbound::parse(&text) {
            Inbound::Empty => None,
            Inbound::Meta(meta) => {
                debug!("Session {}: meta command {}", session_id, meta);
                Some(self.handle_meta(meta).await)
            }
            Inbound::UnknownMeta(rest) => {
                Some(BrokerError::UnknownMetaCommand(rest.to_string()).into())
            }
            Inbound::Forward(command) => {
                debug!("Session {}: forwarding {:?}", session_id, command);
                let serializer = &self.state.serializer;
                let reply = match serializer.send(command, serializer.default_timeout()).await {
                    Ok(response) => Reply::Device(response),
                    Err(e) => e.into(),
                };
                Some(reply)
            }
        }
    }

    async fn handle_meta(&mut self, meta: MetaCommand) -> Reply {
        match meta {
            MetaCommand::Status => match self.state.status_json() {
                Ok(json) => Reply::Status(json),
                Err(e) => e.into(),
            },
            MetaCommand::Reconnect => {
                if !self.state.link.schedule_reconnect() {
                    debug!("Reconnect requested by {} while one is already running.", self.addr);
                }
                Reply::ok("Reconnecting")
            }
            MetaCommand::Wait => {
                let state = self.state.clone();
                tokio::select! {
                    connected = state.wait_until_connected() => {
                        if connected {
                            Reply::ok("Connected")
                        } else {
                            Reply::Error("Connection timeout".to_string())
                        }
                    }
                    _ = self.shutdown_rx.recv() => BrokerError::ShuttingDown.into(),
                }
            }
        }
    }
}
