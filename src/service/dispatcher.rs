//! Management command dispatcher.
//!
//! Turns raw management payloads into supervisor actions. Never fails:
//! anything it cannot act on becomes [`DispatchStatus::NoOp`].

use std::sync::Arc;

use super::ServerSupervisor;
use crate::domain::Command;
use crate::error::NodeError;

/// What a dispatched command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    /// A server was started on `port`.
    Started {
        /// Requested port (after default fallback).
        port: u16,
    },
    /// The running server was stopped.
    Stopped,
    /// A frame was queued for `delivered` connections.
    Broadcast {
        /// Connections that accepted the frame.
        delivered: usize,
    },
    /// Nothing happened: malformed payload, unknown command, or a command
    /// that does not apply in the current state.
    NoOp,
}

/// Maps management commands to [`ServerSupervisor`] calls.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    supervisor: Arc<ServerSupervisor>,
    default_port: u16,
}

impl CommandDispatcher {
    /// Creates a dispatcher. `default_port` is used when `open_websocket`
    /// has no usable `port`.
    #[must_use]
    pub fn new(supervisor: Arc<ServerSupervisor>, default_port: u16) -> Self {
        Self {
            supervisor,
            default_port,
        }
    }

    /// The supervisor this dispatcher drives.
    #[must_use]
    pub fn supervisor(&self) -> &Arc<ServerSupervisor> {
        &self.supervisor
    }

    /// Parses and executes one management payload.
    pub fn dispatch(&self, raw: &[u8]) -> DispatchStatus {
        let command = match Command::parse(raw) {
            Ok(command) => command,
            Err(err) => {
                tracing::debug!(error = %err, "ignoring management message");
                return DispatchStatus::NoOp;
            }
        };
        tracing::debug!(command = command.name(), "dispatching management command");

        match command {
            Command::OpenWebsocket { port } => {
                let port = port.unwrap_or(self.default_port);
                match self.supervisor.start(port) {
                    Ok(()) => DispatchStatus::Started { port },
                    Err(NodeError::AlreadyRunning(running)) => {
                        tracing::info!(
                            requested = port,
                            running,
                            "websocket server already running; ignoring open request"
                        );
                        DispatchStatus::NoOp
                    }
                    Err(err) => {
                        tracing::error!(port, error = %err, "failed to start websocket server");
                        DispatchStatus::NoOp
                    }
                }
            }
            Command::CloseWebsocket => {
                if self.supervisor.stop() {
                    DispatchStatus::Stopped
                } else {
                    DispatchStatus::NoOp
                }
            }
            Command::Broadcast { message } => DispatchStatus::Broadcast {
                delivered: self.supervisor.registry().broadcast(&message),
            },
        }
    }
}
