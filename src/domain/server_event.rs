//! Lifecycle events of a supervised websocket server.
//!
//! Emitted on the server's own thread and forwarded to the host as
//! management-channel messages.

use serde::Serialize;

/// Server lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// The listener is bound and accepting connections.
    Listening {
        /// Port named in the start request (`0` for ephemeral).
        requested_port: u16,
        /// Port actually bound.
        port: u16,
    },

    /// The server could not start or died unexpectedly.
    Failed {
        /// Port named in the start request.
        port: u16,
        /// Human-readable cause.
        reason: String,
    },

    /// The server shut down after a stop request.
    Stopped {
        /// Port named in the start request.
        port: u16,
    },
}

impl ServerEvent {
    /// Serializes the event as the JSON body of a host message.
    #[must_use]
    pub fn to_json_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}
