//! Node error types with host status mapping.
//!
//! [`ParseError`] covers malformed inbound payloads on either surface
//! (management channel or websocket frames). [`NodeError`] covers
//! supervisor and host-bridge faults; each variant maps to a [`Status`]
//! returned to the host.

use std::io;

/// Status code handed back to the host for every `send`/`deinit` call.
///
/// `0` means the message was accepted or deliberately ignored. Non-zero
/// codes signal host contract violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Accepted, or ignored as a no-op.
    Ok,
    /// The instance handle does not (or no longer) refer to a live instance.
    InvalidInstance,
}

impl Status {
    /// Returns the numeric code seen by the host.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::InvalidInstance => 1,
        }
    }

    /// Returns `true` for [`Status::Ok`].
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Rejection of an inbound structured payload.
///
/// Always non-fatal: the offending message is ignored.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The payload is not valid JSON (or not a JSON object).
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The payload has no string `command` field.
    #[error("missing command field")]
    MissingCommand,

    /// The `command` field names nothing this node understands.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A required field is absent or has the wrong type or value.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// Field name as it appears on the wire.
        field: &'static str,
        /// What was wrong with it.
        reason: &'static str,
    },
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Supervisor and host-bridge failures.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// The listening socket could not be bound.
    #[error("failed to bind port {port}: {source}")]
    Bind {
        /// Requested port.
        port: u16,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },

    /// The server runtime could not be created.
    #[error("failed to build server runtime: {0}")]
    Runtime(#[source] io::Error),

    /// A server is already running for this instance.
    #[error("websocket server already running on port {0}")]
    AlreadyRunning(u16),

    /// The instance handle is unknown or was deinitialized.
    #[error("unknown instance handle {0}")]
    UnknownInstance(u64),

    /// Internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl NodeError {
    /// Returns the host status for this variant.
    ///
    /// Only host contract violations surface as non-zero codes; every other
    /// fault is logged and reported as a no-op.
    #[must_use]
    pub const fn status(&self) -> Status {
        match self {
            Self::UnknownInstance(_) => Status::InvalidInstance,
            Self::Bind { .. } | Self::Runtime(_) | Self::AlreadyRunning(_) | Self::Internal(_) => {
                Status::Ok
            }
        }
    }
}
