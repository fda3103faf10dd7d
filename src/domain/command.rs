//! Management commands arriving on the host's management channel.
//!
//! [`Command::parse`] validates a raw payload into a tagged variant.
//! Unknown fields are ignored; a malformed optional field falls back to
//! its default instead of rejecting the whole command.

use serde_json::{Map, Value};

use crate::error::ParseError;

/// A validated management command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start the websocket server.
    OpenWebsocket {
        /// Requested port, `None` when absent or unusable.
        port: Option<u16>,
    },
    /// Stop the websocket server and close every connection.
    CloseWebsocket,
    /// Send a text frame to every open connection.
    Broadcast {
        /// Frame payload.
        message: String,
    },
}

impl Command {
    /// Parses a management payload.
    ///
    /// # Errors
    ///
    /// - [`ParseError::Malformed`] if `raw` is not a JSON object.
    /// - [`ParseError::MissingCommand`] if there is no string `command`.
    /// - [`ParseError::UnknownCommand`] for unrecognized command names.
    /// - [`ParseError::InvalidField`] if `broadcast` lacks a string `message`.
    pub fn parse(raw: &[u8]) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_slice(raw)?;
        let Value::Object(fields) = value else {
            return Err(ParseError::Malformed("expected a JSON object".to_string()));
        };
        let name = command_name(&fields)?;

        match name {
            "open_websocket" => Ok(Self::OpenWebsocket {
                port: fields.get("port").and_then(parse_port),
            }),
            "close_websocket" => Ok(Self::CloseWebsocket),
            "broadcast" => {
                let message = fields
                    .get("message")
                    .and_then(Value::as_str)
                    .ok_or(ParseError::InvalidField {
                        field: "message",
                        reason: "expected a string",
                    })?;
                Ok(Self::Broadcast {
                    message: message.to_string(),
                })
            }
            other => Err(ParseError::UnknownCommand(other.to_string())),
        }
    }

    /// Wire name of the command.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OpenWebsocket { .. } => "open_websocket",
            Self::CloseWebsocket => "close_websocket",
            Self::Broadcast { .. } => "broadcast",
        }
    }
}

/// Extracts the mandatory string `command` field.
pub(crate) fn command_name(fields: &Map<String, Value>) -> Result<&str, ParseError> {
    fields
        .get("command")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingCommand)
}

/// Reads a port from a JSON integer or a string holding a decimal integer.
///
/// Anything else, including values outside `0..=65535`, yields `None`.
fn parse_port(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
