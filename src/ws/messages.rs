//! WebSocket frame payloads: greeting, client requests, query replies.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::command::command_name;
use crate::domain::{RangeQuery, Sample};
use crate::error::ParseError;

/// Text frame sent once on every successful open handshake.
pub const GREETING: &str = "Hello, connection to websocket established. To start a measurement \
send the wished UUID, optional send a sampling rate between 10 and 100000";

/// Wire name of the downsampled range query.
pub const GET_DOWNSAMPLED_IN_RANGE: &str = "get_downsampled_in_range";

/// A validated request received from a websocket client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientRequest {
    /// Reduce the samples in `[tmin, tmax]` to a bounded count.
    GetDownsampledInRange(RangeQuery),
}

impl ClientRequest {
    /// Parses a text or binary frame payload.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] for malformed JSON, a missing or unknown
    /// `command`, or a missing/mistyped query field.
    pub fn parse(raw: &[u8]) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_slice(raw)?;
        let Value::Object(fields) = value else {
            return Err(ParseError::Malformed("expected a JSON object".to_string()));
        };

        match command_name(&fields)? {
            GET_DOWNSAMPLED_IN_RANGE => {
                let tmin = integer_field(&fields, "tmin")?;
                let tmax = integer_field(&fields, "tmax")?;
                let desired = fields
                    .get("desired_number_of_samples")
                    .and_then(Value::as_u64)
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or(ParseError::InvalidField {
                        field: "desired_number_of_samples",
                        reason: "expected a non-negative integer",
                    })?;
                let query = RangeQuery::new(tmin, tmax, desired).ok_or(
                    ParseError::InvalidField {
                        field: "desired_number_of_samples",
                        reason: "empty range or zero samples requested",
                    },
                )?;
                Ok(Self::GetDownsampledInRange(query))
            }
            other => Err(ParseError::UnknownCommand(other.to_string())),
        }
    }
}

fn integer_field(fields: &Map<String, Value>, field: &'static str) -> Result<i64, ParseError> {
    fields
        .get(field)
        .and_then(Value::as_i64)
        .ok_or(ParseError::InvalidField {
            field,
            reason: "expected an integer timestamp",
        })
}

/// Reply frame for a served range query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse<'a> {
    /// Always [`GET_DOWNSAMPLED_IN_RANGE`].
    pub command: &'static str,
    /// Echoed lower bound.
    pub tmin: i64,
    /// Echoed upper bound.
    pub tmax: i64,
    /// Reduced series, ordered by timestamp.
    pub samples: &'a [Sample],
}

impl<'a> QueryResponse<'a> {
    /// Builds the reply for `query`.
    #[must_use]
    pub const fn new(query: &RangeQuery, samples: &'a [Sample]) -> Self {
        Self {
            command: GET_DOWNSAMPLED_IN_RANGE,
            tmin: query.tmin(),
            tmax: query.tmax(),
            samples,
        }
    }
}
