//! WebSocket layer: upgrade handler, per-connection protocol, frame
//! payloads.
//!
//! The endpoint at `/ws` greets every client once, accepts text and
//! binary frames, and answers `get_downsampled_in_range` queries on the
//! same connection.

pub mod connection;
pub mod handler;
pub mod messages;
