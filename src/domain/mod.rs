//! Domain layer: connection identity, the connection registry, and the
//! command, query and lifecycle-event types that drive the node.
//!
//! Nothing here touches the network. The registry only queues frames;
//! connection tasks in [`crate::ws`] own the sockets.

pub mod command;
pub mod connection;
pub mod connection_id;
pub mod connection_registry;
pub mod sample;
pub mod server_event;

pub use command::Command;
pub use connection::{Connection, OutboundReceiver, OutboundSender};
pub use connection_id::ConnectionId;
pub use connection_registry::ConnectionRegistry;
pub use sample::{RangeQuery, Sample};
pub use server_event::ServerEvent;
