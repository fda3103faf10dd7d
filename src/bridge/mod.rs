//! Host boundary: the embedding process talks to the node only through
//! [`HostBridge`] and [`Message`].

pub mod host;
pub mod message;

pub use host::{DESCRIPTOR, HostBridge, InstanceHandle, ReceiveCallback};
pub use message::{MANAGEMENT_CHANNEL, Message};
