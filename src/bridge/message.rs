//! Messages crossing the host boundary.

use super::InstanceHandle;

/// Channel reserved for management commands and lifecycle events.
pub const MANAGEMENT_CHANNEL: u32 = 0x8000;

/// One host message: a channel id plus opaque data and metadata buffers.
///
/// Deliberately not `Clone`: a message produced by an instance is
/// released by moving it into [`super::HostBridge::free`], so it can be
/// freed at most once.
#[derive(Debug, PartialEq, Eq)]
pub struct Message {
    /// Routing channel; see [`MANAGEMENT_CHANNEL`].
    pub channel: u32,
    /// Payload bytes.
    pub data: Vec<u8>,
    /// Metadata bytes.
    pub meta: Vec<u8>,
    origin: Option<InstanceHandle>,
}

impl Message {
    /// Creates a host-owned message.
    #[must_use]
    pub fn new(channel: u32, data: impl Into<Vec<u8>>, meta: impl Into<Vec<u8>>) -> Self {
        Self {
            channel,
            data: data.into(),
            meta: meta.into(),
            origin: None,
        }
    }

    /// Creates a host-owned management message with empty metadata.
    #[must_use]
    pub fn management(data: impl Into<Vec<u8>>) -> Self {
        Self::new(MANAGEMENT_CHANNEL, data, Vec::new())
    }

    /// Creates a message produced by `instance`.
    pub(crate) fn from_instance(instance: InstanceHandle, channel: u32, data: Vec<u8>) -> Self {
        Self {
            channel,
            data,
            meta: Vec::new(),
            origin: Some(instance),
        }
    }

    /// Instance that produced this message, `None` for host-owned ones.
    #[must_use]
    pub const fn origin(&self) -> Option<InstanceHandle> {
        self.origin
    }

    /// Whether this travels on the management channel.
    #[must_use]
    pub const fn is_management(&self) -> bool {
        self.channel == MANAGEMENT_CHANNEL
    }
}
