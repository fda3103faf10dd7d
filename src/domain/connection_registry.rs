//! Thread-safe set of open websocket connections.
//!
//! [`ConnectionRegistry`] maps each [`ConnectionId`] to its
//! [`Connection`] handle, which carries the connection's cancellation
//! token. A single [`parking_lot::Mutex`] guards membership; it is held
//! only to mutate the map or copy a snapshot, never across a send.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Connection, ConnectionId};

/// Membership of currently open connections.
///
/// # Invariant
///
/// A connection is present iff its websocket transport is open: the
/// connection task registers after the handshake and unregisters on
/// every exit path.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection. Registering the same id twice keeps one entry.
    pub fn register(&self, conn: Arc<Connection>) {
        let mut map = self.connections.lock();
        map.insert(conn.id(), conn);
    }

    /// Removes a connection and raises its cancellation flag.
    ///
    /// Returns the removed handle, or `None` if it was not registered.
    pub fn unregister(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let removed = self.connections.lock().remove(&id);
        if let Some(conn) = &removed {
            conn.cancel();
        }
        removed
    }

    /// Raises the cancellation flag of a registered connection.
    ///
    /// Returns `false` if no such connection is registered.
    pub fn cancel(&self, id: ConnectionId) -> bool {
        let conn = self.connections.lock().get(&id).map(Arc::clone);
        match conn {
            Some(conn) => {
                conn.cancel();
                true
            }
            None => false,
        }
    }

    /// Sends `text` to every registered connection.
    ///
    /// Members are snapshotted under the lock; frames are queued after it
    /// is released. Returns how many connections accepted the frame.
    ///
    /// A client whose outbound queue is full (or whose task has already
    /// gone) misses this frame rather than stalling the broadcast; each miss
    /// is logged at `warn` and counted in [`Connection::dropped_frames`].
    pub fn broadcast(&self, text: &str) -> usize {
        let frame = Arc::new(text.to_string());
        let recipients = self.snapshot();
        let mut delivered = 0;
        for conn in &recipients {
            if conn.try_send(Arc::clone(&frame)) {
                delivered += 1;
            } else {
                tracing::warn!(
                    conn_id = %conn.id(),
                    dropped = conn.dropped_frames(),
                    "broadcast frame dropped"
                );
            }
        }
        tracing::debug!(
            recipients = recipients.len(),
            delivered,
            "broadcast frame"
        );
        delivered
    }

    /// Copies the current member set.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.lock().values().map(Arc::clone).collect()
    }

    /// Returns `true` if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.lock().contains_key(&id)
    }

    /// Cancels and removes every connection. Used on server shutdown.
    ///
    /// Returns the number of connections that were removed.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Arc<Connection>> = {
            let mut map = self.connections.lock();
            map.drain().map(|(_, conn)| conn).collect()
        };
        for conn in &drained {
            conn.cancel();
        }
        drained.len()
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// Returns `true` if no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }
}
