//! Handle to one live websocket client.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::ConnectionId;

/// Frames queued for a connection's writer. The socket itself is owned
/// by the connection task; everything else talks to it through this.
pub type OutboundSender = mpsc::Sender<Arc<String>>;

/// Receiving half of [`OutboundSender`], drained by the connection task.
pub type OutboundReceiver = mpsc::Receiver<Arc<String>>;

/// A registered websocket client.
///
/// Holds no reference to the socket. Sending only enqueues a frame, so
/// callers never block on the network while holding the registry lock.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    remote_addr: String,
    tx: OutboundSender,
    cancel: CancellationToken,
    connected_at: DateTime<Utc>,
    dropped_frames: AtomicU64,
}

impl Connection {
    /// Creates a connection handle together with the receiver its task
    /// drains. `cancel` is the connection's cancellation flag.
    #[must_use]
    pub fn new(
        remote_addr: impl Into<String>,
        cancel: CancellationToken,
        buffer: usize,
    ) -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let conn = Self {
            id: ConnectionId::new(),
            remote_addr: remote_addr.into(),
            tx,
            cancel,
            connected_at: Utc::now(),
            dropped_frames: AtomicU64::new(0),
        };
        (conn, rx)
    }

    /// Registry key.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Peer address, informational only.
    #[must_use]
    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// When the open handshake completed.
    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// The token long-running per-connection tasks close over.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Raises the cancellation flag.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the cancellation flag is raised.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Queues a text frame without waiting.
    ///
    /// Returns `false` if the queue is full or the connection task is gone.
    pub fn try_send(&self, frame: Arc<String>) -> bool {
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Queues a text frame, waiting for room in the queue.
    ///
    /// Returns `false` if the connection task is gone.
    pub async fn send(&self, frame: String) -> bool {
        self.tx.send(Arc::new(frame)).await.is_ok()
    }

    /// Frames dropped because the queue was full or closed.
    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }
}
