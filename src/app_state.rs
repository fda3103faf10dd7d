//! Shared state injected into the websocket server's handlers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::NodeConfig;
use crate::domain::ConnectionRegistry;
use crate::service::Downsampler;

/// State available to all handlers of one running server via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Open connections of this server.
    pub registry: Arc<ConnectionRegistry>,
    /// Engine answering range queries.
    pub downsampler: Arc<dyn Downsampler>,
    /// Node settings (outbound buffer, CORS cache age).
    pub config: NodeConfig,
    /// Fires when the server is asked to stop; connection tokens are its
    /// children.
    pub shutdown: CancellationToken,
    /// Live connection tasks, drained before the server's runtime is
    /// dropped.
    pub tasks: TaskTracker,
}
