//! Websocket server lifecycle: start on a dedicated thread, stop on demand.
//!
//! [`ServerSupervisor::start`] never blocks on the server. It spawns an OS
//! thread that owns a multi-threaded tokio runtime, the listening socket
//! and the accept loop, and returns right away. At most one server runs
//! per supervisor; the `running` lock serializes concurrent starts.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::Downsampler;
use crate::api;
use crate::app_state::AppState;
use crate::config::{NodeConfig, ServerConfig};
use crate::domain::{ConnectionRegistry, ServerEvent};
use crate::error::NodeError;

/// How long a stopping server waits for its connection tasks to send
/// their close frames.
const CONNECTION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Receives server lifecycle events on the server's thread.
///
/// The sink may stop the supervisor that called it; that stop does not
/// wait for the server thread, which is the caller's own thread.
pub type EventSink = Arc<dyn Fn(ServerEvent) + Send + Sync>;

/// Bookkeeping for the server currently owned by the supervisor.
#[derive(Debug)]
struct RunningServer {
    config: ServerConfig,
    shutdown: CancellationToken,
    local_addr: watch::Receiver<Option<SocketAddr>>,
    thread: JoinHandle<()>,
}

impl RunningServer {
    fn is_alive(&self) -> bool {
        !self.thread.is_finished()
    }
}

/// Owns the lifecycle of the websocket listener.
pub struct ServerSupervisor {
    config: NodeConfig,
    registry: Arc<ConnectionRegistry>,
    downsampler: Arc<dyn Downsampler>,
    events: Option<EventSink>,
    running: Mutex<Option<RunningServer>>,
}

impl std::fmt::Debug for ServerSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSupervisor")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl ServerSupervisor {
    /// Creates a supervisor with no server running.
    #[must_use]
    pub fn new(config: NodeConfig, downsampler: Arc<dyn Downsampler>) -> Self {
        Self {
            config,
            registry: Arc::new(ConnectionRegistry::new()),
            downsampler,
            events: None,
            running: Mutex::new(None),
        }
    }

    /// Routes lifecycle events to `sink`.
    #[must_use]
    pub fn with_events(mut self, sink: EventSink) -> Self {
        self.events = Some(sink);
        self
    }

    /// Starts the server on `port` and returns without waiting for it.
    ///
    /// Bind failures happen on the server thread; they are logged and
    /// reported as [`ServerEvent::Failed`].
    ///
    /// # Errors
    ///
    /// - [`NodeError::AlreadyRunning`] if a server is already running.
    /// - [`NodeError::Runtime`] if the server thread cannot be spawned.
    pub fn start(&self, port: u16) -> Result<(), NodeError> {
        let mut running = self.running.lock();
        if let Some(server) = running.as_ref()
            && server.is_alive()
        {
            return Err(NodeError::AlreadyRunning(server.config.port));
        }
        // A previous server died on its own (e.g. bind failure); reap it.
        if let Some(stale) = running.take()
            && stale.thread.join().is_err()
        {
            tracing::warn!(port = stale.config.port, "previous server thread panicked");
        }

        let server_config = self.config.server_config(port);
        let shutdown = CancellationToken::new();
        let (addr_tx, addr_rx) = watch::channel(None);
        let state = AppState {
            registry: Arc::clone(&self.registry),
            downsampler: Arc::clone(&self.downsampler),
            config: self.config.clone(),
            shutdown: shutdown.clone(),
            tasks: TaskTracker::new(),
        };
        let events = self.events.clone();
        let worker_threads = self.config.worker_threads;

        let thread = std::thread::Builder::new()
            .name(format!("ws-server-{port}"))
            .spawn(move || run_server(server_config, worker_threads, state, addr_tx, events))
            .map_err(NodeError::Runtime)?;

        tracing::info!(port, "websocket server starting");
        *running = Some(RunningServer {
            config: server_config,
            shutdown,
            local_addr: addr_rx,
            thread,
        });
        Ok(())
    }

    /// Stops the accept loop and closes every registered connection.
    ///
    /// Blocks until the server thread has exited, unless called from that
    /// thread (an event sink reacting to a lifecycle event); the thread
    /// then winds down on its own. Returns `false` if no server was
    /// running.
    pub fn stop(&self) -> bool {
        let Some(server) = self.running.lock().take() else {
            return false;
        };
        let port = server.config.port;
        server.shutdown.cancel();
        if server.thread.thread().id() == std::thread::current().id() {
            tracing::debug!(port, "stop requested from the server thread");
        } else if server.thread.join().is_err() {
            tracing::warn!(port, "server thread panicked");
        }
        let closed = self.registry.close_all();
        tracing::info!(port, closed, "websocket server stopped");
        true
    }

    /// Whether a server is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.lock().as_ref().is_some_and(RunningServer::is_alive)
    }

    /// Port requested for the running server.
    #[must_use]
    pub fn running_port(&self) -> Option<u16> {
        self.running
            .lock()
            .as_ref()
            .filter(|server| server.is_alive())
            .map(|server| server.config.port)
    }

    /// Address the running server is bound to, once it is listening.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running
            .lock()
            .as_ref()
            .and_then(|server| *server.local_addr.borrow())
    }

    /// Waits up to `timeout` for the running server to start listening.
    ///
    /// Returns `None` if no server is running, it failed to bind, or the
    /// timeout elapsed.
    pub async fn wait_until_listening(&self, timeout: Duration) -> Option<SocketAddr> {
        let mut rx = self.running.lock().as_ref()?.local_addr.clone();
        let waited = tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await;
        match waited {
            Ok(Ok(addr)) => *addr,
            _ => None,
        }
    }

    /// Open connections of the current (or last) server.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Number of open connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }
}

impl Drop for ServerSupervisor {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Body of the server thread.
fn run_server(
    config: ServerConfig,
    worker_threads: usize,
    state: AppState,
    addr_tx: watch::Sender<Option<SocketAddr>>,
    events: Option<EventSink>,
) {
    let port = config.port;
    let result = build_runtime(worker_threads)
        .map_err(NodeError::Runtime)
        .and_then(|runtime| runtime.block_on(serve(config, state, addr_tx, events.as_ref())));

    let event = match result {
        Ok(()) => ServerEvent::Stopped { port },
        Err(err) => {
            tracing::error!(port, error = %err, "websocket server failed");
            ServerEvent::Failed {
                port,
                reason: err.to_string(),
            }
        }
    };
    emit(events.as_ref(), event);
}

fn build_runtime(worker_threads: usize) -> std::io::Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all().thread_name("ws-worker");
    if worker_threads > 0 {
        builder.worker_threads(worker_threads);
    }
    builder.build()
}

/// Binds, announces, and runs the accept loop until `state.shutdown` fires.
async fn serve(
    config: ServerConfig,
    state: AppState,
    addr_tx: watch::Sender<Option<SocketAddr>>,
    events: Option<&EventSink>,
) -> Result<(), NodeError> {
    let bind_err = |source| NodeError::Bind {
        port: config.port,
        source,
    };
    let listener = TcpListener::bind(config.listen_addr())
        .await
        .map_err(bind_err)?;
    let local_addr = listener.local_addr().map_err(bind_err)?;

    let shutdown = state.shutdown.clone();
    let registry = Arc::clone(&state.registry);
    let tasks = state.tasks.clone();
    let app = api::build_router(state);

    addr_tx.send_replace(Some(local_addr));
    tracing::info!(addr = %local_addr, "websocket server listening");
    emit(
        events,
        ServerEvent::Listening {
            requested_port: config.port,
            port: local_addr.port(),
        },
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.cancelled_owned())
    .await
    .map_err(|err| NodeError::Internal(err.to_string()))?;

    // Upgraded connections outlive the accept loop; let them close cleanly.
    tasks.close();
    if tokio::time::timeout(CONNECTION_DRAIN_TIMEOUT, tasks.wait())
        .await
        .is_err()
    {
        tracing::warn!(
            remaining = tasks.len(),
            "connection tasks still running after shutdown"
        );
    }

    let closed = registry.close_all();
    tracing::debug!(closed, "accept loop finished");
    Ok(())
}

fn emit(events: Option<&EventSink>, event: ServerEvent) {
    if let Some(sink) = events {
        sink(event);
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;
    use crate::service::InMemorySeries;

    fn loopback_supervisor() -> ServerSupervisor {
        let config = NodeConfig {
            bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            worker_threads: 1,
            ..NodeConfig::default()
        };
        ServerSupervisor::new(config, Arc::new(InMemorySeries::new()))
    }

    #[test]
    fn idle_supervisor_reports_nothing() {
        let supervisor = loopback_supervisor();
        assert!(!supervisor.is_running());
        assert_eq!(supervisor.running_port(), None);
        assert_eq!(supervisor.local_addr(), None);
        assert!(!supervisor.stop());
    }

    #[tokio::test]
    async fn start_listens_and_stop_shuts_down() {
        let supervisor = loopback_supervisor();
        assert!(supervisor.start(0).is_ok());
        assert_eq!(supervisor.running_port(), Some(0));

        let Some(addr) = supervisor.wait_until_listening(Duration::from_secs(5)).await else {
            panic!("server never listened");
        };
        assert_ne!(addr.port(), 0);
        assert_eq!(supervisor.local_addr(), Some(addr));

        assert!(supervisor.stop());
        assert!(!supervisor.is_running());
        assert!(TcpListener::bind(addr).await.is_ok());
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let supervisor = loopback_supervisor();
        assert!(supervisor.start(0).is_ok());
        let second = supervisor.start(0);
        assert!(matches!(second, Err(NodeError::AlreadyRunning(0))));
        assert!(supervisor.stop());
    }

    #[test]
    fn event_sink_can_stop_its_own_server() {
        let (tx, rx) = std::sync::mpsc::channel();
        let slot: Arc<std::sync::OnceLock<std::sync::Weak<ServerSupervisor>>> =
            Arc::new(std::sync::OnceLock::new());
        let sink_slot = Arc::clone(&slot);
        let sink: EventSink = Arc::new(move |event: ServerEvent| {
            if matches!(event, ServerEvent::Listening { .. })
                && let Some(supervisor) = sink_slot.get().and_then(std::sync::Weak::upgrade)
            {
                let _ = supervisor.stop();
            }
            let _ = tx.send(event);
        });
        let supervisor = Arc::new(loopback_supervisor().with_events(sink));
        let _ = slot.set(Arc::downgrade(&supervisor));

        assert!(supervisor.start(0).is_ok());
        let Ok(first) = rx.recv_timeout(Duration::from_secs(5)) else {
            panic!("no listening event");
        };
        assert!(matches!(first, ServerEvent::Listening { .. }));
        let Ok(second) = rx.recv_timeout(Duration::from_secs(5)) else {
            panic!("server did not stop");
        };
        assert!(matches!(second, ServerEvent::Stopped { port: 0 }));
        assert!(!supervisor.is_running());
    }

    #[tokio::test]
    async fn bind_failure_is_reported_not_fatal() {
        let Ok(occupied) = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await else {
            panic!("could not reserve a port");
        };
        let Ok(taken) = occupied.local_addr() else {
            panic!("no local addr");
        };

        let (tx, rx) = std::sync::mpsc::channel();
        let sink: EventSink = Arc::new(move |event: ServerEvent| {
            let _ = tx.send(event);
        });
        let supervisor = loopback_supervisor().with_events(sink);
        assert!(supervisor.start(taken.port()).is_ok());

        let Ok(event) = rx.recv_timeout(Duration::from_secs(5)) else {
            panic!("no lifecycle event");
        };
        assert!(matches!(event, ServerEvent::Failed { port, .. } if port == taken.port()));
        assert!(supervisor.wait_until_listening(Duration::from_millis(100)).await.is_none());
        for _ in 0..100 {
            if !supervisor.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!supervisor.is_running());

        // The dead server does not block a fresh start.
        assert!(supervisor.start(0).is_ok());
        assert!(supervisor.stop());
    }
}
