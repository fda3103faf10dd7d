//! Host-facing entry points: `init`, `deinit`, `send`, `free`,
//! `descriptor`.
//!
//! The host never observes a panic or an error type from here, only a
//! [`Status`]. Dispatch runs inside `catch_unwind`; contract violations
//! (unknown or deinitialized handles) come back as
//! [`Status::InvalidInstance`].

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::message::{MANAGEMENT_CHANNEL, Message};
use crate::config::NodeConfig;
use crate::domain::ServerEvent;
use crate::error::{NodeError, Status};
use crate::service::{
    CommandDispatcher, DispatchStatus, Downsampler, EventSink, InMemorySeries, ServerSupervisor,
};

/// Static module descriptor returned by [`HostBridge::descriptor`].
pub const DESCRIPTOR: &str = r#"{"name":"nadi-websocket-node","version":"1.0"}"#;

/// Callback through which an instance delivers asynchronous messages to
/// the host.
///
/// Runs synchronously on the instance's server thread, so a slow callback
/// delays that server. It may call back into the bridge, including
/// `close_websocket` or [`HostBridge::deinit`] for its own instance; those
/// stop the server without waiting for the thread the callback is on.
pub type ReceiveCallback = Arc<dyn Fn(Message) + Send + Sync>;

/// Opaque identifier of one initialized instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceHandle(u64);

impl InstanceHandle {
    /// Raw value, for logging.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One dispatcher bound to one receive callback.
#[derive(Debug)]
struct NodeInstance {
    handle: InstanceHandle,
    dispatcher: CommandDispatcher,
    outstanding: Arc<AtomicUsize>,
}

impl NodeInstance {
    fn handle_message(&self, message: &Message) -> DispatchStatus {
        match message.channel {
            MANAGEMENT_CHANNEL => self.dispatcher.dispatch(&message.data),
            channel => {
                tracing::debug!(instance = %self.handle, channel, "ignoring data channel message");
                DispatchStatus::NoOp
            }
        }
    }
}

/// Registry of instances created by the host.
pub struct HostBridge {
    config: NodeConfig,
    downsampler: Arc<dyn Downsampler>,
    instances: Mutex<HashMap<InstanceHandle, Arc<NodeInstance>>>,
    next_handle: AtomicU64,
}

impl fmt::Debug for HostBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBridge")
            .field("config", &self.config)
            .field("instances", &self.instances.lock().len())
            .finish_non_exhaustive()
    }
}

impl HostBridge {
    /// Creates a bridge whose instances answer queries from an empty
    /// in-memory series.
    #[must_use]
    pub fn new(config: NodeConfig) -> Self {
        Self::with_downsampler(config, Arc::new(InMemorySeries::new()))
    }

    /// Creates a bridge whose instances answer queries from `downsampler`.
    #[must_use]
    pub fn with_downsampler(config: NodeConfig, downsampler: Arc<dyn Downsampler>) -> Self {
        Self {
            config,
            downsampler,
            instances: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Module descriptor. Pure.
    #[must_use]
    pub const fn descriptor() -> &'static str {
        DESCRIPTOR
    }

    /// Creates an instance bound to `callback`.
    ///
    /// Server lifecycle events of the instance arrive through `callback`
    /// as management-channel messages that must be passed to
    /// [`HostBridge::free`].
    pub fn init(&self, callback: ReceiveCallback) -> InstanceHandle {
        let handle = InstanceHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let outstanding = Arc::new(AtomicUsize::new(0));

        let sink: EventSink = {
            let outstanding = Arc::clone(&outstanding);
            Arc::new(move |event: ServerEvent| {
                let _ = outstanding.fetch_add(1, Ordering::Relaxed);
                callback(Message::from_instance(
                    handle,
                    MANAGEMENT_CHANNEL,
                    event.to_json_bytes(),
                ));
            })
        };
        let supervisor = Arc::new(
            ServerSupervisor::new(self.config.clone(), Arc::clone(&self.downsampler))
                .with_events(sink),
        );
        let instance = NodeInstance {
            handle,
            dispatcher: CommandDispatcher::new(supervisor, self.config.default_port),
            outstanding,
        };

        self.instances.lock().insert(handle, Arc::new(instance));
        tracing::info!(instance = %handle, "instance initialized");
        handle
    }

    /// Destroys an instance, stopping its server first if one is running.
    ///
    /// Returns [`Status::InvalidInstance`] for unknown handles.
    pub fn deinit(&self, handle: InstanceHandle) -> Status {
        let Some(instance) = self.instances.lock().remove(&handle) else {
            tracing::warn!(instance = %handle, "deinit of unknown instance");
            return NodeError::UnknownInstance(handle.get()).status();
        };
        if instance.dispatcher.supervisor().stop() {
            tracing::info!(instance = %handle, "stopped running server on deinit");
        }
        tracing::info!(instance = %handle, "instance deinitialized");
        Status::Ok
    }

    /// Delivers one message to an instance.
    ///
    /// Returns [`Status::Ok`] whether the message was acted on or ignored,
    /// and [`Status::InvalidInstance`] if `handle` is not live.
    pub fn send(&self, message: &Message, handle: InstanceHandle) -> Status {
        let instance = self.instances.lock().get(&handle).map(Arc::clone);
        let Some(instance) = instance else {
            tracing::warn!(instance = %handle, "send to unknown instance");
            return NodeError::UnknownInstance(handle.get()).status();
        };

        match panic::catch_unwind(AssertUnwindSafe(|| instance.handle_message(message))) {
            Ok(status) => {
                tracing::debug!(instance = %handle, ?status, "message handled");
            }
            Err(_) => {
                tracing::error!(instance = %handle, "dispatch panicked; message dropped");
            }
        }
        Status::Ok
    }

    /// Releases a message produced by an instance.
    ///
    /// Taking the message by value makes a second free of the same message
    /// impossible. Messages whose instance is gone, or that the host
    /// created itself, are simply dropped.
    pub fn free(&self, message: Message) {
        if let Some(origin) = message.origin()
            && let Some(instance) = self.instances.lock().get(&origin)
        {
            let _ = instance.outstanding.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                n.checked_sub(1)
            });
        }
        drop(message);
    }

    /// Messages produced by `handle` and not yet freed.
    #[must_use]
    pub fn outstanding_messages(&self, handle: InstanceHandle) -> Option<usize> {
        self.instances
            .lock()
            .get(&handle)
            .map(|instance| instance.outstanding.load(Ordering::Relaxed))
    }

    /// Supervisor of a live instance.
    #[must_use]
    pub fn supervisor(&self, handle: InstanceHandle) -> Option<Arc<ServerSupervisor>> {
        self.instances
            .lock()
            .get(&handle)
            .map(|instance| Arc::clone(instance.dispatcher.supervisor()))
    }

    /// Number of live instances.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.instances.lock().len()
    }
}
