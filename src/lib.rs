//! # nadi-websocket-node
//!
//! Command-driven websocket node. A host process sends management
//! messages; an `open_websocket` command stands up a websocket server
//! that tracks its live connections and answers downsampled range
//! queries on them.
//!
//! ## Architecture
//!
//! ```text
//! Host process
//!     │
//!     ├── HostBridge (bridge/)          init / send / free / deinit
//!     ├── CommandDispatcher (service/)  management payload → action
//!     ├── ServerSupervisor (service/)   owns the server thread
//!     │
//!     ├── Router + WS handler (api/, ws/)
//!     ├── ConnectionRegistry (domain/)
//!     │
//!     └── Downsampler (service/)        range-query engine seam
//! ```

pub mod api;
pub mod app_state;
pub mod bridge;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod ws;
