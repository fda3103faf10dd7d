//! Service layer: server lifecycle, command dispatch, and the
//! downsampling engine seam.
//!
//! [`CommandDispatcher`] turns management payloads into calls on
//! [`ServerSupervisor`], which owns the websocket server thread.
//! Range queries from websocket clients go through [`Downsampler`].

pub mod dispatcher;
pub mod downsample;
pub mod supervisor;

pub use dispatcher::{CommandDispatcher, DispatchStatus};
pub use downsample::{Downsampler, InMemorySeries, QueryError};
pub use supervisor::{EventSink, ServerSupervisor};
