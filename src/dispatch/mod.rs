//! Dispatch module - outbound calls and inbound correlation.
//!
//! Provides:
//! - [`Dispatcher`] - resolves, assembles, sends and correlates RPC calls
//! - [`CommandHandle`] / [`RpcHandle`] - symbolic navigation to callable RPCs
//! - [`EventBus`] - FIFO one-shot listeners plus persistent watchers
//! - the writer task that serializes all outbound bytes
//!
//! The wire protocol has no correlation id; replies pair with callers by
//! the `"<method>:<namespace>#<rpc>"` key, FIFO per key.

mod dispatcher;
mod event;
mod handle;
mod writer;

pub use dispatcher::{Dispatcher, PendingReply, DEFAULT_REQUEST_TIMEOUT};
pub use event::{event_key, EventBus, ListenerId, RpcEvent};
pub use handle::{CommandHandle, RpcHandle};
pub use writer::{spawn_writer_task, WriterHandle, DEFAULT_CHANNEL_CAPACITY};
