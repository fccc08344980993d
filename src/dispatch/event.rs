//! Response correlation by event key.
//!
//! The wire protocol has no correlation id, so inbound packets are matched
//! to callers purely by the string key `"<method>:<namespace>#<rpc>"`.
//! One-shot listeners queue FIFO per key: reply N goes to caller N, and a
//! reply whose paired listener is gone is discarded, never handed to the
//! next caller in line. Persistent watchers see every successful event on
//! their key without consuming the one-shot queue.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tokio::sync::{mpsc, oneshot};

use crate::error::{BowlerError, Result};
use crate::protocol::Method;
use crate::registry::RpcReply;

/// Build the correlation key for a (method, namespace, rpc) triple.
pub fn event_key(method: Method, namespace: &str, rpc: &str) -> String {
    format!("{}:{namespace}#{rpc}", method.as_str())
}

/// A decoded inbound packet, as delivered to subscribers.
#[derive(Debug, Clone)]
pub struct RpcEvent {
    pub method: Method,
    pub namespace: String,
    pub rpc: String,
    pub reply: RpcReply,
}

/// Token identifying one registered one-shot listener.
pub type ListenerId = u64;

struct KeyListeners {
    oneshots: VecDeque<(ListenerId, oneshot::Sender<Result<RpcReply>>)>,
    watchers: Vec<mpsc::UnboundedSender<RpcEvent>>,
}

impl KeyListeners {
    fn new() -> Self {
        Self {
            oneshots: VecDeque::new(),
            watchers: Vec::new(),
        }
    }

    fn is_idle(&self) -> bool {
        self.oneshots.is_empty() && self.watchers.is_empty()
    }
}

/// FIFO one-shot listeners plus persistent watchers, keyed by event name.
pub struct EventBus {
    inner: Mutex<BusState>,
}

struct BusState {
    keys: HashMap<String, KeyListeners>,
    next_id: ListenerId,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BusState {
                keys: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Queue a one-shot listener on `key`.
    ///
    /// Returns the listener id (for removal on timeout or cancel) and the
    /// receiver the correlated result will arrive on.
    pub fn register(&self, key: &str) -> (ListenerId, oneshot::Receiver<Result<RpcReply>>) {
        let (tx, rx) = oneshot::channel();
        let mut state = self.inner.lock().expect("event bus lock");
        let id = state.next_id;
        state.next_id += 1;
        state
            .keys
            .entry(key.to_string())
            .or_insert_with(KeyListeners::new)
            .oneshots
            .push_back((id, tx));
        (id, rx)
    }

    /// Remove a queued one-shot listener, wherever it sits in the line.
    pub fn remove(&self, key: &str, id: ListenerId) {
        let mut state = self.inner.lock().expect("event bus lock");
        if let Some(listeners) = state.keys.get_mut(key) {
            listeners.oneshots.retain(|(i, _)| *i != id);
            if listeners.is_idle() {
                state.keys.remove(key);
            }
        }
    }

    /// Add a persistent watcher on `key`.
    pub fn subscribe(&self, key: &str) -> mpsc::UnboundedReceiver<RpcEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .expect("event bus lock")
            .keys
            .entry(key.to_string())
            .or_insert_with(KeyListeners::new)
            .watchers
            .push(tx);
        rx
    }

    /// Deliver an inbound result to the front-of-queue listener and every
    /// watcher on its key.
    ///
    /// Errors go only to the correlated caller; watchers see successful
    /// events. A result with no listener at all is logged as spurious.
    pub fn fire(&self, event: RpcEvent, result: Result<RpcReply>) {
        let key = event_key(event.method, &event.namespace, &event.rpc);
        let mut state = self.inner.lock().expect("event bus lock");
        let Some(listeners) = state.keys.get_mut(&key) else {
            tracing::warn!(%key, "spurious reply, no listener registered");
            return;
        };

        let ok = result.is_ok();
        if let Some((_, tx)) = listeners.oneshots.pop_front() {
            if tx.send(result).is_err() {
                tracing::debug!(%key, "reply for a cancelled call, discarding");
            }
        }
        if ok {
            listeners.watchers.retain(|w| w.send(event.clone()).is_ok());
        }
        if listeners.is_idle() {
            state.keys.remove(&key);
        }
    }

    /// Fail every queued one-shot listener; watchers are dropped.
    pub fn fail_all(&self, error: impl Fn() -> BowlerError) {
        let mut state = self.inner.lock().expect("event bus lock");
        for (_, listeners) in state.keys.drain() {
            for (_, tx) in listeners.oneshots {
                let _ = tx.send(Err(error()));
            }
        }
    }

    /// Queued one-shot listeners on `key`, for diagnostics.
    pub fn pending_on(&self, key: &str) -> usize {
        self.inner
            .lock()
            .expect("event bus lock")
            .keys
            .get(key)
            .map_or(0, |l| l.oneshots.len())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
