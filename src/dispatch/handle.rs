//! Navigable command handles.
//!
//! A [`CommandHandle`] names a position in the namespace trie; its children
//! are namespace segments and its leaves are callable [`RpcHandle`]s. For a
//! multi-method RPC the leaf itself is an intermediate node whose children
//! are the methods. Child handles are built lazily and cached; the cache is
//! dropped whenever the registry generation moves (introspection or a new
//! contribution).
//!
//! # Example
//!
//! ```ignore
//! let dyio = device.command_to().at("neuronrobotics.dyio");
//! let power = dyio.rpc("_pwr");
//! power.critical().call(&[true.into()]).await?;
//! let state = power.get().call(&[]).await?;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::codec::BowlerValue;
use crate::dispatch::dispatcher::{Dispatcher, PendingReply};
use crate::dispatch::event::RpcEvent;
use crate::error::Result;
use crate::protocol::Method;
use crate::registry::RpcReply;

struct HandleCache {
    generation: u64,
    children: HashMap<String, CommandHandle>,
}

/// A namespace position reachable from the device's command root.
#[derive(Clone)]
pub struct CommandHandle {
    dispatcher: Dispatcher,
    path: Vec<String>,
    cache: Arc<Mutex<HandleCache>>,
}

impl CommandHandle {
    /// Root handle; children are top-level namespace segments.
    pub fn root(dispatcher: Dispatcher) -> Self {
        let generation = dispatcher.generation();
        Self {
            dispatcher,
            path: Vec::new(),
            cache: Arc::new(Mutex::new(HandleCache {
                generation,
                children: HashMap::new(),
            })),
        }
    }

    /// Dotted path of this handle; empty at the root.
    pub fn path(&self) -> String {
        self.path.join(".")
    }

    /// Child handle for one namespace segment, lazily cached.
    ///
    /// A `com` segment is skipped, so `.ns("com")` returns a handle at the
    /// same position.
    pub fn ns(&self, segment: &str) -> CommandHandle {
        if segment == "com" {
            return self.clone();
        }
        let mut cache = self.cache.lock().expect("handle cache lock");
        let generation = self.dispatcher.generation();
        if cache.generation != generation {
            cache.children.clear();
            cache.generation = generation;
        }
        if let Some(child) = cache.children.get(segment) {
            return child.clone();
        }

        let mut path = self.path.clone();
        path.push(segment.to_string());
        let child = CommandHandle {
            dispatcher: self.dispatcher.clone(),
            path,
            cache: Arc::new(Mutex::new(HandleCache {
                generation,
                children: HashMap::new(),
            })),
        };
        cache.children.insert(segment.to_string(), child.clone());
        child
    }

    /// Walk several dot-separated segments at once.
    pub fn at(&self, dotted: &str) -> CommandHandle {
        dotted
            .split('.')
            .filter(|s| !s.is_empty())
            .fold(self.clone(), |handle, segment| handle.ns(segment))
    }

    /// Namespace segments below this position, from the registry.
    pub fn children(&self) -> Result<Vec<String>> {
        self.dispatcher.child_segments(&self.path())
    }

    /// RPC names defined at this position.
    pub fn rpcs(&self) -> Result<Vec<String>> {
        let path = self.path();
        let catalog = self.dispatcher.catalog();
        Ok(catalog
            .namespaces
            .iter()
            .find(|ns| ns.name == path)
            .map(|ns| ns.rpcs.iter().map(|r| r.name.clone()).collect())
            .unwrap_or_default())
    }

    /// Callable leaf for an RPC at this position.
    pub fn rpc(&self, name: &str) -> RpcHandle {
        RpcHandle {
            dispatcher: self.dispatcher.clone(),
            namespace: self.path(),
            rpc: name.to_string(),
            method: None,
        }
    }
}

/// A callable RPC leaf, optionally pinned to one send method.
#[derive(Clone)]
pub struct RpcHandle {
    dispatcher: Dispatcher,
    namespace: String,
    rpc: String,
    method: Option<Method>,
}

impl RpcHandle {
    /// The RPC name.
    pub fn name(&self) -> &str {
        &self.rpc
    }

    /// The dotted namespace this RPC lives in.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Send methods the registry knows for this RPC.
    pub fn methods(&self) -> Result<Vec<Method>> {
        self.dispatcher.rpc_methods(&self.namespace, &self.rpc)
    }

    /// Whether the RPC accepts more than one send method.
    pub fn is_multi(&self) -> Result<bool> {
        Ok(self.methods()?.len() > 1)
    }

    /// Pin this handle to one send method.
    pub fn method(&self, method: Method) -> RpcHandle {
        RpcHandle {
            method: Some(method),
            ..self.clone()
        }
    }

    /// Method-pinned child, `get`.
    pub fn get(&self) -> RpcHandle {
        self.method(Method::Get)
    }

    /// Method-pinned child, `post`.
    pub fn post(&self) -> RpcHandle {
        self.method(Method::Post)
    }

    /// Method-pinned child, `critical`.
    pub fn critical(&self) -> RpcHandle {
        self.method(Method::Critical)
    }

    /// Call with positional arguments and await the correlated reply.
    pub async fn call(&self, args: &[BowlerValue]) -> Result<RpcReply> {
        self.dispatcher
            .call(&self.namespace, &self.rpc, self.method, args)
            .await
    }

    /// Send the call and hand back the deferred reply.
    ///
    /// The listener is registered now; the caller awaits (or drops) the
    /// [`PendingReply`] whenever it likes.
    pub async fn defer(&self, args: &[BowlerValue]) -> Result<PendingReply> {
        self.dispatcher
            .defer(&self.namespace, &self.rpc, self.method, args)
            .await
    }

    /// Persistent stream of events on this RPC's reply key.
    ///
    /// Keyed by the receive method of the pinned (or default) send method,
    /// which is how device-initiated `async` traffic is surfaced.
    pub fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<RpcEvent>> {
        let methods = self.methods()?;
        let send = self.method.unwrap_or(methods[0]);
        let registry_recv = self
            .dispatcher
            .rpc_recv_method(&self.namespace, &self.rpc, send)?;
        Ok(self
            .dispatcher
            .subscribe(registry_recv, &self.namespace, &self.rpc))
    }
}
