//! Command dispatcher.
//!
//! Owns the registry, the id table, the event bus and the writer handle.
//! Outbound calls resolve their codec bindings, assemble a packet, register
//! a one-shot listener keyed on the expected reply, and queue the bytes;
//! inbound packets are parsed, decoded by the receive-method parser, and
//! fired at the listener queue. All state lives behind one shared struct so
//! handles are cheap clones.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::codec::{BowlerValue, PacketAssembler};
use crate::dispatch::event::{event_key, EventBus, ListenerId, RpcEvent};
use crate::dispatch::writer::WriterHandle;
use crate::error::{BowlerError, Result};
use crate::protocol::{assemble_packet, MacAddress, Method, ParsedPacket};
use crate::registry::{
    strip_com, Catalog, NamespaceContribution, NamespaceIdTable, NamespaceRegistry, RpcReply,
};

/// Default per-call reply timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(2000);

pub(crate) struct Shared {
    registry: Mutex<NamespaceRegistry>,
    ids: Mutex<NamespaceIdTable>,
    events: EventBus,
    writer: WriterHandle,
    mac: Mutex<MacAddress>,
    timeout: Duration,
    /// Bumped on every registry mutation; handles use it to drop caches.
    generation: AtomicU64,
    closed: AtomicBool,
    /// Serializes introspection walks (single flight).
    introspection: tokio::sync::Mutex<()>,
}

/// Handle to the dispatcher state. Cloning is cheap.
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// New dispatcher over a writer handle.
    pub fn new(writer: WriterHandle, timeout: Duration, mac: MacAddress) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(NamespaceRegistry::new()),
                ids: Mutex::new(NamespaceIdTable::new()),
                events: EventBus::new(),
                writer,
                mac: Mutex::new(mac),
                timeout,
                generation: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                introspection: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Merge a namespace contribution into the registry.
    pub fn import_namespace(&self, contribution: NamespaceContribution) -> Result<()> {
        self.shared
            .registry
            .lock()
            .expect("registry lock")
            .import_namespace(contribution)?;
        self.bump_generation();
        Ok(())
    }

    /// Target MAC used for outbound packets.
    pub fn mac(&self) -> MacAddress {
        *self.shared.mac.lock().expect("mac lock")
    }

    /// Retarget outbound packets, e.g. after the device reports its address.
    pub fn set_mac(&self, mac: MacAddress) {
        *self.shared.mac.lock().expect("mac lock") = mac;
    }

    /// Registry mutation counter; handle caches key off it.
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    pub(crate) fn bump_generation(&self) {
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Record a namespace id discovered on the wire.
    pub fn register_namespace_id(&self, id: u8, name: &str) {
        self.shared
            .ids
            .lock()
            .expect("id table lock")
            .insert(id, name);
    }

    /// Snapshot of the id table, sorted by id.
    pub fn namespace_ids(&self) -> Vec<(u8, String)> {
        self.shared.ids.lock().expect("id table lock").entries()
    }

    /// Whether the device has advertised `name` in the id table.
    pub fn advertises(&self, name: &str) -> bool {
        self.shared
            .ids
            .lock()
            .expect("id table lock")
            .contains_name(name)
    }

    /// Send methods registered for an RPC.
    pub fn rpc_methods(&self, namespace: &str, rpc: &str) -> Result<Vec<Method>> {
        let registry = self.shared.registry.lock().expect("registry lock");
        Ok(registry.resolve_rpc(namespace, rpc)?.send_methods())
    }

    /// Receive method paired with `send` for an RPC.
    pub fn rpc_recv_method(&self, namespace: &str, rpc: &str, send: Method) -> Result<Method> {
        let registry = self.shared.registry.lock().expect("registry lock");
        let entry = registry.resolve_rpc(namespace, rpc)?;
        entry
            .recv_for(send)
            .ok_or(BowlerError::UnsupportedMethod {
                namespace: strip_com(namespace).to_string(),
                rpc: rpc.to_string(),
                method: send,
            })
    }

    /// Whether an RPC is registered under `namespace`.
    pub fn has_rpc(&self, namespace: &str, rpc: &str) -> bool {
        self.shared
            .registry
            .lock()
            .expect("registry lock")
            .resolve_rpc(namespace, rpc)
            .is_ok()
    }

    /// Child segments below a dotted path, for handle navigation.
    pub fn child_segments(&self, path: &str) -> Result<Vec<String>> {
        let registry = self.shared.registry.lock().expect("registry lock");
        Ok(registry
            .resolve(path)?
            .child_names()
            .into_iter()
            .map(String::from)
            .collect())
    }

    /// Serializable snapshot of the registry and id table.
    pub fn catalog(&self) -> Catalog {
        let registry = self.shared.registry.lock().expect("registry lock");
        let ids = self.shared.ids.lock().expect("id table lock");
        Catalog::build(&registry, &ids)
    }

    /// Run `f` against the mutable registry, bumping the generation.
    pub(crate) fn with_registry_mut<T>(&self, f: impl FnOnce(&mut NamespaceRegistry) -> T) -> T {
        let out = f(&mut self.shared.registry.lock().expect("registry lock"));
        self.bump_generation();
        out
    }

    pub(crate) async fn introspection_guard(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.shared.introspection.lock().await
    }

    /// Queue raw packet bytes; a write failure is fatal for the dispatcher.
    pub async fn send_datagram(&self, datagram: Bytes) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(BowlerError::TransportClosed);
        }
        match self.shared.writer.send(datagram).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    /// Resolve, assemble and send a call, returning the deferred reply.
    ///
    /// The listener is registered before the bytes are queued, so a reply
    /// can never race past its caller.
    pub async fn defer(
        &self,
        namespace: &str,
        rpc: &str,
        method: Option<Method>,
        args: &[BowlerValue],
    ) -> Result<PendingReply> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(BowlerError::TransportClosed);
        }
        let namespace = strip_com(namespace);

        let (method, recv, builder) = {
            let registry = self.shared.registry.lock().expect("registry lock");
            let entry = registry.resolve_rpc(namespace, rpc)?;
            let method = method.unwrap_or_else(|| entry.default_method());
            if !entry.supports(method) {
                return Err(BowlerError::UnsupportedMethod {
                    namespace: namespace.to_string(),
                    rpc: rpc.to_string(),
                    method,
                });
            }
            let recv = entry
                .recv_for(method)
                .expect("send set implies a recv mapping");
            let builder = entry
                .builder_for(method)
                .expect("send set implies a builder");
            (method, recv, builder)
        };

        let mut body = PacketAssembler::new();
        builder(args, &mut body)?;
        let datagram = {
            let ids = self.shared.ids.lock().expect("id table lock");
            assemble_packet(self.mac(), method, namespace, rpc, &ids, body)?
        };

        let key = event_key(recv, namespace, rpc);
        let (id, rx) = self.shared.events.register(&key);
        if let Err(e) = self.send_datagram(datagram).await {
            self.shared.events.remove(&key, id);
            return Err(e);
        }

        Ok(PendingReply {
            key,
            id,
            rx: Some(rx),
            timeout: self.shared.timeout,
            shared: self.shared.clone(),
        })
    }

    /// Call an RPC and await its correlated reply.
    pub async fn call(
        &self,
        namespace: &str,
        rpc: &str,
        method: Option<Method>,
        args: &[BowlerValue],
    ) -> Result<RpcReply> {
        self.defer(namespace, rpc, method, args).await?.wait().await
    }

    /// Persistent event stream for a (method, namespace, rpc) key.
    pub fn subscribe(
        &self,
        method: Method,
        namespace: &str,
        rpc: &str,
    ) -> mpsc::UnboundedReceiver<RpcEvent> {
        self.shared
            .events
            .subscribe(&event_key(method, strip_com(namespace), rpc))
    }

    /// Classify and deliver one complete inbound packet.
    pub fn handle_inbound(&self, bytes: &[u8]) {
        let packet = {
            let ids = self.shared.ids.lock().expect("id table lock");
            match ParsedPacket::parse(bytes, &ids) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping inbound packet");
                    return;
                }
            }
        };

        let parser = {
            let registry = self.shared.registry.lock().expect("registry lock");
            match registry.resolve_rpc(&packet.namespace, &packet.rpc) {
                Ok(entry) => entry.parser_for_recv(packet.header.method),
                Err(e) => {
                    tracing::warn!(
                        namespace = %packet.namespace,
                        rpc = %packet.rpc,
                        error = %e,
                        "inbound packet for an unregistered RPC"
                    );
                    return;
                }
            }
        };
        let Some(parser) = parser else {
            tracing::warn!(
                namespace = %packet.namespace,
                rpc = %packet.rpc,
                method = %packet.header.method,
                "no parser registered for the inbound method"
            );
            return;
        };

        let result = parser(&packet.body_range());
        let event = RpcEvent {
            method: packet.header.method,
            namespace: packet.namespace,
            rpc: packet.rpc,
            reply: result.as_ref().ok().cloned().unwrap_or_default(),
        };
        self.shared.events.fire(event, result);
    }

    /// Mark the transport dead and fail every outstanding call.
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            tracing::error!("transport closed, failing outstanding calls");
            self.shared.events.fail_all(|| BowlerError::TransportClosed);
        }
    }

    /// Whether the dispatcher has seen a fatal transport failure.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

/// A registered call whose reply has not been awaited yet.
///
/// Dropping the value cancels the call: its listener leaves the queue and a
/// late reply is discarded with a warning.
pub struct PendingReply {
    key: String,
    id: ListenerId,
    rx: Option<oneshot::Receiver<Result<RpcReply>>>,
    timeout: Duration,
    shared: Arc<Shared>,
}

impl PendingReply {
    /// The event key this call is correlated on.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Await the correlated reply, bounded by the per-call timeout.
    pub async fn wait(mut self) -> Result<RpcReply> {
        let rx = self.rx.take().expect("wait consumes the receiver");
        match tokio::time::timeout(self.timeout, rx).await {
            Err(_) => {
                self.shared.events.remove(&self.key, self.id);
                Err(BowlerError::Timeout(self.key.clone()))
            }
            Ok(Err(_)) => Err(BowlerError::TransportClosed),
            Ok(Ok(result)) => result,
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if self.rx.is_some() {
            self.shared.events.remove(&self.key, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    use tokio::io::AsyncReadExt;

    use crate::codec::ByteRange;
    use crate::dispatch::writer::spawn_writer_task;
    use crate::registry::{empty_builder, empty_parser};

    fn ping_contribution() -> NamespaceContribution {
        NamespaceContribution::new("bcs.core").rpc(
            "_png",
            Method::Get,
            Method::Status,
            empty_builder("_png"),
            empty_parser(),
        )
    }

    fn test_dispatcher(timeout_ms: u64) -> (Dispatcher, tokio::io::DuplexStream) {
        let (client, server) = tokio::io::duplex(4096);
        let (writer, _task) = spawn_writer_task(client);
        let dispatcher = Dispatcher::new(
            writer,
            Duration::from_millis(timeout_ms),
            MacAddress::BROADCAST,
        );
        dispatcher.import_namespace(ping_contribution()).unwrap();
        (dispatcher, server)
    }

    /// Reply packet with the given method, rpc and body, from the device.
    fn reply_bytes(id: u8, namespace: &str, rpc: &str, body: &[u8]) -> Bytes {
        let mut ids = NamespaceIdTable::new();
        ids.insert(id, namespace);
        let mut asm = PacketAssembler::new();
        if !body.is_empty() {
            asm.put_bytes(0, body);
        }
        assemble_packet(
            MacAddress::BROADCAST,
            Method::Status,
            namespace,
            rpc,
            &ids,
            asm,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_ping_round_trip() {
        let (dispatcher, mut server) = test_dispatcher(500);

        let pending = dispatcher.defer("bcs.core", "_png", None, &[]).await.unwrap();
        assert_eq!(pending.key(), "status:bcs.core#_png");

        // the wire carries exactly the documented ping bytes
        let mut buf = [0u8; 15];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(
            buf,
            [
                0x03, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x10, 0x00, 0x04, 0x11, b'_', b'p',
                b'n', b'g'
            ]
        );

        dispatcher.handle_inbound(&reply_bytes(0, "bcs.core", "_png", &[]));
        let reply = pending.wait().await.unwrap();
        assert!(reply.is_empty());
    }

    #[tokio::test]
    async fn test_fifo_correlation_of_identical_calls() {
        let (dispatcher, _server) = test_dispatcher(500);
        let counting = NamespaceContribution::new("bcs.io").rpc(
            "gchc",
            Method::Get,
            Method::Status,
            empty_builder("gchc"),
            StdArc::new(|range: &ByteRange<'_>| {
                Ok(RpcReply::new().with("channel_count", range.to_int()?))
            }),
        );
        dispatcher.import_namespace(counting).unwrap();
        dispatcher.register_namespace_id(1, "bcs.io");

        let first = dispatcher.defer("bcs.io", "gchc", None, &[]).await.unwrap();
        let second = dispatcher.defer("bcs.io", "gchc", None, &[]).await.unwrap();

        dispatcher.handle_inbound(&reply_bytes(1, "bcs.io", "gchc", &[0, 0, 0, 1]));
        dispatcher.handle_inbound(&reply_bytes(1, "bcs.io", "gchc", &[0, 0, 0, 2]));

        let r1 = first.wait().await.unwrap();
        let r2 = second.wait().await.unwrap();
        assert_eq!(r1.get("channel_count"), Some(&BowlerValue::Int32(1)));
        assert_eq!(r2.get("channel_count"), Some(&BowlerValue::Int32(2)));
    }

    #[tokio::test]
    async fn test_timeout_removes_listener() {
        let (dispatcher, _server) = test_dispatcher(20);

        let result = dispatcher.call("bcs.core", "_png", None, &[]).await;
        assert!(matches!(result, Err(BowlerError::Timeout(_))));

        // a late reply is spurious now, not delivered to anyone
        dispatcher.handle_inbound(&reply_bytes(0, "bcs.core", "_png", &[]));
    }

    #[tokio::test]
    async fn test_undefined_rpc_and_namespace() {
        let (dispatcher, _server) = test_dispatcher(500);

        assert!(matches!(
            dispatcher.call("bcs.core", "_xyz", None, &[]).await,
            Err(BowlerError::UndefinedRpc { .. })
        ));
        assert!(matches!(
            dispatcher.call("bcs.nope", "_png", None, &[]).await,
            Err(BowlerError::UndefinedNamespace(_))
        ));
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let (dispatcher, _server) = test_dispatcher(500);
        let result = dispatcher
            .call("bcs.core", "_png", Some(Method::Critical), &[])
            .await;
        assert!(matches!(
            result,
            Err(BowlerError::UnsupportedMethod {
                method: Method::Critical,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_close_fails_outstanding_and_future_calls() {
        let (dispatcher, _server) = test_dispatcher(5000);

        let pending = dispatcher.defer("bcs.core", "_png", None, &[]).await.unwrap();
        dispatcher.close();

        assert!(matches!(
            pending.wait().await,
            Err(BowlerError::TransportClosed)
        ));
        assert!(matches!(
            dispatcher.call("bcs.core", "_png", None, &[]).await,
            Err(BowlerError::TransportClosed)
        ));
    }

    #[tokio::test]
    async fn test_parse_error_reaches_the_caller() {
        let (dispatcher, _server) = test_dispatcher(500);
        let strict = NamespaceContribution::new("bcs.io").rpc(
            "gchv",
            Method::Get,
            Method::Status,
            empty_builder("gchv"),
            StdArc::new(|range: &ByteRange<'_>| {
                Ok(RpcReply::new().with("value", range.bytes(0, 3)?.to_int()?))
            }),
        );
        dispatcher.import_namespace(strict).unwrap();
        dispatcher.register_namespace_id(1, "bcs.io");

        let pending = dispatcher.defer("bcs.io", "gchv", None, &[]).await.unwrap();
        // two-byte body where the parser expects four
        dispatcher.handle_inbound(&reply_bytes(1, "bcs.io", "gchv", &[1, 2]));
        assert!(matches!(
            pending.wait().await,
            Err(BowlerError::TruncatedInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_subscribe_sees_async_traffic() {
        let (dispatcher, _server) = test_dispatcher(500);
        let io = NamespaceContribution::new("bcs.io").rpc(
            "asyn",
            Method::Get,
            Method::Async,
            empty_builder("asyn"),
            StdArc::new(|range: &ByteRange<'_>| {
                Ok(RpcReply::new()
                    .with("channel", BowlerValue::UInt8(range.byte(0)?))
                    .with("value", range.bytes(1, 4)?.to_int()?))
            }),
        );
        dispatcher.import_namespace(io).unwrap();
        dispatcher.register_namespace_id(1, "bcs.io");

        let mut events = dispatcher.subscribe(Method::Async, "bcs.io", "asyn");

        let mut ids = NamespaceIdTable::new();
        ids.insert(1, "bcs.io");
        let mut asm = PacketAssembler::new();
        asm.put_bytes(0, &[4, 0, 0, 0, 42]);
        let packet =
            assemble_packet(MacAddress::BROADCAST, Method::Async, "bcs.io", "asyn", &ids, asm)
                .unwrap();
        dispatcher.handle_inbound(&packet);

        let event = events.recv().await.unwrap();
        assert_eq!(event.rpc, "asyn");
        assert_eq!(event.reply.get("value"), Some(&BowlerValue::Int32(42)));
    }
}
