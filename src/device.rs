//! Device builder and runtime loops.
//!
//! [`Device::connect`] wires a transport to the dispatcher and manages the
//! lifecycle:
//! 1. Open the transport and split it
//! 2. Spawn the writer task and the framing read loop
//! 3. Import the built-in `bcs.core` / `bcs.rpc` contributions
//! 4. Optionally introspect namespaces and RPCs
//! 5. Start the heartbeat and resync device state
//!
//! # Example
//!
//! ```ignore
//! use bowler_client::{Device, DeviceOptions};
//! use bowler_client::transport::StreamTransport;
//!
//! let device = Device::connect(StreamTransport::new(serial), DeviceOptions::default()).await?;
//! device.supports_namespace(bowler_client::namespaces::dyio::contribution())?;
//! let reply = device.command_to().at("bcs.core").rpc("_png").call(&[]).await?;
//! ```

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::dispatch::{spawn_writer_task, CommandHandle, Dispatcher, RpcEvent};
use crate::error::{BowlerError, Result};
use crate::introspect;
use crate::namespaces;
use crate::protocol::{FrameBuffer, MacAddress, Method};
use crate::registry::{Catalog, NamespaceContribution};
use crate::transport::Transport;

/// Connection options.
#[derive(Debug, Clone)]
pub struct DeviceOptions {
    /// Walk `_nms` at connect time to fill the namespace id table.
    pub introspect_namespaces: bool,
    /// Walk `_rpc`/`args` at connect time to synthesize codec entries.
    pub introspect_rpcs: bool,
    /// Period of the background `bcs.core._png`; `None` disables it.
    pub heartbeat: Option<Duration>,
    /// Per-call reply timeout.
    pub request_timeout: Duration,
    /// Target address for outbound packets.
    pub mac: MacAddress,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            introspect_namespaces: true,
            introspect_rpcs: false,
            heartbeat: Some(Duration::from_millis(3000)),
            request_timeout: Duration::from_millis(2000),
            mac: MacAddress::BROADCAST,
        }
    }
}

/// A connected Bowler device.
pub struct Device {
    dispatcher: Dispatcher,
    root: CommandHandle,
    read_task: JoinHandle<()>,
    writer_task: JoinHandle<Result<()>>,
    heartbeat_task: Option<JoinHandle<()>>,
}

impl Device {
    /// Open the transport and bring the device up.
    pub async fn connect<T: Transport>(transport: T, options: DeviceOptions) -> Result<Self> {
        let stream = transport.open().await?;
        let (reader, writer) = tokio::io::split(stream);

        let (writer_handle, writer_task) = spawn_writer_task(writer);
        let dispatcher = Dispatcher::new(writer_handle, options.request_timeout, options.mac);
        dispatcher.import_namespace(namespaces::core::contribution())?;
        dispatcher.import_namespace(namespaces::rpc::contribution())?;

        let read_task = tokio::spawn(read_loop(reader, dispatcher.clone()));

        if options.introspect_namespaces {
            introspect::discover_namespaces(&dispatcher).await?;
        }
        if options.introspect_rpcs {
            introspect::discover_rpcs(&dispatcher).await?;
        }

        let heartbeat_task = options
            .heartbeat
            .map(|period| tokio::spawn(heartbeat_loop(dispatcher.clone(), period)));

        let device = Self {
            root: CommandHandle::root(dispatcher.clone()),
            dispatcher,
            read_task,
            writer_task,
            heartbeat_task,
        };
        device.resync().await;
        Ok(device)
    }

    /// Root of the navigable command tree.
    pub fn command_to(&self) -> CommandHandle {
        self.root.clone()
    }

    /// Merge a statically-provided namespace contribution.
    pub fn supports_namespace(&self, contribution: NamespaceContribution) -> Result<()> {
        self.dispatcher.import_namespace(contribution)
    }

    /// Persistent stream of events on one (method, namespace, rpc) key.
    pub fn subscribe(
        &self,
        method: Method,
        namespace: &str,
        rpc: &str,
    ) -> mpsc::UnboundedReceiver<RpcEvent> {
        self.dispatcher.subscribe(method, namespace, rpc)
    }

    /// The dispatcher, for callers that want raw access.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Snapshot of the registry and id table.
    pub fn catalog(&self) -> Catalog {
        self.dispatcher.catalog()
    }

    /// The catalog as pretty JSON, for logging what the device advertises.
    pub fn catalog_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.catalog())?)
    }

    /// Refresh device-level state: power, revision, identity.
    ///
    /// Each probe is skipped when its namespace is not registered or not
    /// advertised; a timeout is logged rather than fatal.
    pub async fn resync(&self) {
        for (namespace, rpc) in [
            ("neuronrobotics.dyio", "_pwr"),
            ("neuronrobotics.dyio", "_rev"),
            ("neuronrobotics.dyio", "info"),
        ] {
            if !self.dispatcher.has_rpc(namespace, rpc) || !self.dispatcher.advertises(namespace) {
                continue;
            }
            match self
                .dispatcher
                .call(namespace, rpc, Some(Method::Get), &[])
                .await
            {
                Ok(reply) => tracing::debug!(%namespace, %rpc, ?reply, "resync"),
                Err(e) => tracing::warn!(%namespace, %rpc, error = %e, "resync probe failed"),
            }
        }
    }

    /// Block until the transport closes.
    pub async fn wait_for_shutdown(self) -> Result<()> {
        let _ = self.read_task.await;
        if let Some(heartbeat) = self.heartbeat_task {
            heartbeat.abort();
        }
        self.writer_task.abort();
        Ok(())
    }

    /// Tear the connection down.
    pub async fn shutdown(self) {
        if let Some(heartbeat) = self.heartbeat_task {
            heartbeat.abort();
        }
        self.read_task.abort();
        self.writer_task.abort();
        self.dispatcher.close();
    }
}

/// Feed the framing buffer from the read half and deliver packets.
async fn read_loop<R: AsyncRead + Unpin>(mut reader: R, dispatcher: Dispatcher) {
    let mut frames = FrameBuffer::new();
    let mut buf = vec![0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let result = frames.push(&buf[..n]);
                for error in result.errors {
                    tracing::warn!(%error, "resynchronizing input stream");
                }
                for packet in result.packets {
                    dispatcher.handle_inbound(&packet);
                }
            }
            Err(error) => {
                tracing::error!(%error, "transport read failed");
                break;
            }
        }
    }
    dispatcher.close();
}

/// Periodic `bcs.core._png` until the transport dies.
async fn heartbeat_loop(dispatcher: Dispatcher, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval.tick().await; // the first tick completes immediately
    loop {
        interval.tick().await;
        match dispatcher.call("bcs.core", "_png", None, &[]).await {
            Ok(_) => tracing::trace!("heartbeat"),
            Err(BowlerError::TransportClosed) => break,
            Err(error) => tracing::warn!(%error, "heartbeat missed"),
        }
    }
}
