//! # bowler-client
//!
//! Rust client SDK for the Bowler RPC protocol, the framed request/response
//! protocol spoken by the NeuronRobotics DyIO and related devices over a
//! serial byte stream.
//!
//! ## Architecture
//!
//! - **codec**: the ten typed wire values, byte-range readers, deferred
//!   packet assembly
//! - **protocol**: the 15-byte packet prefix, checksums, and the framing
//!   buffer that carves packets out of the raw stream
//! - **registry**: a trie of namespaces binding RPC names to builder/parser
//!   pairs per method, plus the wire id table
//! - **dispatch**: ordered outbound writes and FIFO response correlation by
//!   `"<method>:<namespace>#<rpc>"` key (the wire has no correlation id)
//! - **introspect**: runtime discovery of namespaces and RPCs via the
//!   protocol's own `_nms`/`_rpc`/`args` meta-RPCs
//!
//! ## Example
//!
//! ```ignore
//! use bowler_client::{Device, DeviceOptions};
//! use bowler_client::transport::StreamTransport;
//!
//! #[tokio::main]
//! async fn main() -> bowler_client::Result<()> {
//!     let device = Device::connect(
//!         StreamTransport::new(serial_stream),
//!         DeviceOptions::default(),
//!     )
//!     .await?;
//!     device.supports_namespace(bowler_client::namespaces::dyio::contribution())?;
//!
//!     let power = device.command_to().at("neuronrobotics.dyio").rpc("_pwr");
//!     power.critical().call(&[true.into()]).await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod introspect;
pub mod namespaces;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use codec::{BowlerType, BowlerValue};
pub use device::{Device, DeviceOptions};
pub use dispatch::{CommandHandle, Dispatcher, PendingReply, RpcEvent, RpcHandle};
pub use error::{BowlerError, Result};
pub use protocol::{MacAddress, Method};
pub use registry::{NamespaceContribution, RpcReply};
