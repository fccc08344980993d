//! Error types for bowler-client.

use thiserror::Error;

use crate::protocol::Method;

/// Main error type for all Bowler operations.
#[derive(Debug, Error)]
pub enum BowlerError {
    /// I/O error on the underlying byte channel.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A wire type code outside the declared code set.
    #[error("unknown type code {0:#04x}")]
    UnknownTypeCode(u8),

    /// A read ran past the end of the available bytes.
    #[error("truncated input: needed {needed} bytes, {available} available")]
    TruncatedInput { needed: usize, available: usize },

    /// A write would run past the end of the destination buffer.
    #[error("insufficient space: needed {needed} bytes, {available} available")]
    InsufficientSpace { needed: usize, available: usize },

    /// A value cannot be represented on the wire.
    #[error("value out of range: {0}")]
    ValueOutOfRange(String),

    /// String bytes do not decode under the requested encoding.
    #[error("invalid string encoding: {0}")]
    InvalidEncoding(String),

    /// The byte stream cannot be carved into a packet at this position.
    #[error("framing error: {0}")]
    Framing(String),

    /// Protocol version byte other than 3.
    #[error("bad protocol version {0}")]
    BadVersion(u8),

    /// Header checksum mismatch.
    #[error("bad checksum: header says {expected:#04x}, computed {computed:#04x}")]
    BadChecksum { expected: u8, computed: u8 },

    /// Namespace id with no entry in the id table.
    #[error("unknown namespace id {0:#04x}")]
    UnknownNamespaceId(u8),

    /// Namespace path that does not resolve in the registry.
    #[error("undefined namespace: {0}")]
    UndefinedNamespace(String),

    /// RPC name missing from its namespace.
    #[error("undefined RPC: {namespace}#{rpc}")]
    UndefinedRpc { namespace: String, rpc: String },

    /// Method outside the RPC's send set.
    #[error("method {method} not supported by {namespace}#{rpc}")]
    UnsupportedMethod {
        namespace: String,
        rpc: String,
        method: Method,
    },

    /// Positional argument count does not match the builder's arity.
    #[error("{rpc} expects {expected} argument(s), got {got}")]
    ArgumentCount {
        rpc: String,
        expected: usize,
        got: usize,
    },

    /// No reply arrived within the per-call timeout.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// The byte channel is gone; no further calls can complete.
    #[error("transport closed")]
    TransportClosed,

    /// A reply arrived with no listener registered for its key.
    #[error("spurious reply for {0}")]
    SpuriousReply(String),

    /// RPC discovery was requested but the device does not advertise bcs.rpc.
    #[error("device does not support RPC introspection")]
    IntrospectionUnsupported,

    /// A namespace contribution whose maps do not line up.
    #[error("invalid namespace contribution: {0}")]
    InvalidContribution(String),

    /// Catalog serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using BowlerError.
pub type Result<T> = std::result::Result<T, BowlerError>;
