//! Registry module - namespace trie, RPC entries, id table.
//!
//! Provides:
//! - [`NamespaceRegistry`] - trie of nodes mapping dotted paths to RPC sets
//! - [`RpcEntry`] - single- or multi-method codec bindings for one RPC
//! - [`NamespaceIdTable`] - wire id to dotted name mapping
//! - [`NamespaceContribution`] - the static extension point modules ship
//!
//! Namespace names never carry a leading `com.` component internally; it is
//! stripped on input and skipped during trie traversal.

mod catalog;
mod contribution;
mod entry;
mod id_table;
mod reply;
mod trie;

pub use catalog::{Catalog, NamespaceInfo, RpcInfo};
pub use contribution::{MethodFns, NamespaceContribution};
pub use entry::{
    empty_builder, empty_parser, typed_builder, typed_parser, BodyBuilder, BodyParser, RpcEntry,
};
pub use id_table::NamespaceIdTable;
pub use reply::RpcReply;
pub use trie::{NamespaceRegistry, RegistryNode};

/// Strip a leading `com.` component from a dotted name.
pub(crate) fn strip_com(name: &str) -> &str {
    name.strip_prefix("com.").unwrap_or(name)
}
