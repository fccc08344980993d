//! Serializable registry snapshot.
//!
//! After introspection a host usually wants to see what the device
//! advertises; the catalog is that picture, flattened for JSON dumps.

use serde::Serialize;

use crate::protocol::Method;
use crate::registry::{NamespaceIdTable, NamespaceRegistry};

/// One RPC as the registry knows it.
#[derive(Debug, Clone, Serialize)]
pub struct RpcInfo {
    pub name: String,
    pub send_methods: Vec<Method>,
    /// (send, recv) pairs, one per send method.
    pub recv_methods: Vec<(Method, Method)>,
    pub multi_method: bool,
}

/// One namespace with its wire id, when the device has assigned one.
#[derive(Debug, Clone, Serialize)]
pub struct NamespaceInfo {
    pub name: String,
    pub id: Option<u8>,
    pub rpcs: Vec<RpcInfo>,
}

/// Snapshot of every registered namespace and RPC.
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    pub namespaces: Vec<NamespaceInfo>,
}

impl Catalog {
    /// Build a catalog from the registry and id table.
    pub fn build(registry: &NamespaceRegistry, ids: &NamespaceIdTable) -> Self {
        let namespaces = registry
            .namespace_paths()
            .into_iter()
            .map(|path| {
                let node = registry.resolve(&path).expect("path came from the trie");
                let rpcs = node
                    .rpc_names()
                    .into_iter()
                    .map(|name| {
                        let entry = node.rpc(name).expect("name came from the node");
                        let send_methods = entry.send_methods();
                        let recv_methods = send_methods
                            .iter()
                            .filter_map(|&m| entry.recv_for(m).map(|r| (m, r)))
                            .collect();
                        RpcInfo {
                            name: name.to_string(),
                            send_methods,
                            recv_methods,
                            multi_method: entry.is_multi(),
                        }
                    })
                    .collect();
                NamespaceInfo {
                    id: ids.id_of(&path),
                    name: path,
                    rpcs,
                }
            })
            .collect();
        Self { namespaces }
    }
}
