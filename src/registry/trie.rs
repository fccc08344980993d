//! Namespace trie.
//!
//! Registry nodes are keyed by dot segments; leaves hold RPC entries.
//! Contributions merge into the trie at their root path, and an existing
//! entry always wins a leaf collision so a base module can be layered under
//! overrides. Lookup skips a lone `com` segment.

use std::collections::HashMap;

use crate::error::{BowlerError, Result};
use crate::registry::contribution::NamespaceContribution;
use crate::registry::entry::RpcEntry;
use crate::registry::strip_com;

/// One trie node: child namespaces plus the RPCs defined at this path.
#[derive(Default)]
pub struct RegistryNode {
    children: HashMap<String, RegistryNode>,
    rpcs: HashMap<String, RpcEntry>,
}

impl RegistryNode {
    /// Child segment names, sorted.
    pub fn child_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.children.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// RPC names at this node, sorted.
    pub fn rpc_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.rpcs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Entry for an RPC at this node.
    pub fn rpc(&self, name: &str) -> Option<&RpcEntry> {
        self.rpcs.get(name)
    }

    fn walk(&self, path: &str) -> Option<&RegistryNode> {
        let mut node = self;
        for segment in path.split('.').filter(|s| !s.is_empty() && *s != "com") {
            node = node.children.get(segment)?;
        }
        Some(node)
    }

    fn walk_or_create(&mut self, path: &str) -> &mut RegistryNode {
        let mut node = self;
        for segment in path.split('.').filter(|s| !s.is_empty() && *s != "com") {
            node = node.children.entry(segment.to_string()).or_default();
        }
        node
    }

    fn collect_paths(&self, prefix: &str, out: &mut Vec<String>) {
        if !self.rpcs.is_empty() {
            out.push(prefix.to_string());
        }
        let mut names: Vec<_> = self.children.keys().collect();
        names.sort_unstable();
        for name in names {
            let child_prefix = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            self.children[name].collect_paths(&child_prefix, out);
        }
    }
}

/// The namespace registry: a trie of [`RegistryNode`]s.
#[derive(Default)]
pub struct NamespaceRegistry {
    root: RegistryNode,
}

impl NamespaceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a contribution at its root path.
    ///
    /// The merge recurses through the trie; on a leaf collision the entry
    /// already present wins.
    pub fn import_namespace(&mut self, contribution: NamespaceContribution) -> Result<()> {
        let (root, entries) = contribution.into_entries()?;
        let node = self.root.walk_or_create(strip_com(&root));
        for (name, entry) in entries {
            node.rpcs.entry(name).or_insert(entry);
        }
        Ok(())
    }

    /// Node at a dotted path. The empty path is the root.
    pub fn resolve(&self, path: &str) -> Result<&RegistryNode> {
        self.root
            .walk(path)
            .ok_or_else(|| BowlerError::UndefinedNamespace(strip_com(path).to_string()))
    }

    /// Entry for an RPC under a dotted path.
    pub fn resolve_rpc(&self, path: &str, rpc: &str) -> Result<&RpcEntry> {
        self.resolve(path)?
            .rpc(rpc)
            .ok_or_else(|| BowlerError::UndefinedRpc {
                namespace: strip_com(path).to_string(),
                rpc: rpc.to_string(),
            })
    }

    /// Insert an entry only when the RPC is not already present.
    ///
    /// Returns whether the entry was inserted. Introspection uses this for
    /// newly discovered RPCs and [`augment_rpc`](Self::augment_rpc) when a
    /// name is already bound.
    pub fn insert_rpc(&mut self, path: &str, rpc: &str, entry: RpcEntry) -> bool {
        let node = self.root.walk_or_create(strip_com(path));
        if node.rpcs.contains_key(rpc) {
            return false;
        }
        node.rpcs.insert(rpc.to_string(), entry);
        true
    }

    /// Mutably borrow an existing entry for promotion or augmentation.
    pub fn augment_rpc(&mut self, path: &str, rpc: &str) -> Option<&mut RpcEntry> {
        let mut node = &mut self.root;
        for segment in strip_com(path)
            .split('.')
            .filter(|s| !s.is_empty() && *s != "com")
        {
            node = node.children.get_mut(segment)?;
        }
        node.rpcs.get_mut(rpc)
    }

    /// Dotted paths of every node that defines at least one RPC, sorted.
    pub fn namespace_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.root.collect_paths("", &mut out);
        out
    }
}
