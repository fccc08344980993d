//! Namespace id table.
//!
//! Maps single-byte wire ids to dotted namespace names. The table starts
//! with `0 -> bcs.core`; introspection fills in the rest. A reverse map is
//! derived on demand and invalidated whenever the forward map changes.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::registry::strip_com;

/// Wire id to dotted-name mapping with a lazily derived reverse map.
#[derive(Debug)]
pub struct NamespaceIdTable {
    forward: HashMap<u8, String>,
    // None until the first reverse lookup after a mutation.
    reverse: RefCell<Option<HashMap<String, u8>>>,
}

impl NamespaceIdTable {
    /// New table seeded with the always-present core namespace.
    pub fn new() -> Self {
        let mut forward = HashMap::new();
        forward.insert(0u8, "bcs.core".to_string());
        Self {
            forward,
            reverse: RefCell::new(None),
        }
    }

    /// Record `id -> name`, stripping any leading `com.` component.
    ///
    /// Invalidates the cached reverse map.
    pub fn insert(&mut self, id: u8, name: &str) {
        self.forward.insert(id, strip_com(name).to_string());
        *self.reverse.borrow_mut() = None;
    }

    /// Dotted name for a wire id.
    pub fn name_of(&self, id: u8) -> Option<&str> {
        self.forward.get(&id).map(String::as_str)
    }

    /// Wire id for a dotted name, via the cached reverse map.
    pub fn id_of(&self, name: &str) -> Option<u8> {
        let name = strip_com(name);
        let mut cache = self.reverse.borrow_mut();
        let reverse = cache.get_or_insert_with(|| {
            self.forward
                .iter()
                .map(|(id, n)| (n.clone(), *id))
                .collect()
        });
        reverse.get(name).copied()
    }

    /// Whether a name is registered.
    pub fn contains_name(&self, name: &str) -> bool {
        self.id_of(name).is_some()
    }

    /// Number of registered ids.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Always at least the core entry.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Snapshot of (id, name) pairs sorted by id.
    pub fn entries(&self) -> Vec<(u8, String)> {
        let mut out: Vec<_> = self
            .forward
            .iter()
            .map(|(id, name)| (*id, name.clone()))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }
}

impl Default for NamespaceIdTable {
    fn default() -> Self {
        Self::new()
    }
}
