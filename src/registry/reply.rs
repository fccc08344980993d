//! Decoded RPC replies.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::codec::BowlerValue;

/// A parsed response body: named fields in wire order.
///
/// Fields are addressable both positionally and by name, matching the shape
/// parsers produce for hand-written and introspection-generated RPCs alike.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpcReply {
    fields: Vec<(String, BowlerValue)>,
}

impl RpcReply {
    /// Empty reply, the decoding of a zero-byte body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a named field.
    pub fn push(&mut self, name: impl Into<String>, value: BowlerValue) {
        self.fields.push((name.into(), value));
    }

    /// Builder-style append.
    pub fn with(mut self, name: impl Into<String>, value: BowlerValue) -> Self {
        self.push(name, value);
        self
    }

    /// Field by name; first match wins.
    pub fn get(&self, name: &str) -> Option<&BowlerValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Field by wire position.
    pub fn index(&self, i: usize) -> Option<&BowlerValue> {
        self.fields.get(i).map(|(_, v)| v)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the reply carries no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BowlerValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl Serialize for RpcReply {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_and_named_access() {
        let reply = RpcReply::new()
            .with("channel", BowlerValue::UInt8(4))
            .with("value", BowlerValue::Int32(-100));

        assert_eq!(reply.len(), 2);
        assert_eq!(reply.get("value"), Some(&BowlerValue::Int32(-100)));
        assert_eq!(reply.index(0), Some(&BowlerValue::UInt8(4)));
        assert_eq!(reply.get("missing"), None);
        assert_eq!(reply.index(2), None);
    }

    #[test]
    fn test_empty_reply() {
        let reply = RpcReply::new();
        assert!(reply.is_empty());
        assert_eq!(serde_json::to_string(&reply).unwrap(), "{}");
    }

    #[test]
    fn test_serializes_as_map() {
        let reply = RpcReply::new()
            .with("name", BowlerValue::Str("bcs.core".into()))
            .with("num_namespaces", BowlerValue::UInt8(1));
        let json = serde_json::to_string(&reply).unwrap();
        assert_eq!(json, r#"{"name":"bcs.core","num_namespaces":1}"#);
    }
}
