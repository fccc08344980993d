//! `bcs.core` - ping, namespace enumeration, firmware revision.

use std::sync::Arc;

use crate::codec::{BowlerType, StringEncoding};
use crate::error::BowlerError;
use crate::protocol::Method;
use crate::registry::{
    empty_builder, empty_parser, typed_builder, typed_parser, BodyParser, NamespaceContribution,
    RpcReply,
};

/// Parse the `_nms` composite reply: `"name;version\0"` then the total
/// namespace count byte.
fn nms_parser() -> BodyParser {
    Arc::new(|range: &crate::codec::ByteRange<'_>| {
        let (composite, used) = range.to_string(StringEncoding::Ascii)?;
        let (name, version) = composite.split_once(';').ok_or_else(|| {
            BowlerError::InvalidEncoding(format!(
                "namespace reply {composite:?} is missing the ';' separator"
            ))
        })?;
        let count = range.byte(used)?;
        Ok(RpcReply::new()
            .with("name", name.into())
            .with("version_str", version.into())
            .with("num_namespaces", count.into()))
    })
}

/// The core contribution every device speaks.
pub fn contribution() -> NamespaceContribution {
    NamespaceContribution::new("bcs.core")
        .rpc(
            "_png",
            Method::Get,
            Method::Status,
            empty_builder("_png"),
            empty_parser(),
        )
        .rpc(
            "_nms",
            Method::Get,
            Method::Status,
            typed_builder("_nms", vec![BowlerType::UInt8]),
            nms_parser(),
        )
        .rpc(
            "_rev",
            Method::Get,
            Method::Status,
            empty_builder("_rev"),
            typed_parser(vec![
                ("major", BowlerType::UInt8),
                ("minor", BowlerType::UInt8),
                ("revision", BowlerType::UInt8),
            ]),
        )
}
