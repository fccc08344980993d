//! `bcs.rpc` - the RPC discovery meta-namespace.
//!
//! `_rpc` enumerates RPC names per namespace index; `args` reports the send
//! and receive method plus the argument type rows the device declares for
//! one RPC. The introspector walks both to synthesize codec entries.

use std::sync::Arc;

use crate::codec::BowlerType;
use crate::protocol::Method;
use crate::registry::{typed_builder, BodyParser, NamespaceContribution, RpcReply};

/// Parse the `_rpc` reply: namespace index, rpc index, total rpc count,
/// then the 4-byte zero-padded RPC name.
fn rpc_parser() -> BodyParser {
    Arc::new(|range: &crate::codec::ByteRange<'_>| {
        let name: String = range
            .bytes(3, 6)?
            .as_slice()
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect();
        Ok(RpcReply::new()
            .with("namespace_idx", range.byte(0)?.into())
            .with("rpc_idx", range.byte(1)?.into())
            .with("num_rpcs", range.byte(2)?.into())
            .with("name", name.into()))
    })
}

/// Parse the `args` reply: namespace index, rpc index, then the send method
/// byte with its type-code row and the receive method byte with its row.
fn args_parser() -> BodyParser {
    Arc::new(|range: &crate::codec::ByteRange<'_>| {
        let mut at = 2;
        let send_method = range.byte(at)?;
        let (send_types, used) = range.bytes(at + 1, range.len() - 1)?.to_uint8_array()?;
        at += 1 + used;
        let recv_method = range.byte(at)?;
        let (recv_types, _) = range.bytes(at + 1, range.len() - 1)?.to_uint8_array()?;

        Ok(RpcReply::new()
            .with("namespace_idx", range.byte(0)?.into())
            .with("rpc_idx", range.byte(1)?.into())
            .with("send_method", send_method.into())
            .with("send_types", send_types.into())
            .with("recv_method", recv_method.into())
            .with("recv_types", recv_types.into()))
    })
}

/// The discovery contribution; present on devices that support RPC
/// introspection.
pub fn contribution() -> NamespaceContribution {
    let index_pair = |rpc| typed_builder(rpc, vec![BowlerType::UInt8, BowlerType::UInt8]);
    NamespaceContribution::new("bcs.rpc")
        .rpc(
            "_rpc",
            Method::Get,
            Method::Status,
            index_pair("_rpc"),
            rpc_parser(),
        )
        .rpc(
            "args",
            Method::Get,
            Method::Status,
            index_pair("args"),
            args_parser(),
        )
}
