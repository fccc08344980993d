//! Runtime discovery of namespaces and RPCs.
//!
//! The device is walked with the protocol's own meta-RPCs: `bcs.core._nms`
//! enumerates namespaces and fills the id table, then `bcs.rpc._rpc` and
//! `bcs.rpc.args` enumerate each namespace's RPCs with their declared type
//! rows. Codec entries are synthesized from the type codes for anything the
//! host has no hand-written contribution for; an RPC that already exists is
//! augmented with additional methods, never replaced.
//!
//! Both walks are single-flight: a dispatcher-wide guard serializes them,
//! and each step is one awaited round trip bounded by the per-call timeout.
//! The first failing step short-circuits the walk with its error.

use crate::codec::{BowlerType, BowlerValue};
use crate::dispatch::Dispatcher;
use crate::error::{BowlerError, Result};
use crate::protocol::Method;
use crate::registry::{typed_builder, typed_parser, BodyBuilder, BodyParser, RpcEntry, RpcReply};

/// Enumerate the device's namespaces and record their wire ids.
///
/// Returns the discovered names, index order.
pub async fn discover_namespaces(dispatcher: &Dispatcher) -> Result<Vec<String>> {
    let _guard = dispatcher.introspection_guard().await;

    let first = dispatcher
        .call("bcs.core", "_nms", None, &[BowlerValue::UInt8(0)])
        .await?;
    let count = field_u8(&first, "num_namespaces")?;
    let mut names = vec![field_str(&first, "name")?];
    dispatcher.register_namespace_id(0, &names[0]);

    for index in 1..count {
        let reply = dispatcher
            .call("bcs.core", "_nms", None, &[BowlerValue::UInt8(index)])
            .await?;
        let name = field_str(&reply, "name")?;
        dispatcher.register_namespace_id(index, &name);
        names.push(name);
    }

    dispatcher.bump_generation();
    tracing::debug!(count = names.len(), "namespace discovery complete");
    Ok(names)
}

/// Enumerate every namespace's RPCs and synthesize codec entries.
///
/// Requires the device to advertise `bcs.rpc`; run
/// [`discover_namespaces`] first so the id table is populated.
pub async fn discover_rpcs(dispatcher: &Dispatcher) -> Result<()> {
    let _guard = dispatcher.introspection_guard().await;

    if !dispatcher.advertises("bcs.rpc") {
        return Err(BowlerError::IntrospectionUnsupported);
    }

    for (ns_id, ns_name) in dispatcher.namespace_ids() {
        let mut index = 0u8;
        let mut total = 1u8;
        while index < total {
            let probe = [BowlerValue::UInt8(ns_id), BowlerValue::UInt8(index)];
            let rpc_reply = dispatcher.call("bcs.rpc", "_rpc", None, &probe).await?;
            total = field_u8(&rpc_reply, "num_rpcs")?;
            if total == 0 {
                break;
            }
            let rpc_name = field_str(&rpc_reply, "name")?;

            let args_reply = dispatcher.call("bcs.rpc", "args", None, &probe).await?;
            let send_method = Method::from_code(field_u8(&args_reply, "send_method")?)?;
            let recv_method = Method::from_code(field_u8(&args_reply, "recv_method")?)?;
            let send_types = type_row(&args_reply, "send_types")?;
            let recv_types = type_row(&args_reply, "recv_types")?;

            let installed = install(
                dispatcher,
                &ns_name,
                &rpc_name,
                send_method,
                recv_method,
                send_types,
                recv_types,
            );
            tracing::debug!(
                namespace = %ns_name,
                rpc = %rpc_name,
                %send_method,
                installed,
                "rpc discovered"
            );
            index += 1;
        }
    }
    Ok(())
}

/// Generic builder/parser pair for a declared pair of type rows.
pub fn synthesize(
    rpc: &str,
    send_types: Vec<BowlerType>,
    recv_types: Vec<BowlerType>,
) -> (BodyBuilder, BodyParser) {
    let builder = typed_builder(rpc, send_types);
    let parser = typed_parser(
        recv_types
            .into_iter()
            .enumerate()
            .map(|(i, ty)| (format!("arg{i}"), ty))
            .collect(),
    );
    (builder, parser)
}

/// Install a discovered RPC, augmenting an existing entry in place.
///
/// Returns whether a new entry was created.
fn install(
    dispatcher: &Dispatcher,
    namespace: &str,
    rpc: &str,
    send: Method,
    recv: Method,
    send_types: Vec<BowlerType>,
    recv_types: Vec<BowlerType>,
) -> bool {
    let (builder, parser) = synthesize(rpc, send_types, recv_types);
    dispatcher.with_registry_mut(|registry| {
        if let Some(entry) = registry.augment_rpc(namespace, rpc) {
            entry.add_method(send, recv, builder, parser);
            false
        } else {
            registry.insert_rpc(namespace, rpc, RpcEntry::single(send, recv, builder, parser))
        }
    })
}

fn field_u8(reply: &RpcReply, name: &str) -> Result<u8> {
    reply
        .get(name)
        .and_then(BowlerValue::as_u8)
        .ok_or_else(|| {
            BowlerError::ValueOutOfRange(format!("discovery reply is missing byte field {name}"))
        })
}

fn field_str(reply: &RpcReply, name: &str) -> Result<String> {
    reply
        .get(name)
        .and_then(BowlerValue::as_str)
        .map(String::from)
        .ok_or_else(|| {
            BowlerError::ValueOutOfRange(format!("discovery reply is missing string field {name}"))
        })
}

fn type_row(reply: &RpcReply, name: &str) -> Result<Vec<BowlerType>> {
    let codes = reply.get(name).and_then(BowlerValue::as_bytes).ok_or_else(|| {
        BowlerError::ValueOutOfRange(format!("discovery reply is missing type row {name}"))
    })?;
    codes.iter().map(|&c| BowlerType::from_code(c)).collect()
}
