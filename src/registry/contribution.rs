//! Namespace contributions.
//!
//! A contribution is the static extension point: a root path plus builders,
//! parsers and method mappings keyed by RPC name. Single-method RPCs carry
//! one function per map slot; multi-method RPCs carry per-method maps
//! (builders by send method, parsers by receive method). The registry turns
//! a contribution into [`RpcEntry`] values on import.

use std::collections::{BTreeSet, HashMap};

use crate::error::{BowlerError, Result};
use crate::protocol::Method;
use crate::registry::entry::{empty_builder, empty_parser, BodyBuilder, BodyParser, RpcEntry};

/// Either one function for a single-method RPC or a per-method map.
pub enum MethodFns<F> {
    Single(F),
    PerMethod(HashMap<Method, F>),
}

/// A bundle of RPC definitions rooted at one dotted path.
pub struct NamespaceContribution {
    root: String,
    builders: HashMap<String, MethodFns<BodyBuilder>>,
    parsers: HashMap<String, MethodFns<BodyParser>>,
    send_methods: HashMap<String, Vec<Method>>,
    recv_methods: HashMap<String, HashMap<Method, Method>>,
}

impl NamespaceContribution {
    /// Empty contribution rooted at `root`.
    pub fn new(root: &str) -> Self {
        Self {
            root: root.to_string(),
            builders: HashMap::new(),
            parsers: HashMap::new(),
            send_methods: HashMap::new(),
            recv_methods: HashMap::new(),
        }
    }

    /// The dotted path this contribution merges at.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Define a single-method RPC.
    pub fn rpc(
        mut self,
        name: &str,
        send: Method,
        recv: Method,
        builder: BodyBuilder,
        parser: BodyParser,
    ) -> Self {
        self.builders
            .insert(name.to_string(), MethodFns::Single(builder));
        self.parsers
            .insert(name.to_string(), MethodFns::Single(parser));
        self.send_methods.insert(name.to_string(), vec![send]);
        self.recv_methods
            .insert(name.to_string(), HashMap::from([(send, recv)]));
        self
    }

    /// Define a multi-method RPC from (send, recv, builder, parser) arms.
    pub fn multi_rpc(
        mut self,
        name: &str,
        arms: Vec<(Method, Method, BodyBuilder, BodyParser)>,
    ) -> Self {
        let mut builders = HashMap::new();
        let mut parsers = HashMap::new();
        let mut sends = Vec::new();
        let mut recvs = HashMap::new();
        for (send, recv, builder, parser) in arms {
            builders.insert(send, builder);
            parsers.entry(recv).or_insert(parser);
            sends.push(send);
            recvs.insert(send, recv);
        }
        self.builders
            .insert(name.to_string(), MethodFns::PerMethod(builders));
        self.parsers
            .insert(name.to_string(), MethodFns::PerMethod(parsers));
        self.send_methods.insert(name.to_string(), sends);
        self.recv_methods.insert(name.to_string(), recvs);
        self
    }

    /// Validate the maps and produce entries for the registry merge.
    pub(crate) fn into_entries(self) -> Result<(String, HashMap<String, RpcEntry>)> {
        let Self {
            root,
            mut builders,
            mut parsers,
            send_methods,
            mut recv_methods,
        } = self;

        let mut entries = HashMap::new();
        for (name, sends) in send_methods {
            if sends.is_empty() {
                return Err(BowlerError::InvalidContribution(format!(
                    "{root}#{name} has an empty send set"
                )));
            }
            let recvs = recv_methods.remove(&name).unwrap_or_default();
            let builder_fns = builders.remove(&name);
            let parser_fns = parsers.remove(&name);

            // unanswered sends default to a status reply
            let recv_of = |send: Method| recvs.get(&send).copied().unwrap_or(Method::Status);

            let builder_of = |send: Method| -> Result<BodyBuilder> {
                match &builder_fns {
                    None => Ok(empty_builder(&name)),
                    Some(MethodFns::Single(f)) => Ok(f.clone()),
                    Some(MethodFns::PerMethod(map)) => map.get(&send).cloned().ok_or_else(|| {
                        BowlerError::InvalidContribution(format!(
                            "{root}#{name} has no builder for {send}"
                        ))
                    }),
                }
            };
            let parser_of = |recv: Method| -> Result<BodyParser> {
                match &parser_fns {
                    None => Ok(empty_parser()),
                    Some(MethodFns::Single(f)) => Ok(f.clone()),
                    Some(MethodFns::PerMethod(map)) => map.get(&recv).cloned().ok_or_else(|| {
                        BowlerError::InvalidContribution(format!(
                            "{root}#{name} has no parser for {recv}"
                        ))
                    }),
                }
            };

            let entry = if sends.len() == 1 {
                let send = sends[0];
                let recv = recv_of(send);
                RpcEntry::single(send, recv, builder_of(send)?, parser_of(recv)?)
            } else {
                let mut send_set = BTreeSet::new();
                let mut recv_map = HashMap::new();
                let mut builder_map = HashMap::new();
                let mut parser_map = HashMap::new();
                for &send in &sends {
                    let recv = recv_of(send);
                    send_set.insert(send);
                    recv_map.insert(send, recv);
                    builder_map.insert(send, builder_of(send)?);
                    parser_map.entry(recv).or_insert(parser_of(recv)?);
                }
                RpcEntry::Multi {
                    send_methods: send_set,
                    recv_methods: recv_map,
                    builders: builder_map,
                    parsers: parser_map,
                }
            };
            entries.insert(name, entry);
        }
        Ok((root, entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::codec::BowlerValue;
    use crate::registry::RpcReply;

    #[test]
    fn test_single_rpc_entry() {
        let contribution = NamespaceContribution::new("bcs.core").rpc(
            "_png",
            Method::Get,
            Method::Status,
            empty_builder("_png"),
            empty_parser(),
        );
        let (root, entries) = contribution.into_entries().unwrap();
        assert_eq!(root, "bcs.core");
        let entry = &entries["_png"];
        assert!(!entry.is_multi());
        assert_eq!(entry.recv_for(Method::Get), Some(Method::Status));
    }

    #[test]
    fn test_multi_rpc_entry() {
        let contribution = NamespaceContribution::new("neuronrobotics.dyio").multi_rpc(
            "_pwr",
            vec![
                (
                    Method::Get,
                    Method::Status,
                    empty_builder("_pwr"),
                    empty_parser(),
                ),
                (
                    Method::Critical,
                    Method::Status,
                    Arc::new(|args, asm| {
                        asm.put_value(0, &args[0])?;
                        Ok(())
                    }),
                    empty_parser(),
                ),
            ],
        );
        let (_, entries) = contribution.into_entries().unwrap();
        let entry = &entries["_pwr"];
        assert!(entry.is_multi());
        assert_eq!(entry.send_methods(), vec![Method::Get, Method::Critical]);
        assert!(entry.builder_for(Method::Critical).is_some());
        assert!(entry.builder_for(Method::Post).is_none());
    }

    #[test]
    fn test_missing_builder_and_parser_default() {
        let contribution = NamespaceContribution::new("bcs.core");
        let mut c = contribution;
        c.send_methods.insert("_png".into(), vec![Method::Get]);
        let (_, entries) = c.into_entries().unwrap();
        let entry = &entries["_png"];
        assert_eq!(entry.recv_for(Method::Get), Some(Method::Status));
        let parser = entry.parser_for_recv(Method::Status).unwrap();
        let body: [u8; 0] = [];
        let reply = parser(&crate::codec::ByteRange::full(&body)).unwrap();
        assert_eq!(reply, RpcReply::new());
    }

    #[test]
    fn test_empty_send_set_rejected() {
        let mut c = NamespaceContribution::new("bcs.core");
        c.send_methods.insert("_bad".into(), vec![]);
        assert!(matches!(
            c.into_entries(),
            Err(BowlerError::InvalidContribution(_))
        ));
    }

    #[test]
    fn test_builder_runs_against_assembler() {
        let contribution = NamespaceContribution::new("bcs.io").rpc(
            "schv",
            Method::Post,
            Method::Status,
            Arc::new(|args, asm| {
                let mut at = 0;
                for arg in args {
                    at += asm.put_value(at, arg)?;
                }
                Ok(())
            }),
            empty_parser(),
        );
        let (_, entries) = contribution.into_entries().unwrap();
        let builder = entries["schv"].builder_for(Method::Post).unwrap();

        let mut asm = crate::codec::PacketAssembler::new();
        builder(
            &[BowlerValue::UInt8(4), BowlerValue::Int32(256)],
            &mut asm,
        )
        .unwrap();
        assert_eq!(asm.assemble(), vec![4, 0, 0, 1, 0]);
    }
}
