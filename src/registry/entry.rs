//! RPC entries: builder/parser pairs keyed by method.
//!
//! An entry starts life single-method. When a second send method appears
//! (layered contributions, or introspection discovering another verb) the
//! entry is promoted to the multi-method form, whose builders are keyed by
//! send method and parsers by receive method.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::codec::{BowlerValue, ByteRange, PacketAssembler};
use crate::error::{BowlerError, Result};
use crate::protocol::Method;
use crate::registry::RpcReply;

/// Fills a body assembler from positional arguments.
pub type BodyBuilder =
    Arc<dyn Fn(&[BowlerValue], &mut PacketAssembler) -> Result<()> + Send + Sync>;

/// Decodes a response body into a structured reply.
pub type BodyParser = Arc<dyn for<'a> Fn(&ByteRange<'a>) -> Result<RpcReply> + Send + Sync>;

/// Builder that accepts no arguments and writes nothing.
pub fn empty_builder(rpc: &str) -> BodyBuilder {
    let rpc = rpc.to_string();
    Arc::new(move |args, _| {
        if args.is_empty() {
            Ok(())
        } else {
            Err(BowlerError::ArgumentCount {
                rpc: rpc.clone(),
                expected: 0,
                got: args.len(),
            })
        }
    })
}

/// Parser for empty bodies.
pub fn empty_parser() -> BodyParser {
    Arc::new(|_: &ByteRange<'_>| Ok(RpcReply::new()))
}

/// Builder serializing positional arguments against a declared type row.
///
/// Arity must match exactly; arguments are coerced to the declared types,
/// so an `Int32(1)` argument satisfies a UInt8 slot.
pub fn typed_builder(rpc: &str, types: Vec<crate::codec::BowlerType>) -> BodyBuilder {
    let rpc = rpc.to_string();
    Arc::new(move |args, asm| {
        if args.len() != types.len() {
            return Err(BowlerError::ArgumentCount {
                rpc: rpc.clone(),
                expected: types.len(),
                got: args.len(),
            });
        }
        let mut at = 0;
        for (arg, ty) in args.iter().zip(&types) {
            at += asm.put_value(at, &arg.conform(*ty)?)?;
        }
        Ok(())
    })
}

/// Parser deserializing a declared type row into named fields, in order.
pub fn typed_parser<S: Into<String>>(fields: Vec<(S, crate::codec::BowlerType)>) -> BodyParser {
    let fields: Vec<(String, crate::codec::BowlerType)> =
        fields.into_iter().map(|(n, t)| (n.into(), t)).collect();
    Arc::new(move |range: &ByteRange<'_>| {
        let mut reply = RpcReply::new();
        let mut at = 0;
        for (name, ty) in &fields {
            let (value, used) =
                range.value_at(at, *ty, crate::codec::StringEncoding::Ascii)?;
            reply.push(name.clone(), value);
            at += used;
        }
        Ok(reply)
    })
}

/// Codec bindings for one (namespace, rpc) pair.
#[derive(Clone)]
pub enum RpcEntry {
    /// One send method, one receive method, one builder/parser pair.
    Single {
        method: Method,
        recv_method: Method,
        builder: BodyBuilder,
        parser: BodyParser,
    },
    /// Builders keyed by send method, parsers keyed by receive method.
    Multi {
        send_methods: BTreeSet<Method>,
        recv_methods: HashMap<Method, Method>,
        builders: HashMap<Method, BodyBuilder>,
        parsers: HashMap<Method, BodyParser>,
    },
}

impl RpcEntry {
    /// Single-method entry.
    pub fn single(
        method: Method,
        recv_method: Method,
        builder: BodyBuilder,
        parser: BodyParser,
    ) -> Self {
        RpcEntry::Single {
            method,
            recv_method,
            builder,
            parser,
        }
    }

    /// Whether `method` is in the send set.
    pub fn supports(&self, method: Method) -> bool {
        match self {
            RpcEntry::Single { method: m, .. } => *m == method,
            RpcEntry::Multi { send_methods, .. } => send_methods.contains(&method),
        }
    }

    /// Send methods in method-byte order.
    pub fn send_methods(&self) -> Vec<Method> {
        match self {
            RpcEntry::Single { method, .. } => vec![*method],
            RpcEntry::Multi { send_methods, .. } => send_methods.iter().copied().collect(),
        }
    }

    /// The method used when a call does not disambiguate.
    pub fn default_method(&self) -> Method {
        match self {
            RpcEntry::Single { method, .. } => *method,
            RpcEntry::Multi { send_methods, .. } => {
                *send_methods.iter().next().expect("send set is non-empty")
            }
        }
    }

    /// Whether more than one send method is registered.
    pub fn is_multi(&self) -> bool {
        matches!(self, RpcEntry::Multi { .. })
    }

    /// Receive method paired with a send method.
    pub fn recv_for(&self, method: Method) -> Option<Method> {
        match self {
            RpcEntry::Single {
                method: m,
                recv_method,
                ..
            } => (*m == method).then_some(*recv_method),
            RpcEntry::Multi { recv_methods, .. } => recv_methods.get(&method).copied(),
        }
    }

    /// Builder for a send method.
    pub fn builder_for(&self, method: Method) -> Option<BodyBuilder> {
        match self {
            RpcEntry::Single {
                method: m, builder, ..
            } => (*m == method).then(|| builder.clone()),
            RpcEntry::Multi { builders, .. } => builders.get(&method).cloned(),
        }
    }

    /// Parser for the method an inbound packet carries.
    pub fn parser_for_recv(&self, recv_method: Method) -> Option<BodyParser> {
        match self {
            RpcEntry::Single {
                recv_method: r,
                parser,
                ..
            } => (*r == recv_method).then(|| parser.clone()),
            RpcEntry::Multi { parsers, .. } => parsers.get(&recv_method).cloned(),
        }
    }

    /// Promote a single-method entry to the multi-method form.
    pub fn promote(self) -> Self {
        match self {
            RpcEntry::Single {
                method,
                recv_method,
                builder,
                parser,
            } => RpcEntry::Multi {
                send_methods: BTreeSet::from([method]),
                recv_methods: HashMap::from([(method, recv_method)]),
                builders: HashMap::from([(method, builder)]),
                parsers: HashMap::from([(recv_method, parser)]),
            },
            multi => multi,
        }
    }

    /// Register another send method, promoting if needed.
    ///
    /// An already-registered send method keeps its existing bindings.
    pub fn add_method(
        &mut self,
        method: Method,
        recv_method: Method,
        builder: BodyBuilder,
        parser: BodyParser,
    ) {
        if self.supports(method) {
            return;
        }
        let promoted = std::mem::replace(
            self,
            RpcEntry::Single {
                method,
                recv_method,
                builder: empty_builder(""),
                parser: empty_parser(),
            },
        )
        .promote();
        let RpcEntry::Multi {
            mut send_methods,
            mut recv_methods,
            mut builders,
            mut parsers,
        } = promoted
        else {
            unreachable!("promote always yields Multi");
        };
        send_methods.insert(method);
        recv_methods.insert(method, recv_method);
        builders.insert(method, builder);
        parsers.entry(recv_method).or_insert(parser);
        *self = RpcEntry::Multi {
            send_methods,
            recv_methods,
            builders,
            parsers,
        };
    }
}

impl std::fmt::Debug for RpcEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcEntry::Single {
                method,
                recv_method,
                ..
            } => write!(f, "Single({method} -> {recv_method})"),
            RpcEntry::Multi { recv_methods, .. } => {
                write!(f, "Multi(")?;
                for (i, (send, recv)) in recv_methods.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{send} -> {recv}")?;
                }
                write!(f, ")")
            }
        }
    }
}
