//! `bcs.pid` - PID group setpoints and positions.

use crate::codec::BowlerType;
use crate::protocol::Method;
use crate::registry::{empty_parser, typed_builder, typed_parser, NamespaceContribution};

/// PID control for devices with closed-loop channels.
///
/// `apid` takes the group list as a UInt8Array; the position report comes
/// back as one Int32 per requested group.
pub fn contribution() -> NamespaceContribution {
    NamespaceContribution::new("bcs.pid")
        .multi_rpc(
            "_pid",
            vec![
                (
                    Method::Get,
                    Method::Status,
                    typed_builder("_pid", vec![BowlerType::UInt8]),
                    typed_parser(vec![
                        ("group", BowlerType::UInt8),
                        ("value", BowlerType::Int32),
                    ]),
                ),
                (
                    Method::Post,
                    Method::Status,
                    typed_builder("_pid", vec![BowlerType::UInt8, BowlerType::Int32]),
                    typed_parser(vec![
                        ("group", BowlerType::UInt8),
                        ("value", BowlerType::Int32),
                    ]),
                ),
            ],
        )
        .rpc(
            "apid",
            Method::Get,
            Method::Status,
            typed_builder("apid", vec![BowlerType::UInt8Array]),
            typed_parser(vec![("positions", BowlerType::Int32Array)]),
        )
        .rpc(
            "rpid",
            Method::Post,
            Method::Status,
            typed_builder("rpid", vec![BowlerType::UInt8, BowlerType::Int32]),
            empty_parser(),
        )
}
