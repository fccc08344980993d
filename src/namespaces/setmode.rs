//! `bcs.io.setmode` - channel mode assignment.

use crate::codec::BowlerType;
use crate::protocol::Method;
use crate::registry::{empty_parser, typed_builder, NamespaceContribution};

/// Mode assignment, layered under `bcs.io`.
pub fn contribution() -> NamespaceContribution {
    NamespaceContribution::new("bcs.io.setmode").multi_rpc(
        "schm",
        vec![
            (
                Method::Post,
                Method::Status,
                typed_builder("schm", vec![BowlerType::UInt8, BowlerType::UInt8]),
                empty_parser(),
            ),
            (
                Method::Critical,
                Method::Status,
                typed_builder("schm", vec![BowlerType::UInt8, BowlerType::UInt8]),
                empty_parser(),
            ),
        ],
    )
}
