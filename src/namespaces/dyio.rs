//! `neuronrobotics.dyio` - device-level power, revision and identity.

use crate::codec::BowlerType;
use crate::protocol::Method;
use crate::registry::{
    empty_builder, typed_builder, typed_parser, NamespaceContribution,
};

/// The DyIO device namespace.
///
/// `_pwr.get` reads the power state; `_pwr.critical` flips the brownout
/// override and must be acknowledged before anything else runs. `info`
/// reads or (critically) rewrites the device's display name.
pub fn contribution() -> NamespaceContribution {
    let pwr_parser = || {
        typed_parser(vec![
            ("override", BowlerType::Bool),
            ("voltage", BowlerType::FixedPointThreePlaces),
        ])
    };
    let info_parser = || typed_parser(vec![("name", BowlerType::NullTerminatedString)]);

    NamespaceContribution::new("neuronrobotics.dyio")
        .multi_rpc(
            "_pwr",
            vec![
                (Method::Get, Method::Status, empty_builder("_pwr"), pwr_parser()),
                (
                    Method::Critical,
                    Method::Status,
                    typed_builder("_pwr", vec![BowlerType::Bool]),
                    pwr_parser(),
                ),
            ],
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
        .multi_rpc(
            "info",
            vec![
                (Method::Get, Method::Status, empty_builder("info"), info_parser()),
                (
                    Method::Critical,
                    Method::Status,
                    typed_builder("info", vec![BowlerType::NullTerminatedString]),
                    info_parser(),
                ),
            ],
        )
}
