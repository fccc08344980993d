//! `bcs.io` - channel access: counts, modes, values, async streams.

use crate::codec::BowlerType;
use crate::protocol::Method;
use crate::registry::{empty_builder, empty_parser, typed_builder, typed_parser, NamespaceContribution};

/// Channel I/O for devices that expose a channel bank.
pub fn contribution() -> NamespaceContribution {
    NamespaceContribution::new("bcs.io")
        .rpc(
            "gchc",
            Method::Get,
            Method::Status,
            empty_builder("gchc"),
            typed_parser(vec![("channel_count", BowlerType::Int32)]),
        )
        .rpc(
            "gchm",
            Method::Get,
            Method::Status,
            typed_builder("gchm", vec![BowlerType::UInt8]),
            typed_parser(vec![
                ("channel", BowlerType::UInt8),
                ("mode", BowlerType::UInt8),
            ]),
        )
        .rpc(
            "gchv",
            Method::Get,
            Method::Status,
            typed_builder("gchv", vec![BowlerType::UInt8]),
            typed_parser(vec![
                ("channel", BowlerType::UInt8),
                ("value", BowlerType::Int32),
            ]),
        )
        .multi_rpc(
            "schv",
            vec![
                (
                    Method::Post,
                    Method::Status,
                    typed_builder("schv", vec![BowlerType::UInt8, BowlerType::Int32]),
                    empty_parser(),
                ),
                (
                    Method::Critical,
                    Method::Status,
                    typed_builder("schv", vec![BowlerType::UInt8, BowlerType::Int32]),
                    empty_parser(),
                ),
            ],
        )
        // device-initiated channel events arrive with the async method
        .rpc(
            "asyn",
            Method::Get,
            Method::Async,
            typed_builder("asyn", vec![BowlerType::UInt8]),
            typed_parser(vec![
                ("channel", BowlerType::UInt8),
                ("value", BowlerType::Int32),
            ]),
        )
        .rpc(
            "strm",
            Method::Get,
            Method::Async,
            typed_builder("strm", vec![BowlerType::UInt8]),
            typed_parser(vec![
                ("channel", BowlerType::UInt8),
                ("data", BowlerType::ByteBuffer),
            ]),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BowlerValue, ByteRange, PacketAssembler};

    #[test]
    fn test_schv_is_multi_method() {
        let (_, entries) = contribution().into_entries().unwrap();
        let entry = &entries["schv"];
        assert!(entry.is_multi());
        assert_eq!(entry.send_methods(), vec![Method::Post, Method::Critical]);
        assert_eq!(entry.recv_for(Method::Critical), Some(Method::Status));
    }

    #[test]
    fn test_schv_builder_bytes() {
        let (_, entries) = contribution().into_entries().unwrap();
        let builder = entries["schv"].builder_for(Method::Post).unwrap();
        let mut asm = PacketAssembler::new();
        builder(
            &[BowlerValue::UInt8(11), BowlerValue::Int32(-1)],
            &mut asm,
        )
        .unwrap();
        assert_eq!(asm.assemble(), vec![11, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_asyn_keys_on_async_method() {
        let (_, entries) = contribution().into_entries().unwrap();
        let entry = &entries["asyn"];
        assert_eq!(entry.recv_for(Method::Get), Some(Method::Async));
        assert!(entry.parser_for_recv(Method::Async).is_some());
        assert!(entry.parser_for_recv(Method::Status).is_none());
    }

    #[test]
    fn test_strm_parser_carries_buffer() {
        let (_, entries) = contribution().into_entries().unwrap();
        let parser = entries["strm"].parser_for_recv(Method::Async).unwrap();
        let body = [7u8, 3, 0xA, 0xB, 0xC];
        let reply = parser(&ByteRange::full(&body)).unwrap();
        assert_eq!(reply.get("channel"), Some(&BowlerValue::UInt8(7)));
        assert_eq!(
            reply.get("data").and_then(|v| v.as_bytes()),
            Some(&[0xA, 0xB, 0xC][..])
        );
    }
}
