//! Packet parsing and assembly.
//!
//! A packet is the 11-byte header, the 4-byte zero-padded ASCII RPC name,
//! and an optional body. [`ParsedPacket::parse`] validates the header and
//! resolves the namespace id against the id table; [`assemble_packet`] is
//! the mirror operation used on the outbound path.

use bytes::Bytes;

use crate::codec::{ByteRange, PacketAssembler};
use crate::error::{BowlerError, Result};
use crate::protocol::wire_format::{
    Header, MacAddress, Method, BODY_OFFSET, HEADER_SIZE, RPC_NAME_SIZE,
};
use crate::registry::NamespaceIdTable;

/// A packet decoded into its structured form.
#[derive(Debug, Clone)]
pub struct ParsedPacket {
    /// Validated header.
    pub header: Header,
    /// Dotted namespace name resolved from the id table.
    pub namespace: String,
    /// RPC name with trailing padding stripped.
    pub rpc: String,
    /// Body bytes; may be empty.
    pub body: Bytes,
}

impl ParsedPacket {
    /// Parse a complete packet.
    ///
    /// Validates the version byte and checksum, masks the namespace byte and
    /// resolves it in `ids`, and extracts the `size - 4` body bytes.
    pub fn parse(bytes: &[u8], ids: &NamespaceIdTable) -> Result<Self> {
        if bytes.len() < BODY_OFFSET {
            return Err(BowlerError::TruncatedInput {
                needed: BODY_OFFSET,
                available: bytes.len(),
            });
        }
        let header = Header::decode(bytes).expect("length checked above")?;
        header.validate()?;

        if (header.size as usize) < RPC_NAME_SIZE {
            return Err(BowlerError::Framing(format!(
                "size byte {} cannot cover the RPC name",
                header.size
            )));
        }
        let total = HEADER_SIZE + header.size as usize;
        if bytes.len() < total {
            return Err(BowlerError::TruncatedInput {
                needed: total,
                available: bytes.len(),
            });
        }

        let namespace = ids
            .name_of(header.namespace_id)
            .ok_or(BowlerError::UnknownNamespaceId(header.namespace_id))?
            .to_string();

        let name_bytes = &bytes[HEADER_SIZE..BODY_OFFSET];
        if let Some(bad) = name_bytes.iter().find(|b| !b.is_ascii()) {
            return Err(BowlerError::InvalidEncoding(format!(
                "RPC name byte {bad:#04x} is not ASCII"
            )));
        }
        let rpc = name_bytes
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect::<String>();

        Ok(Self {
            header,
            namespace,
            rpc,
            body: Bytes::copy_from_slice(&bytes[BODY_OFFSET..total]),
        })
    }

    /// The body as a [`ByteRange`] for typed reads.
    pub fn body_range(&self) -> ByteRange<'_> {
        ByteRange::full(&self.body)
    }
}

/// Assemble an outbound packet.
///
/// The body assembler is shifted behind the header, the size byte is set to
/// the RPC name width plus the body length, and the checksum is computed
/// over the first ten bytes.
pub fn assemble_packet(
    mac: MacAddress,
    method: Method,
    namespace: &str,
    rpc: &str,
    ids: &NamespaceIdTable,
    mut body: PacketAssembler,
) -> Result<Bytes> {
    if rpc.is_empty() || rpc.len() > RPC_NAME_SIZE || !rpc.is_ascii() {
        return Err(BowlerError::ValueOutOfRange(format!(
            "RPC name {rpc:?} must be 1 to 4 ASCII bytes"
        )));
    }
    let namespace_id = ids
        .id_of(namespace)
        .ok_or_else(|| BowlerError::UndefinedNamespace(namespace.to_string()))?;

    body.set_offset(BODY_OFFSET);
    let body_len = body.length();
    let size = RPC_NAME_SIZE + body_len;
    if size > u8::MAX as usize {
        return Err(BowlerError::ValueOutOfRange(format!(
            "body of {body_len} bytes does not fit the size byte"
        )));
    }

    let header = Header::new(mac, method, namespace_id, false, size as u8);

    let mut packet = PacketAssembler::new();
    packet.put_bytes(0, &header.encode());
    let mut name = [0u8; RPC_NAME_SIZE];
    name[..rpc.len()].copy_from_slice(rpc.as_bytes());
    packet.put_bytes(HEADER_SIZE, &name);
    packet.append(body);

    Ok(Bytes::from(packet.assemble()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::BowlerValue;

    fn table() -> NamespaceIdTable {
        let mut ids = NamespaceIdTable::new();
        ids.insert(1, "neuronrobotics.dyio");
        ids
    }

    #[test]
    fn test_assemble_ping_bytes() {
        let packet = assemble_packet(
            MacAddress::BROADCAST,
            Method::Get,
            "bcs.core",
            "_png",
            &table(),
            PacketAssembler::new(),
        )
        .unwrap();
        assert_eq!(
            &packet[..],
            &[
                0x03, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x10, 0x00, 0x04, 0x11, b'_', b'p',
                b'n', b'g'
            ]
        );
    }

    #[test]
    fn test_parse_ping() {
        let ids = table();
        let bytes = assemble_packet(
            MacAddress::BROADCAST,
            Method::Get,
            "bcs.core",
            "_png",
            &ids,
            PacketAssembler::new(),
        )
        .unwrap();

        let parsed = ParsedPacket::parse(&bytes, &ids).unwrap();
        assert_eq!(parsed.namespace, "bcs.core");
        assert_eq!(parsed.rpc, "_png");
        assert_eq!(parsed.header.method, Method::Get);
        assert_eq!(parsed.header.size, 4);
        assert!(parsed.body.is_empty());
    }

    #[test]
    fn test_parse_assemble_idempotent() {
        let ids = table();
        let mut body = PacketAssembler::new();
        body.put_value(0, &BowlerValue::Int32(-7)).unwrap();
        body.put_value(4, &BowlerValue::UInt8(3)).unwrap();

        let bytes = assemble_packet(
            MacAddress::BROADCAST,
            Method::Post,
            "neuronrobotics.dyio",
            "schv",
            &ids,
            body,
        )
        .unwrap();
        let first = ParsedPacket::parse(&bytes, &ids).unwrap();

        let mut rebuilt_body = PacketAssembler::new();
        rebuilt_body.put_bytes(0, &first.body);
        let rebuilt = assemble_packet(
            first.header.mac,
            first.header.method,
            &first.namespace,
            &first.rpc,
            &ids,
            rebuilt_body,
        )
        .unwrap();
        assert_eq!(bytes, rebuilt);

        let second = ParsedPacket::parse(&rebuilt, &ids).unwrap();
        assert_eq!(second.header, first.header);
        assert_eq!(second.body, first.body);
    }

    #[test]
    fn test_body_length_drives_size_byte() {
        let ids = table();
        let mut body = PacketAssembler::new();
        body.put_bytes(0, &[1, 2, 3, 4, 5]);
        let bytes = assemble_packet(
            MacAddress::BROADCAST,
            Method::Get,
            "bcs.core",
            "_rev",
            &ids,
            body,
        )
        .unwrap();
        assert_eq!(bytes[SIZE_BYTE], 4 + 5);
        assert_eq!(bytes.len(), BODY_OFFSET + 5);
    }
    const SIZE_BYTE: usize = 9;

    #[test]
    fn test_parse_rejects_bad_checksum() {
        let ids = table();
        let mut bytes = assemble_packet(
            MacAddress::BROADCAST,
            Method::Get,
            "bcs.core",
            "_png",
            &ids,
            PacketAssembler::new(),
        )
        .unwrap()
        .to_vec();
        bytes[10] ^= 0xFF;
        assert!(matches!(
            ParsedPacket::parse(&bytes, &ids),
            Err(BowlerError::BadChecksum { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_bad_version() {
        let ids = table();
        let mut bytes = assemble_packet(
            MacAddress::BROADCAST,
            Method::Get,
            "bcs.core",
            "_png",
            &ids,
            PacketAssembler::new(),
        )
        .unwrap()
        .to_vec();
        bytes[0] = 2;
        // keep the checksum consistent so only the version trips
        bytes[10] = bytes[10].wrapping_sub(1);
        assert!(matches!(
            ParsedPacket::parse(&bytes, &ids),
            Err(BowlerError::BadVersion(2))
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_namespace_id() {
        let ids = table();
        let mut sparse = NamespaceIdTable::new();
        sparse.insert(9, "bcs.io");
        let bytes = assemble_packet(
            MacAddress::BROADCAST,
            Method::Get,
            "bcs.io",
            "gchc",
            &sparse,
            PacketAssembler::new(),
        )
        .unwrap();
        assert!(matches!(
            ParsedPacket::parse(&bytes, &ids),
            Err(BowlerError::UnknownNamespaceId(9))
        ));
    }

    #[test]
    fn test_parse_truncated_packet() {
        let ids = table();
        let bytes = assemble_packet(
            MacAddress::BROADCAST,
            Method::Get,
            "bcs.core",
            "_png",
            &ids,
            PacketAssembler::new(),
        )
        .unwrap();
        assert!(matches!(
            ParsedPacket::parse(&bytes[..12], &ids),
            Err(BowlerError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn test_rpc_name_validation() {
        let ids = table();
        for bad in ["", "toolong", "png\u{e9}"] {
            assert!(assemble_packet(
                MacAddress::BROADCAST,
                Method::Get,
                "bcs.core",
                bad,
                &ids,
                PacketAssembler::new(),
            )
            .is_err());
        }
    }

    #[test]
    fn test_short_rpc_name_padding_strips() {
        let ids = table();
        let bytes = assemble_packet(
            MacAddress::BROADCAST,
            Method::Get,
            "bcs.core",
            "png",
            &ids,
            PacketAssembler::new(),
        )
        .unwrap();
        assert_eq!(&bytes[HEADER_SIZE..BODY_OFFSET], b"png\x00");
        let parsed = ParsedPacket::parse(&bytes, &ids).unwrap();
        assert_eq!(parsed.rpc, "png");
    }
}
