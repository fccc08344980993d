//! Wire format encoding and decoding.
//!
//! Implements the fixed packet prefix:
//! ```text
//! ┌─────────┬───────────┬────────┬───────────┬──────┬─────┬──────────┬──────┐
//! │ Version │ MAC       │ Method │ Namespace │ Size │ CRC │ RPC name │ Body │
//! │ 1 byte  │ 6 bytes   │ 1 byte │ 1 byte    │ 1 B  │ 1 B │ 4 bytes  │ ...  │
//! └─────────┴───────────┴────────┴───────────┴──────┴─────┴──────────┴──────┘
//! ```
//!
//! The namespace byte carries the direction flag in its **high** bit and the
//! namespace id in the low 7 bits. `size` counts the RPC name plus the body;
//! `crc` is the low byte of the sum of bytes 0 through 9.

use std::str::FromStr;

use serde::Serialize;

use crate::error::{BowlerError, Result};

/// Header size in bytes (fixed, exactly 11).
pub const HEADER_SIZE: usize = 11;

/// RPC name width in bytes, ASCII, zero padded.
pub const RPC_NAME_SIZE: usize = 4;

/// Offset of the payload-length byte inside the header.
pub const SIZE_OFFSET: usize = 9;

/// Offset of the first body byte.
pub const BODY_OFFSET: usize = HEADER_SIZE + RPC_NAME_SIZE;

/// Protocol version carried by every packet.
pub const PROTOCOL_VERSION: u8 = 3;

/// Largest possible packet: header plus a full 255-byte size field.
pub const MAX_PACKET_SIZE: usize = HEADER_SIZE + 255;

/// High bit of the namespace byte: direction flag.
pub const DIRECTION_BIT: u8 = 0x80;

/// Low seven bits of the namespace byte: namespace id.
pub const NAMESPACE_ID_MASK: u8 = 0x7F;

/// The five Bowler methods, semantically analogous to HTTP verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Reply carrier; devices answer most requests with status.
    Status,
    /// Read without side effects.
    Get,
    /// State-changing write.
    Post,
    /// Write the device must acknowledge before anything else proceeds.
    Critical,
    /// Unsolicited device-initiated traffic.
    Async,
}

impl Method {
    /// Wire byte for this method.
    pub fn code(&self) -> u8 {
        match self {
            Method::Status => 0x00,
            Method::Get => 0x10,
            Method::Post => 0x20,
            Method::Critical => 0x30,
            Method::Async => 0x40,
        }
    }

    /// Resolve a wire byte to a method.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0x00 => Ok(Method::Status),
            0x10 => Ok(Method::Get),
            0x20 => Ok(Method::Post),
            0x30 => Ok(Method::Critical),
            0x40 => Ok(Method::Async),
            other => Err(BowlerError::Framing(format!(
                "unknown method byte {other:#04x}"
            ))),
        }
    }

    /// Lowercase name used in event keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Status => "status",
            Method::Get => "get",
            Method::Post => "post",
            Method::Critical => "critical",
            Method::Async => "async",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Six-byte device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// The broadcast address, six 0xFF bytes.
    pub const BROADCAST: MacAddress = MacAddress([0xFF; 6]);

    /// Raw bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// Whether this is the broadcast address.
    #[inline]
    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xFF; 6]
    }
}

impl FromStr for MacAddress {
    type Err = BowlerError;

    /// Parse a colon-separated hex string like `74:F7:26:00:00:01`.
    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for slot in &mut bytes {
            let part = parts.next().ok_or_else(|| {
                BowlerError::ValueOutOfRange(format!("MAC {s:?} has fewer than six octets"))
            })?;
            *slot = u8::from_str_radix(part, 16).map_err(|_| {
                BowlerError::ValueOutOfRange(format!("MAC octet {part:?} is not hex"))
            })?;
        }
        if parts.next().is_some() {
            return Err(BowlerError::ValueOutOfRange(format!(
                "MAC {s:?} has more than six octets"
            )));
        }
        Ok(MacAddress(bytes))
    }
}

impl std::fmt::Display for MacAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Decoded 11-byte header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Protocol version (must be 3).
    pub version: u8,
    /// Device address.
    pub mac: MacAddress,
    /// Method byte, decoded.
    pub method: Method,
    /// Namespace id, low 7 bits of the namespace byte.
    pub namespace_id: u8,
    /// Direction flag, high bit of the namespace byte.
    pub upstream: bool,
    /// RPC name bytes plus body bytes.
    pub size: u8,
    /// Low byte of the sum of bytes 0 through 9.
    pub checksum: u8,
}

impl Header {
    /// Create a header; the checksum is computed from the other fields.
    pub fn new(mac: MacAddress, method: Method, namespace_id: u8, upstream: bool, size: u8) -> Self {
        let mut header = Self {
            version: PROTOCOL_VERSION,
            mac,
            method,
            namespace_id: namespace_id & NAMESPACE_ID_MASK,
            upstream,
            size,
            checksum: 0,
        };
        header.checksum = header.compute_checksum();
        header
    }

    /// The namespace byte as it appears on the wire.
    #[inline]
    pub fn namespace_byte(&self) -> u8 {
        (self.namespace_id & NAMESPACE_ID_MASK) | if self.upstream { DIRECTION_BIT } else { 0 }
    }

    /// Low byte of the sum of encoded bytes 0 through 9.
    pub fn compute_checksum(&self) -> u8 {
        let mut sum = self.version as u32;
        for b in self.mac.0 {
            sum += b as u32;
        }
        sum += self.method.code() as u32;
        sum += self.namespace_byte() as u32;
        sum += self.size as u32;
        (sum & 0xFF) as u8
    }

    /// Encode the header to its 11 wire bytes.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.version;
        buf[1..7].copy_from_slice(&self.mac.0);
        buf[7] = self.method.code();
        buf[8] = self.namespace_byte();
        buf[9] = self.size;
        buf[10] = self.checksum;
        buf
    }

    /// Decode a header from wire bytes.
    ///
    /// Returns `None` if the buffer is too short; field validation is
    /// [`validate`](Self::validate).
    pub fn decode(buf: &[u8]) -> Option<Result<Self>> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        let method = match Method::from_code(buf[7]) {
            Ok(m) => m,
            Err(e) => return Some(Err(e)),
        };
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&buf[1..7]);
        Some(Ok(Self {
            version: buf[0],
            mac: MacAddress(mac),
            method,
            namespace_id: buf[8] & NAMESPACE_ID_MASK,
            upstream: buf[8] & DIRECTION_BIT != 0,
            size: buf[9],
            checksum: buf[10],
        }))
    }

    /// Check version and checksum.
    pub fn validate(&self) -> Result<()> {
        if self.version != PROTOCOL_VERSION {
            return Err(BowlerError::BadVersion(self.version));
        }
        let computed = self.compute_checksum();
        if computed != self.checksum {
            return Err(BowlerError::BadChecksum {
                expected: self.checksum,
                computed,
            });
        }
        Ok(())
    }
}
