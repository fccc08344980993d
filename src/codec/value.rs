//! Typed wire values.
//!
//! Bowler payloads are sequences of typed values. Each type has a single-byte
//! code used by the `args` introspection RPC, and a fixed or length-dependent
//! width on the wire. Multi-byte integers are Big Endian.
//!
//! # Example
//!
//! ```
//! use bowler_client::codec::{BowlerType, BowlerValue, StringEncoding};
//!
//! let value = BowlerValue::Int32Array(vec![1, -2, 3]);
//! let mut buf = vec![0u8; value.width()];
//! value.serialize(&mut buf, 0).unwrap();
//! assert_eq!(buf[0], 3); // element count, not byte count
//!
//! let (back, used) =
//!     BowlerValue::deserialize(BowlerType::Int32Array, &buf, 0, StringEncoding::Ascii).unwrap();
//! assert_eq!(back, value);
//! assert_eq!(used, 13);
//! ```

use bytes::Bytes;
use serde::Serialize;

use crate::error::{BowlerError, Result};

/// Wire type codes.
pub mod codes {
    pub const UINT8: u8 = 8;
    pub const INT16: u8 = 16;
    pub const INT32: u8 = 32;
    pub const BYTE_BUFFER: u8 = 37;
    pub const INT32_ARRAY: u8 = 38;
    pub const NULL_TERMINATED_STRING: u8 = 39;
    pub const FIXED_POINT_TWO_PLACES: u8 = 41;
    pub const FIXED_POINT_THREE_PLACES: u8 = 42;
    pub const BOOL: u8 = 43;
}

/// The ten Bowler value types.
///
/// `UInt8Array` shares wire code 37 with `ByteBuffer`; a code read off the
/// wire always decodes as `ByteBuffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BowlerType {
    Bool,
    UInt8,
    Int16,
    Int32,
    FixedPointTwoPlaces,
    FixedPointThreePlaces,
    ByteBuffer,
    UInt8Array,
    Int32Array,
    NullTerminatedString,
}

impl BowlerType {
    /// Wire code for this type.
    pub fn code(&self) -> u8 {
        match self {
            BowlerType::Bool => codes::BOOL,
            BowlerType::UInt8 => codes::UINT8,
            BowlerType::Int16 => codes::INT16,
            BowlerType::Int32 => codes::INT32,
            BowlerType::FixedPointTwoPlaces => codes::FIXED_POINT_TWO_PLACES,
            BowlerType::FixedPointThreePlaces => codes::FIXED_POINT_THREE_PLACES,
            BowlerType::ByteBuffer | BowlerType::UInt8Array => codes::BYTE_BUFFER,
            BowlerType::Int32Array => codes::INT32_ARRAY,
            BowlerType::NullTerminatedString => codes::NULL_TERMINATED_STRING,
        }
    }

    /// Resolve a wire code to a type.
    ///
    /// Total over the declared code set; anything else is `UnknownTypeCode`.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            codes::BOOL => Ok(BowlerType::Bool),
            codes::UINT8 => Ok(BowlerType::UInt8),
            codes::INT16 => Ok(BowlerType::Int16),
            codes::INT32 => Ok(BowlerType::Int32),
            codes::BYTE_BUFFER => Ok(BowlerType::ByteBuffer),
            codes::INT32_ARRAY => Ok(BowlerType::Int32Array),
            codes::NULL_TERMINATED_STRING => Ok(BowlerType::NullTerminatedString),
            codes::FIXED_POINT_TWO_PLACES => Ok(BowlerType::FixedPointTwoPlaces),
            codes::FIXED_POINT_THREE_PLACES => Ok(BowlerType::FixedPointThreePlaces),
            other => Err(BowlerError::UnknownTypeCode(other)),
        }
    }

    /// Byte width for fixed-width types, `None` for length-dependent ones.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            BowlerType::Bool | BowlerType::UInt8 => Some(1),
            BowlerType::Int16 => Some(2),
            BowlerType::Int32
            | BowlerType::FixedPointTwoPlaces
            | BowlerType::FixedPointThreePlaces => Some(4),
            BowlerType::ByteBuffer
            | BowlerType::UInt8Array
            | BowlerType::Int32Array
            | BowlerType::NullTerminatedString => None,
        }
    }
}

/// String decoding applied by the string readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringEncoding {
    /// 7-bit ASCII. The wire default.
    #[default]
    Ascii,
    Utf8,
}

/// A decoded Bowler value.
///
/// Fixed-point variants hold the already-divided floating value; the Int32
/// representation only exists on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BowlerValue {
    Bool(bool),
    UInt8(u8),
    Int16(i16),
    Int32(i32),
    Fixed100(f64),
    Fixed1000(f64),
    Buffer(Bytes),
    UInt8Array(Vec<u8>),
    Int32Array(Vec<i32>),
    Str(String),
}

impl BowlerValue {
    /// The type this value serializes as.
    pub fn value_type(&self) -> BowlerType {
        match self {
            BowlerValue::Bool(_) => BowlerType::Bool,
            BowlerValue::UInt8(_) => BowlerType::UInt8,
            BowlerValue::Int16(_) => BowlerType::Int16,
            BowlerValue::Int32(_) => BowlerType::Int32,
            BowlerValue::Fixed100(_) => BowlerType::FixedPointTwoPlaces,
            BowlerValue::Fixed1000(_) => BowlerType::FixedPointThreePlaces,
            BowlerValue::Buffer(_) => BowlerType::ByteBuffer,
            BowlerValue::UInt8Array(_) => BowlerType::UInt8Array,
            BowlerValue::Int32Array(_) => BowlerType::Int32Array,
            BowlerValue::Str(_) => BowlerType::NullTerminatedString,
        }
    }

    /// Serialized width in bytes.
    ///
    /// Length-prefixed types count their 1-byte prefix; strings count the
    /// trailing null.
    pub fn width(&self) -> usize {
        match self {
            BowlerValue::Bool(_) | BowlerValue::UInt8(_) => 1,
            BowlerValue::Int16(_) => 2,
            BowlerValue::Int32(_) | BowlerValue::Fixed100(_) | BowlerValue::Fixed1000(_) => 4,
            BowlerValue::Buffer(b) => 1 + b.len(),
            BowlerValue::UInt8Array(b) => 1 + b.len(),
            BowlerValue::Int32Array(v) => 1 + 4 * v.len(),
            BowlerValue::Str(s) => s.len() + 1,
        }
    }

    /// Write this value at `offset`, returning the bytes written.
    ///
    /// Writes exactly `self.width()` bytes. Fixed-point values scale by 100
    /// or 1000 with truncation toward zero.
    ///
    /// # Errors
    ///
    /// `InsufficientSpace` when the buffer is shorter than `offset + width`;
    /// `ValueOutOfRange` when a length prefix would exceed 255 or a scaled
    /// fixed-point value leaves the Int32 range.
    pub fn serialize(&self, buf: &mut [u8], offset: usize) -> Result<usize> {
        let width = self.width();
        match self {
            BowlerValue::Buffer(b) if b.len() > 255 => {
                return Err(BowlerError::ValueOutOfRange(format!(
                    "buffer of {} bytes exceeds the 255-byte prefix",
                    b.len()
                )));
            }
            BowlerValue::UInt8Array(b) if b.len() > 255 => {
                return Err(BowlerError::ValueOutOfRange(format!(
                    "array of {} bytes exceeds the 255-byte prefix",
                    b.len()
                )));
            }
            BowlerValue::Int32Array(v) if v.len() > 255 => {
                return Err(BowlerError::ValueOutOfRange(format!(
                    "array of {} elements exceeds the 255-element prefix",
                    v.len()
                )));
            }
            _ => {}
        }
        if buf.len() < offset + width {
            return Err(BowlerError::InsufficientSpace {
                needed: offset + width,
                available: buf.len(),
            });
        }

        let out = &mut buf[offset..offset + width];
        match self {
            BowlerValue::Bool(v) => out[0] = u8::from(*v),
            BowlerValue::UInt8(v) => out[0] = *v,
            BowlerValue::Int16(v) => out.copy_from_slice(&v.to_be_bytes()),
            BowlerValue::Int32(v) => out.copy_from_slice(&v.to_be_bytes()),
            BowlerValue::Fixed100(v) => {
                out.copy_from_slice(&scale_fixed(*v, 100.0)?.to_be_bytes())
            }
            BowlerValue::Fixed1000(v) => {
                out.copy_from_slice(&scale_fixed(*v, 1000.0)?.to_be_bytes())
            }
            BowlerValue::Buffer(b) => {
                out[0] = b.len() as u8;
                out[1..].copy_from_slice(b);
            }
            BowlerValue::UInt8Array(b) => {
                out[0] = b.len() as u8;
                out[1..].copy_from_slice(b);
            }
            BowlerValue::Int32Array(v) => {
                out[0] = v.len() as u8;
                for (i, n) in v.iter().enumerate() {
                    out[1 + 4 * i..5 + 4 * i].copy_from_slice(&n.to_be_bytes());
                }
            }
            BowlerValue::Str(s) => {
                out[..s.len()].copy_from_slice(s.as_bytes());
                out[s.len()] = 0;
            }
        }
        Ok(width)
    }

    /// Read one value of type `ty` at `offset`.
    ///
    /// Returns the value and the bytes consumed (the 1-byte prefix included
    /// for length-prefixed types, the terminating null for strings).
    ///
    /// # Errors
    ///
    /// `TruncatedInput` when the buffer ends early; `InvalidEncoding` when
    /// string bytes do not decode under `encoding`.
    pub fn deserialize(
        ty: BowlerType,
        buf: &[u8],
        offset: usize,
        encoding: StringEncoding,
    ) -> Result<(Self, usize)> {
        let need = |needed: usize| -> Result<()> {
            if buf.len() < offset + needed {
                Err(BowlerError::TruncatedInput {
                    needed: offset + needed,
                    available: buf.len(),
                })
            } else {
                Ok(())
            }
        };

        match ty {
            BowlerType::Bool => {
                need(1)?;
                Ok((BowlerValue::Bool(buf[offset] != 0), 1))
            }
            BowlerType::UInt8 => {
                need(1)?;
                Ok((BowlerValue::UInt8(buf[offset]), 1))
            }
            BowlerType::Int16 => {
                need(2)?;
                let v = i16::from_be_bytes([buf[offset], buf[offset + 1]]);
                Ok((BowlerValue::Int16(v), 2))
            }
            BowlerType::Int32 => {
                need(4)?;
                Ok((BowlerValue::Int32(read_i32(buf, offset)), 4))
            }
            BowlerType::FixedPointTwoPlaces => {
                need(4)?;
                let v = read_i32(buf, offset) as f64 / 100.0;
                Ok((BowlerValue::Fixed100(v), 4))
            }
            BowlerType::FixedPointThreePlaces => {
                need(4)?;
                let v = read_i32(buf, offset) as f64 / 1000.0;
                Ok((BowlerValue::Fixed1000(v), 4))
            }
            BowlerType::ByteBuffer => {
                need(1)?;
                let len = buf[offset] as usize;
                need(1 + len)?;
                let b = Bytes::copy_from_slice(&buf[offset + 1..offset + 1 + len]);
                Ok((BowlerValue::Buffer(b), 1 + len))
            }
            BowlerType::UInt8Array => {
                need(1)?;
                let len = buf[offset] as usize;
                need(1 + len)?;
                let b = buf[offset + 1..offset + 1 + len].to_vec();
                Ok((BowlerValue::UInt8Array(b), 1 + len))
            }
            BowlerType::Int32Array => {
                need(1)?;
                let count = buf[offset] as usize;
                need(1 + 4 * count)?;
                let mut v = Vec::with_capacity(count);
                for i in 0..count {
                    v.push(read_i32(buf, offset + 1 + 4 * i));
                }
                Ok((BowlerValue::Int32Array(v), 1 + 4 * count))
            }
            BowlerType::NullTerminatedString => {
                let rest = &buf[offset.min(buf.len())..];
                let nul = rest.iter().position(|&b| b == 0).ok_or({
                    BowlerError::TruncatedInput {
                        needed: offset + rest.len() + 1,
                        available: buf.len(),
                    }
                })?;
                let s = decode_string(&rest[..nul], encoding)?;
                Ok((BowlerValue::Str(s), nul + 1))
            }
        }
    }

    /// Boolean view; integers read as non-zero.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            BowlerValue::Bool(v) => Some(*v),
            BowlerValue::UInt8(v) => Some(*v != 0),
            BowlerValue::Int32(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Narrow integer view.
    pub fn as_u8(&self) -> Option<u8> {
        match self {
            BowlerValue::UInt8(v) => Some(*v),
            BowlerValue::Int16(v) => u8::try_from(*v).ok(),
            BowlerValue::Int32(v) => u8::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Wide integer view over the integral variants.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            BowlerValue::Bool(v) => Some(i32::from(*v)),
            BowlerValue::UInt8(v) => Some(i32::from(*v)),
            BowlerValue::Int16(v) => Some(i32::from(*v)),
            BowlerValue::Int32(v) => Some(*v),
            _ => None,
        }
    }

    /// String view.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            BowlerValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Byte view over the two length-prefixed byte shapes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BowlerValue::Buffer(b) => Some(b),
            BowlerValue::UInt8Array(b) => Some(b),
            _ => None,
        }
    }

    /// Coerce this value to `ty`, converting between numeric representations.
    ///
    /// Used by introspection-generated builders so a caller can pass
    /// `Int32(1)` where the device declared UInt8.
    pub fn conform(&self, ty: BowlerType) -> Result<Self> {
        let fail = || {
            Err(BowlerError::ValueOutOfRange(format!(
                "cannot pass {self} as {ty:?}"
            )))
        };
        match (self, ty) {
            (v, t) if v.value_type() == t => Ok(self.clone()),
            (BowlerValue::Bool(v), BowlerType::UInt8) => Ok(BowlerValue::UInt8(u8::from(*v))),
            (BowlerValue::Bool(v), BowlerType::Int32) => Ok(BowlerValue::Int32(i32::from(*v))),
            (BowlerValue::UInt8(v), BowlerType::Bool) => Ok(BowlerValue::Bool(*v != 0)),
            (BowlerValue::UInt8(v), BowlerType::Int16) => Ok(BowlerValue::Int16(i16::from(*v))),
            (BowlerValue::UInt8(v), BowlerType::Int32) => Ok(BowlerValue::Int32(i32::from(*v))),
            (BowlerValue::Int16(v), BowlerType::Int32) => Ok(BowlerValue::Int32(i32::from(*v))),
            (BowlerValue::Int32(v), BowlerType::Bool) => Ok(BowlerValue::Bool(*v != 0)),
            (BowlerValue::Int32(v), BowlerType::UInt8) => match u8::try_from(*v) {
                Ok(n) => Ok(BowlerValue::UInt8(n)),
                Err(_) => fail(),
            },
            (BowlerValue::Int32(v), BowlerType::Int16) => match i16::try_from(*v) {
                Ok(n) => Ok(BowlerValue::Int16(n)),
                Err(_) => fail(),
            },
            (BowlerValue::Int32(v), BowlerType::FixedPointTwoPlaces) => {
                Ok(BowlerValue::Fixed100(f64::from(*v)))
            }
            (BowlerValue::Int32(v), BowlerType::FixedPointThreePlaces) => {
                Ok(BowlerValue::Fixed1000(f64::from(*v)))
            }
            (BowlerValue::Buffer(b), BowlerType::UInt8Array) => {
                Ok(BowlerValue::UInt8Array(b.to_vec()))
            }
            (BowlerValue::UInt8Array(b), BowlerType::ByteBuffer) => {
                Ok(BowlerValue::Buffer(Bytes::copy_from_slice(b)))
            }
            _ => fail(),
        }
    }
}

impl std::fmt::Display for BowlerValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BowlerValue::Bool(v) => write!(f, "{v}"),
            BowlerValue::UInt8(v) => write!(f, "{v}"),
            BowlerValue::Int16(v) => write!(f, "{v}"),
            BowlerValue::Int32(v) => write!(f, "{v}"),
            BowlerValue::Fixed100(v) | BowlerValue::Fixed1000(v) => write!(f, "{v}"),
            BowlerValue::Buffer(b) => write!(f, "buffer[{}]", b.len()),
            BowlerValue::UInt8Array(b) => write!(f, "u8[{}]", b.len()),
            BowlerValue::Int32Array(v) => write!(f, "i32[{}]", v.len()),
            BowlerValue::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for BowlerValue {
    fn from(v: bool) -> Self {
        BowlerValue::Bool(v)
    }
}

impl From<u8> for BowlerValue {
    fn from(v: u8) -> Self {
        BowlerValue::UInt8(v)
    }
}

impl From<i16> for BowlerValue {
    fn from(v: i16) -> Self {
        BowlerValue::Int16(v)
    }
}

impl From<i32> for BowlerValue {
    fn from(v: i32) -> Self {
        BowlerValue::Int32(v)
    }
}

impl From<&str> for BowlerValue {
    fn from(v: &str) -> Self {
        BowlerValue::Str(v.to_string())
    }
}

impl From<String> for BowlerValue {
    fn from(v: String) -> Self {
        BowlerValue::Str(v)
    }
}

impl From<Vec<u8>> for BowlerValue {
    fn from(v: Vec<u8>) -> Self {
        BowlerValue::UInt8Array(v)
    }
}

impl From<Vec<i32>> for BowlerValue {
    fn from(v: Vec<i32>) -> Self {
        BowlerValue::Int32Array(v)
    }
}

impl From<Bytes> for BowlerValue {
    fn from(v: Bytes) -> Self {
        BowlerValue::Buffer(v)
    }
}

#[inline]
fn read_i32(buf: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

// Truncation toward zero, matching the device firmware.
fn scale_fixed(value: f64, factor: f64) -> Result<i32> {
    let scaled = (value * factor).trunc();
    if !scaled.is_finite() || scaled < i32::MIN as f64 || scaled > i32::MAX as f64 {
        return Err(BowlerError::ValueOutOfRange(format!(
            "{value} does not fit a fixed-point Int32 after scaling by {factor}"
        )));
    }
    Ok(scaled as i32)
}

pub(crate) fn decode_string(bytes: &[u8], encoding: StringEncoding) -> Result<String> {
    match encoding {
        StringEncoding::Ascii => {
            if let Some(bad) = bytes.iter().find(|b| !b.is_ascii()) {
                return Err(BowlerError::InvalidEncoding(format!(
                    "byte {bad:#04x} is not ASCII"
                )));
            }
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
        StringEncoding::Utf8 => String::from_utf8(bytes.to_vec())
            .map_err(|e| BowlerError::InvalidEncoding(e.to_string())),
    }
}
