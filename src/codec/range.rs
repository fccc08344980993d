//! Byte-range readers.
//!
//! A [`ByteRange`] is a view of a byte buffer between a start and an
//! **inclusive** end offset. Parsers work at named offsets inside a packet
//! body by carving sub-ranges and applying typed readers. Reads never mutate
//! the underlying buffer; variable-width readers report how many bytes they
//! consumed so a caller can chain.
//!
//! # Example
//!
//! ```
//! use bowler_client::codec::ByteRange;
//!
//! let body = [0x02u8, b'o', b'k', 0x00, 0x07];
//! let range = ByteRange::full(&body);
//! let (buffer, used) = range.to_buffer().unwrap();
//! assert_eq!(&buffer[..], b"ok");
//! assert_eq!(used, 3);
//! assert_eq!(range.byte(used + 1).unwrap(), 0x07);
//! ```

use std::collections::HashMap;

use bytes::Bytes;

use crate::codec::value::{decode_string, BowlerType, BowlerValue, StringEncoding};
use crate::error::{BowlerError, Result};

/// A read-only view of `data[start..=end]`.
#[derive(Debug, Clone, Copy)]
pub struct ByteRange<'a> {
    data: &'a [u8],
    start: usize,
    /// Exclusive stop; the public API speaks in inclusive ends.
    stop: usize,
}

impl<'a> ByteRange<'a> {
    /// Range over `data[start..=end]`.
    pub fn new(data: &'a [u8], start: usize, end: usize) -> Result<Self> {
        if end >= data.len() || start > end + 1 {
            return Err(BowlerError::TruncatedInput {
                needed: end + 1,
                available: data.len(),
            });
        }
        Ok(Self {
            data,
            start,
            stop: end + 1,
        })
    }

    /// Range over all of `data`.
    pub fn full(data: &'a [u8]) -> Self {
        Self {
            data,
            start: 0,
            stop: data.len(),
        }
    }

    /// Empty range anchored at `at`.
    pub fn empty(data: &'a [u8], at: usize) -> Self {
        Self {
            data,
            start: at,
            stop: at,
        }
    }

    /// Number of bytes in the range.
    #[inline]
    pub fn len(&self) -> usize {
        self.stop - self.start
    }

    /// Whether the range holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stop == self.start
    }

    /// The ranged bytes as a slice.
    #[inline]
    pub fn as_slice(&self) -> &'a [u8] {
        &self.data[self.start..self.stop]
    }

    /// Byte at range-relative offset `i`.
    pub fn byte(&self, i: usize) -> Result<u8> {
        if i >= self.len() {
            return Err(BowlerError::TruncatedInput {
                needed: i + 1,
                available: self.len(),
            });
        }
        Ok(self.data[self.start + i])
    }

    /// Sub-range over range-relative offsets `a..=b`.
    pub fn bytes(&self, a: usize, b: usize) -> Result<ByteRange<'a>> {
        if b >= self.len() || a > b + 1 {
            return Err(BowlerError::TruncatedInput {
                needed: b + 1,
                available: self.len(),
            });
        }
        Ok(ByteRange {
            data: self.data,
            start: self.start + a,
            stop: self.start + b + 1,
        })
    }

    /// Extend the range to the end of the underlying buffer.
    pub fn to_end(&self) -> ByteRange<'a> {
        ByteRange {
            data: self.data,
            start: self.start,
            stop: self.data.len(),
        }
    }

    /// Shrink the range to end at the first 0x00 byte.
    ///
    /// With `include_null` false the null byte is excluded; true keeps it as
    /// the final byte. Errors when the range holds no null.
    pub fn to_null(&self, include_null: bool) -> Result<ByteRange<'a>> {
        let nul = self
            .as_slice()
            .iter()
            .position(|&b| b == 0)
            .ok_or(BowlerError::TruncatedInput {
                needed: self.len() + 1,
                available: self.len(),
            })?;
        Ok(ByteRange {
            data: self.data,
            start: self.start,
            stop: self.start + nul + usize::from(include_null),
        })
    }

    /// The ranged bytes ANDed with `mask`.
    pub fn masked_with(&self, mask: u8) -> Vec<u8> {
        self.as_slice().iter().map(|b| b & mask).collect()
    }

    /// Hand the raw bytes to a formatter callback.
    pub fn format<T>(&self, f: impl FnOnce(&[u8]) -> T) -> T {
        f(self.as_slice())
    }

    /// Partition into equal `n`-byte sub-ranges and apply `f` to each.
    ///
    /// Errors when the range length is not a multiple of `n`.
    pub fn map_every<T>(
        &self,
        n: usize,
        mut f: impl FnMut(ByteRange<'a>) -> Result<T>,
    ) -> Result<Vec<T>> {
        if n == 0 || self.len() % n != 0 {
            return Err(BowlerError::TruncatedInput {
                needed: self.len().next_multiple_of(n.max(1)),
                available: self.len(),
            });
        }
        let mut out = Vec::with_capacity(self.len() / n);
        for chunk in 0..self.len() / n {
            out.push(f(ByteRange {
                data: self.data,
                start: self.start + chunk * n,
                stop: self.start + (chunk + 1) * n,
            })?);
        }
        Ok(out)
    }

    /// Decode the whole range as an integer by width: 1, 2 or 4 bytes map to
    /// UInt8, Int16 and Int32.
    pub fn to_int(&self) -> Result<BowlerValue> {
        let ty = match self.len() {
            1 => BowlerType::UInt8,
            2 => BowlerType::Int16,
            4 => BowlerType::Int32,
            other => {
                return Err(BowlerError::ValueOutOfRange(format!(
                    "no integer type is {other} bytes wide"
                )));
            }
        };
        let (value, _) = self.value_at(0, ty, StringEncoding::Ascii)?;
        Ok(value)
    }

    /// Decode up to the first null byte (or the whole range when none is
    /// present). The consumed count includes the null.
    pub fn to_string(&self, encoding: StringEncoding) -> Result<(String, usize)> {
        match self.as_slice().iter().position(|&b| b == 0) {
            Some(nul) => {
                let s = decode_string(&self.as_slice()[..nul], encoding)?;
                Ok((s, nul + 1))
            }
            None => {
                let s = decode_string(self.as_slice(), encoding)?;
                Ok((s, self.len()))
            }
        }
    }

    /// Decode every ranged byte, null bytes included.
    pub fn to_raw_string(&self, encoding: StringEncoding) -> Result<String> {
        decode_string(self.as_slice(), encoding)
    }

    /// Read a length-prefixed byte buffer at offset 0.
    pub fn to_buffer(&self) -> Result<(Bytes, usize)> {
        match self.value_at(0, BowlerType::ByteBuffer, StringEncoding::Ascii)? {
            (BowlerValue::Buffer(b), used) => Ok((b, used)),
            _ => unreachable!("ByteBuffer decodes to Buffer"),
        }
    }

    /// Read a length-prefixed u8 array at offset 0.
    pub fn to_uint8_array(&self) -> Result<(Vec<u8>, usize)> {
        match self.value_at(0, BowlerType::UInt8Array, StringEncoding::Ascii)? {
            (BowlerValue::UInt8Array(v), used) => Ok((v, used)),
            _ => unreachable!("UInt8Array decodes to UInt8Array"),
        }
    }

    /// Read a count-prefixed Int32 array at offset 0.
    pub fn to_int32_array(&self) -> Result<(Vec<i32>, usize)> {
        match self.value_at(0, BowlerType::Int32Array, StringEncoding::Ascii)? {
            (BowlerValue::Int32Array(v), used) => Ok((v, used)),
            _ => unreachable!("Int32Array decodes to Int32Array"),
        }
    }

    /// First byte as a boolean (non-zero is true).
    pub fn to_bool(&self) -> Result<bool> {
        Ok(self.byte(0)? != 0)
    }

    /// Use the first byte as a key into `table`.
    pub fn lookup_in<'t, V>(&self, table: &'t HashMap<u8, V>) -> Result<Option<&'t V>> {
        Ok(table.get(&self.byte(0)?))
    }

    /// Read one typed value at range-relative offset `at`.
    pub fn value_at(
        &self,
        at: usize,
        ty: BowlerType,
        encoding: StringEncoding,
    ) -> Result<(BowlerValue, usize)> {
        BowlerValue::deserialize(ty, self.as_slice(), at, encoding)
    }
}
