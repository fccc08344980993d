//! Codec module - typed values, byte-range readers, packet assembly.
//!
//! This module implements the payload layer of the protocol:
//!
//! - [`BowlerValue`] / [`BowlerType`] - the ten typed wire values
//! - [`ByteRange`] - non-destructive typed reads over a byte region
//! - [`PacketAssembler`] - deferred writes materialized into one buffer
//!
//! Builders and parsers registered for RPCs are written against these three
//! types only; none of them touch the header layer.

mod assembler;
mod range;
mod value;

pub use assembler::PacketAssembler;
pub use range::ByteRange;
pub use value::{codes, BowlerType, BowlerValue, StringEncoding};
