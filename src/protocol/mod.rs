//! Protocol module - wire format, framing, and packet types.
//!
//! This module implements the packet layer:
//! - 11-byte header encoding/decoding plus the 4-byte RPC name
//! - Frame buffer for accumulating partial reads
//! - Packet parse/assemble against the namespace id table

mod frame_buffer;
mod packet;
mod wire_format;

pub use frame_buffer::{FrameBuffer, PushResult};
pub use packet::{assemble_packet, ParsedPacket};
pub use wire_format::{
    Header, MacAddress, Method, BODY_OFFSET, DIRECTION_BIT, HEADER_SIZE, MAX_PACKET_SIZE,
    NAMESPACE_ID_MASK, PROTOCOL_VERSION, RPC_NAME_SIZE, SIZE_OFFSET,
};
