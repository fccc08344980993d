//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for the rolling buffer and a two-state machine to
//! carve the raw byte stream into complete packet slices:
//! - `NeedHeader`: wait until the size byte at offset 9 is readable
//! - `NeedBody`: wait until header + size bytes are buffered, then emit
//!
//! The buffer never drops bytes on fragmented or coalesced input. A header
//! whose size byte cannot describe a packet (smaller than the RPC name, or
//! past the configured maximum) produces a framing error and the parser
//! resynchronizes by discarding a single byte and retrying.

use bytes::{Bytes, BytesMut};

use crate::error::BowlerError;
use crate::protocol::wire_format::{HEADER_SIZE, MAX_PACKET_SIZE, RPC_NAME_SIZE, SIZE_OFFSET};

/// Bytes that must be buffered before the size byte is readable.
const SIZE_THRESHOLD: usize = SIZE_OFFSET + 1;

/// State machine for packet carving.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for enough bytes to read the size byte.
    NeedHeader,
    /// Size known; waiting for the full packet.
    NeedBody { total: usize },
}

/// Everything one `push` produced: complete packets, plus any framing
/// errors that were recovered from along the way.
#[derive(Debug, Default)]
pub struct PushResult {
    pub packets: Vec<Bytes>,
    pub errors: Vec<BowlerError>,
}

/// Buffer for accumulating incoming bytes and extracting complete packets.
pub struct FrameBuffer {
    buffer: BytesMut,
    state: State,
    max_packet_size: usize,
}

impl FrameBuffer {
    /// New buffer accepting packets up to the protocol maximum.
    pub fn new() -> Self {
        Self::with_max_packet(MAX_PACKET_SIZE)
    }

    /// New buffer with a transport-specific packet ceiling.
    pub fn with_max_packet(max_packet_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4 * MAX_PACKET_SIZE),
            state: State::NeedHeader,
            max_packet_size,
        }
    }

    /// Feed a raw chunk and extract every complete packet it unlocks.
    ///
    /// Partial data stays buffered for the next push. Malformed headers are
    /// reported in the result and skipped one byte at a time.
    pub fn push(&mut self, data: &[u8]) -> PushResult {
        self.buffer.extend_from_slice(data);

        let mut result = PushResult::default();
        loop {
            match self.state {
                State::NeedHeader => {
                    if self.buffer.len() < SIZE_THRESHOLD {
                        break;
                    }
                    let size = self.buffer[SIZE_OFFSET] as usize;
                    let total = HEADER_SIZE + size;
                    if size < RPC_NAME_SIZE || total > self.max_packet_size {
                        result.errors.push(BowlerError::Framing(format!(
                            "size byte {size} is impossible, discarding one byte"
                        )));
                        let _ = self.buffer.split_to(1);
                        continue;
                    }
                    self.state = State::NeedBody { total };
                }
                State::NeedBody { total } => {
                    if self.buffer.len() < total {
                        break;
                    }
                    result.packets.push(self.buffer.split_to(total).freeze());
                    self.state = State::NeedHeader;
                }
            }
        }
        result
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop buffered bytes and reset the state machine.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::NeedHeader;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
