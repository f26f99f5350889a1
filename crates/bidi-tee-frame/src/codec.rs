use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::channel::{EXIT, MAX_CHANNEL};
use crate::error::{FrameError, Result};

/// Frame header: timestamp (8) + packed channel/flags/size word (8) = 16 bytes.
pub const HEADER_SIZE: usize = 16;

/// Largest payload a single frame can carry (width of `block_size`).
pub const MAX_BLOCK_SIZE: usize = u16::MAX as usize;

const CHANNEL_MASK: u64 = 0x0f;
const CLOSED_SHIFT: u32 = 4;
const RESERVED_SHIFT: u32 = 5;
const RESERVED_MASK: u64 = (1 << 43) - 1;
const BLOCK_SIZE_SHIFT: u32 = 48;

/// Exit code bits within `reserved`, only meaningful on the [`EXIT`] channel.
const EXIT_CODE_MASK: u64 = 0xff;

/// The fixed 16-byte record header.
///
/// Wire format (all little-endian):
/// ```text
/// ┌─────────────────────┬──────────────────────────────────────────────────┐
/// │ timestamp_ns (8B)   │ packed u64 (8B)                                  │
/// │ i64, ns since epoch │ bits 0-3 channel │ bit 4 closed │ bits 5-47    │
/// │                     │ reserved (exit code in 5-12 on channel 15)      │
/// │                     │ bits 48-63 block_size                            │
/// └─────────────────────┴──────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub timestamp_ns: i64,
    pub channel: u8,
    pub channel_closed: bool,
    pub reserved: u64,
    pub block_size: u16,
}

impl FrameHeader {
    /// Exit code recorded in a terminal header, `None` for any other channel.
    pub fn exit_code(&self) -> Option<u8> {
        (self.channel == EXIT).then(|| (self.reserved & EXIT_CODE_MASK) as u8)
    }

    /// Pack into the on-disk representation.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..8].copy_from_slice(&self.timestamp_ns.to_le_bytes());
        out[8..].copy_from_slice(&self.packed_word().to_le_bytes());
        out
    }

    fn packed_word(&self) -> u64 {
        (u64::from(self.channel) & CHANNEL_MASK)
            | (u64::from(self.channel_closed) << CLOSED_SHIFT)
            | ((self.reserved & RESERVED_MASK) << RESERVED_SHIFT)
            | (u64::from(self.block_size) << BLOCK_SIZE_SHIFT)
    }

    fn from_word(timestamp_ns: i64, word: u64) -> Self {
        Self {
            timestamp_ns,
            channel: (word & CHANNEL_MASK) as u8,
            channel_closed: (word >> CLOSED_SHIFT) & 1 == 1,
            reserved: (word >> RESERVED_SHIFT) & RESERVED_MASK,
            block_size: (word >> BLOCK_SIZE_SHIFT) as u16,
        }
    }
}

/// One timestamped, channel-tagged record of a session log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Capture time in nanoseconds since the Unix epoch.
    pub timestamp_ns: i64,
    /// The channel this record belongs to.
    pub channel: u8,
    /// True when the channel reached end-of-stream; payload is then empty.
    pub channel_closed: bool,
    /// Child exit code, only present on the terminal [`EXIT`] frame.
    pub exit_code: Option<u8>,
    /// The bytes read from the channel.
    pub payload: Bytes,
}

impl Frame {
    /// A data frame carrying bytes read from `channel`.
    pub fn data(channel: u8, timestamp_ns: i64, payload: impl Into<Bytes>) -> Self {
        Self {
            timestamp_ns,
            channel,
            channel_closed: false,
            exit_code: None,
            payload: payload.into(),
        }
    }

    /// A half-close marker for `channel`.
    pub fn closed(channel: u8, timestamp_ns: i64) -> Self {
        Self {
            timestamp_ns,
            channel,
            channel_closed: true,
            exit_code: None,
            payload: Bytes::new(),
        }
    }

    /// The terminal end-of-session frame.
    pub fn exit(timestamp_ns: i64, exit_code: u8) -> Self {
        Self {
            timestamp_ns,
            channel: EXIT,
            channel_closed: false,
            exit_code: Some(exit_code),
            payload: Bytes::new(),
        }
    }

    /// Rebuild a frame from a decoded header and its payload.
    pub fn from_parts(header: FrameHeader, payload: Bytes) -> Self {
        Self {
            timestamp_ns: header.timestamp_ns,
            channel: header.channel,
            channel_closed: header.channel_closed,
            exit_code: header.exit_code(),
            payload,
        }
    }

    /// Build the header describing this frame.
    pub fn header(&self) -> Result<FrameHeader> {
        if self.channel > MAX_CHANNEL {
            return Err(FrameError::InvalidChannel(self.channel));
        }
        if self.payload.len() > MAX_BLOCK_SIZE {
            return Err(FrameError::PayloadTooLarge {
                size: self.payload.len(),
                max: MAX_BLOCK_SIZE,
            });
        }
        let reserved = match (self.channel, self.exit_code) {
            (EXIT, Some(code)) => u64::from(code),
            _ => 0,
        };
        Ok(FrameHeader {
            timestamp_ns: self.timestamp_ns,
            channel: self.channel,
            channel_closed: self.channel_closed,
            reserved,
            block_size: self.payload.len() as u16,
        })
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// True if this frame ends the session.
    pub fn is_exit(&self) -> bool {
        self.channel == EXIT
    }
}

/// Encode a header into the wire format.
pub fn encode_header(header: &FrameHeader, dst: &mut BytesMut) {
    dst.reserve(HEADER_SIZE);
    dst.put_i64_le(header.timestamp_ns);
    dst.put_u64_le(header.packed_word());
}

/// Decode a header from exactly [`HEADER_SIZE`] bytes.
pub fn decode_header(src: &[u8; HEADER_SIZE]) -> FrameHeader {
    let mut buf = &src[..];
    let timestamp_ns = buf.get_i64_le();
    let word = buf.get_u64_le();
    FrameHeader::from_word(timestamp_ns, word)
}
