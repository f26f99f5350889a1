//! Timestamped, channel-tagged binary framing for bidi-tee session logs.
//!
//! This is the contract between capture and replay. Every record is:
//! - A 16-byte header: capture timestamp, channel, half-close flag, payload size
//! - Exactly `block_size` payload bytes
//!
//! A log is a plain concatenation of records, with no separators and no
//! trailing partial record.

pub mod channel;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use channel::{channel_label, EXIT, MAX_CHANNEL, STDERR, STDIN, STDOUT};
pub use codec::{
    decode_header, encode_header, Frame, FrameHeader, HEADER_SIZE, MAX_BLOCK_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
