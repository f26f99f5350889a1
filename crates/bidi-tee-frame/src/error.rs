/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload does not fit the 16-bit `block_size` field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The channel id does not fit the 4-bit channel field.
    #[error("invalid channel {0} (max 15)")]
    InvalidChannel(u8),

    /// The log ended in the middle of a record.
    #[error("unexpected end of file reading {what}: expected {expected} bytes, got {got}")]
    Truncated {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// A combined header+payload write transferred fewer bytes than the record.
    #[error("short log write ({written} of {expected} bytes)")]
    ShortWrite { expected: usize, written: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
