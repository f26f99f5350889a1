//! Built-in channel IDs.
//!
//! Channels 0-2 mirror the child's standard streams. Channel 15 is the
//! synthetic end-of-session marker. Channels 3-14 are reserved.

/// Bytes written to the child's standard input.
pub const STDIN: u8 = 0;

/// Bytes the child wrote to its standard output.
pub const STDOUT: u8 = 1;

/// Bytes the child wrote to its standard error.
pub const STDERR: u8 = 2;

/// Terminal marker carrying the child's exit code.
pub const EXIT: u8 = 15;

/// Largest channel id representable in the 4-bit header field.
pub const MAX_CHANNEL: u8 = 0x0f;

/// Returns the short direction label used in timestamped replay output.
pub fn channel_label(id: u8) -> &'static str {
    match id {
        STDIN => "->",
        STDOUT => "<-",
        STDERR => "<=",
        EXIT => "EXIT",
        _ => "??",
    }
}
