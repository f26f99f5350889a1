//! Record everything a child process reads and writes, then replay it.
//!
//! `bidi-tee` sits between this process and a child: whatever arrives on our
//! stdin is fed to the child, whatever the child prints goes to our stdout and
//! stderr, and every chunk is also appended to a binary log tagged with a
//! capture timestamp and its channel. `bidi-tee-print` renders such a log.
//!
//! # Crate Structure
//!
//! - [`frame`]: the on-disk record format shared by both tools
//! - [`capture`]: process launch and the capture loop (Unix)
//! - [`replay`]: channel filtering and rendering
//! - `cli`: argument handling for the two binaries (behind the `cli` feature)

/// Re-export frame types.
pub mod frame {
    pub use bidi_tee_frame::*;
}

/// Re-export capture types.
pub mod capture {
    pub use bidi_tee_capture::*;
}

/// Re-export replay types.
pub mod replay {
    pub use bidi_tee_replay::*;
}

#[cfg(feature = "cli")]
#[doc(hidden)]
pub mod cli;
