//! Capture engine for bidi-tee.
//!
//! Spawns a child with its standard streams redirected into pipes, forwards
//! live traffic between the child and this process, and records every read as
//! a [`bidi_tee_frame::Frame`]:
//! - [`launcher`] creates the pipes and the child
//! - [`copier`] owns one direction of traffic
//! - [`multiplexer`] drives the single-threaded readiness loop
//!
//! Unix only.

pub mod clock;
pub mod copier;
pub mod error;

#[cfg(unix)]
pub mod launcher;
#[cfg(unix)]
pub mod multiplexer;
#[cfg(unix)]
pub mod pipe;

pub use copier::ChannelCopier;
pub use error::{CaptureError, Result};

#[cfg(unix)]
pub use launcher::{spawn, Child, ChildPipes};
#[cfg(unix)]
pub use multiplexer::{capture, CaptureConfig, CaptureOutcome, ExitWatch, Multiplexer, ParentStreams};
#[cfg(unix)]
pub use pipe::Pipe;
