use std::ffi::OsString;
use std::path::PathBuf;

use bidi_tee_frame::FrameError;

/// Errors that can occur while capturing a child's traffic.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Failed to create one of the child's pipes.
    #[error("couldn't open pipes: {0}")]
    Pipe(std::io::Error),

    /// Failed to create the child process.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    /// A program path or argument cannot be passed to `execv`.
    #[error("invalid argument {0:?}: contains an interior NUL byte")]
    InvalidArgument(OsString),

    /// Failed to install the child-exit notification.
    #[error("failed to watch for child exit: {0}")]
    Signal(std::io::Error),

    /// The readiness wait failed.
    #[error("readiness wait failed: {0}")]
    Poll(std::io::Error),

    /// Failed to collect the child's exit status.
    #[error("failed to wait for pid {pid}: {source}")]
    Wait { pid: u32, source: std::io::Error },

    /// The log could not be opened once the child was running.
    #[error("couldn't open log: {0}")]
    LogOpen(std::io::Error),

    /// Writing a frame to the log failed or was short.
    #[error("log write failed: {0}")]
    Log(#[from] FrameError),

    /// An I/O error occurred while setting up capture streams.
    #[error("capture I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CaptureError>;
