use bidi_tee_frame::FrameError;

/// Errors that can occur while replaying a session log.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// The log could not be decoded (including truncation).
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Writing rendered output failed.
    #[error("output error: {0}")]
    Io(#[from] std::io::Error),

    /// A channel selection list could not be parsed.
    #[error("invalid channel selection {input:?}: {reason}")]
    InvalidSelection { input: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ReplayError>;
