use std::fmt;
use std::io;

use bidi_tee_capture::CaptureError;
use bidi_tee_replay::ReplayError;

// Exit codes shared by both binaries. A successful capture exits with the
// child's own code instead.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const USAGE: i32 = 2;
pub const LOG_WRITE: i32 = 120;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(FAILURE, format!("{context}: {err}"))
}

pub fn capture_error(context: &str, err: CaptureError) -> CliError {
    match err {
        CaptureError::Log(_) => CliError::new(LOG_WRITE, format!("{context}: {err}")),
        CaptureError::InvalidArgument(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

pub fn replay_error(context: &str, err: ReplayError) -> CliError {
    match err {
        ReplayError::InvalidSelection { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use bidi_tee_frame::FrameError;

    use super::*;

    #[test]
    fn log_write_failures_have_their_own_code() {
        let err = CaptureError::Log(FrameError::ShortWrite {
            expected: 20,
            written: 16,
        });
        assert_eq!(capture_error("capture failed", err).code, LOG_WRITE);
    }

    #[test]
    fn spawn_failures_are_generic_failures() {
        let err = CaptureError::Pipe(io::Error::from(io::ErrorKind::Other));
        let cli = capture_error("capture failed", err);
        assert_eq!(cli.code, FAILURE);
        assert!(cli.message.starts_with("capture failed: couldn't open pipes"));
    }

    #[test]
    fn truncation_is_a_failure() {
        let err = ReplayError::Frame(FrameError::Truncated {
            what: "payload",
            expected: 4,
            got: 1,
        });
        let cli = replay_error("replay failed", err);
        assert_eq!(cli.code, FAILURE);
        assert!(cli.message.contains("unexpected end of file"));
    }
}
