use std::ffi::OsString;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use bidi_tee_capture::{capture, CaptureConfig, CaptureError, Child, ParentStreams};
use clap::Parser;
use tracing::info;

use crate::cli::exit::{capture_error, io_error, CliError, CliResult, USAGE};
use crate::cli::LoggingArgs;

#[derive(Parser, Debug)]
#[command(
    name = "bidi-tee",
    version,
    about = "Run a program, recording its stdin, stdout and stderr to a log",
    override_usage = "bidi-tee <OUTPUT-LOGFILE> -- </path/to/program> [PROGRAM-OPTIONS]..."
)]
pub struct CaptureCli {
    /// Log file to write (created or truncated).
    #[arg(value_name = "OUTPUT-LOGFILE")]
    pub output: PathBuf,

    /// Absolute path of the program to run, then its arguments.
    #[arg(last = true, required = true, num_args = 1.., value_name = "PROGRAM")]
    pub command: Vec<OsString>,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

pub fn run(cli: CaptureCli) -> CliResult<i32> {
    let Some((program, args)) = cli.command.split_first() else {
        return Err(CliError::new(USAGE, "expected a program to start after --"));
    };
    let program = Path::new(program);

    let parent = ParentStreams::inherit()
        .map_err(|err| io_error("couldn't duplicate standard streams", err))?;
    let open_log = |child: &Child| -> io::Result<File> {
        let log = File::create(&cli.output)?;
        info!(path = %cli.output.display(), pid = child.id(), "recording session");
        Ok(log)
    };

    let (outcome, _log) = capture(program, args, parent, open_log, &CaptureConfig::default())
        .map_err(|err| match err {
            CaptureError::LogOpen(source) => io_error(
                &format!("couldn't open output file {}", cli.output.display()),
                source,
            ),
            other => capture_error("capture failed", other),
        })?;

    Ok(i32::from(outcome.exit_code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_program_after_separator() {
        let cli = CaptureCli::try_parse_from([
            "bidi-tee",
            "session.log",
            "--",
            "/bin/ls",
            "-l",
            "--color",
        ])
        .expect("capture args should parse");

        assert_eq!(cli.output, PathBuf::from("session.log"));
        assert_eq!(
            cli.command,
            vec![
                OsString::from("/bin/ls"),
                OsString::from("-l"),
                OsString::from("--color")
            ]
        );
    }

    #[test]
    fn requires_separator_and_program() {
        assert!(CaptureCli::try_parse_from(["bidi-tee", "session.log"]).is_err());
        assert!(CaptureCli::try_parse_from(["bidi-tee", "session.log", "--"]).is_err());
        assert!(CaptureCli::try_parse_from(["bidi-tee"]).is_err());
    }

    #[test]
    fn logging_flags_precede_separator() {
        let cli = CaptureCli::try_parse_from([
            "bidi-tee",
            "--log-level",
            "debug",
            "session.log",
            "--",
            "/bin/true",
        ])
        .expect("logging flags should parse");
        assert_eq!(cli.logging.log_level, crate::cli::logging::LogLevel::Debug);
    }
}
