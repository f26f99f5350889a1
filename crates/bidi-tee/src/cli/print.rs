use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;

use bidi_tee_replay::{replay, ChannelFilter, FormatOptions, Formatter, TimestampMode};
use clap::{ArgAction, Parser, ValueEnum};
use tracing::debug;

use crate::cli::exit::{io_error, replay_error, CliResult, SUCCESS};
use crate::cli::LoggingArgs;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TimestampArg {
    /// Time since start of recording.
    #[value(name = "s", alias = "start")]
    Start,
    /// Absolute local time.
    #[value(name = "a", alias = "absolute")]
    Absolute,
    /// Time since the previous timestamped line.
    #[value(name = "d", alias = "delta")]
    Delta,
}

impl From<TimestampArg> for TimestampMode {
    fn from(arg: TimestampArg) -> Self {
        match arg {
            TimestampArg::Start => TimestampMode::SinceStart,
            TimestampArg::Absolute => TimestampMode::Absolute,
            TimestampArg::Delta => TimestampMode::Delta,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "bidi-tee-print",
    version,
    about = "Print a log recorded by bidi-tee"
)]
pub struct PrintCli {
    /// Log file recorded by bidi-tee.
    #[arg(value_name = "BIDI-TEE-LOGFILE")]
    pub input: PathBuf,

    /// Toggle printing in color (default: on).
    #[arg(short = 'c', long = "color", action = ArgAction::Count)]
    pub toggle_color: u8,

    /// Toggle C-escaped output (default: off).
    #[arg(short = 'e', long = "escape", action = ArgAction::Count)]
    pub toggle_escape: u8,

    /// With -e: toggle starting a new line after '\n' (default: on).
    #[arg(short = 'n', long = "newline-break", action = ArgAction::Count)]
    pub toggle_newline_break: u8,

    /// Print timestamps: s = since start of recording, a = absolute,
    /// d = delta relative to the last print.
    #[arg(short = 't', long = "timestamps", value_name = "MODE")]
    pub timestamps: Option<TimestampArg>,

    /// Comma-separated list of channels to print, e.g. 0,2 prints stdin and
    /// stderr (default: 0,1,2,15).
    #[arg(short = 's', long = "select", value_name = "CHANNELS")]
    pub select: Option<ChannelFilter>,

    /// Write output to this file instead of stdout.
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

impl PrintCli {
    /// Apply the toggles to the default rendering options.
    pub fn format_options(&self) -> FormatOptions {
        let defaults = FormatOptions::default();
        FormatOptions {
            timestamps: self.timestamps.map(Into::into).unwrap_or_default(),
            color: defaults.color ^ odd(self.toggle_color),
            escape: defaults.escape ^ odd(self.toggle_escape),
            break_after_newline: defaults.break_after_newline ^ odd(self.toggle_newline_break),
        }
    }
}

fn odd(count: u8) -> bool {
    count % 2 == 1
}

pub fn run(cli: PrintCli) -> CliResult<i32> {
    let options = cli.format_options();
    let filter = cli.select.unwrap_or_default();
    debug!(?options, ?filter, "replaying {}", cli.input.display());

    let input = File::open(&cli.input).map_err(|err| {
        io_error(&format!("couldn't open input {}", cli.input.display()), err)
    })?;
    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(BufWriter::new(File::create(path).map_err(|err| {
            io_error(&format!("couldn't open output file {}", path.display()), err)
        })?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut formatter = Formatter::new(options);
    replay(BufReader::new(input), &filter, &mut formatter, &mut out)
        .map_err(|err| replay_error("replay failed", err))?;

    Ok(SUCCESS)
}
