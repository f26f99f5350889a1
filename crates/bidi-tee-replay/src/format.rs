//! Rendering of decoded frames.

use std::io::{self, Write};

use bidi_tee_frame::{channel_label, Frame, STDIN, STDOUT};
use chrono::{Local, TimeZone};

const STDIN_COLOR: &[u8] = b"\x1b[1;31m"; // bold red
const STDOUT_COLOR: &[u8] = b"\x1b[1;34m"; // bold blue
const RESET_COLOR: &[u8] = b"\x1b[0m";

const NS_PER_MS: i64 = 1_000_000;
const NS_PER_SEC: i64 = 1_000_000_000;

/// How (and whether) each rendered frame is prefixed with a timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimestampMode {
    /// Raw payload only.
    #[default]
    None,
    /// Milliseconds since the first frame of the log.
    SinceStart,
    /// Milliseconds since the previous timestamped line.
    Delta,
    /// Local calendar time with nanoseconds.
    Absolute,
}

/// Rendering switches, fixed for a whole replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOptions {
    pub timestamps: TimestampMode,
    /// Wrap stdin and stdout payloads in ANSI colors.
    pub color: bool,
    /// Render control bytes as C-style escapes.
    pub escape: bool,
    /// With `escape`, follow each `\n` escape with a real line break.
    pub break_after_newline: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            timestamps: TimestampMode::None,
            color: true,
            escape: false,
            break_after_newline: true,
        }
    }
}

/// Turns frames into output bytes, carrying line and timestamp state across
/// frames.
#[derive(Debug)]
pub struct Formatter {
    options: FormatOptions,
    origin_ns: Option<i64>,
    delta_ref_ns: Option<i64>,
    last_was_newline: bool,
}

impl Formatter {
    pub fn new(options: FormatOptions) -> Self {
        Self {
            options,
            origin_ns: None,
            delta_ref_ns: None,
            last_was_newline: true,
        }
    }

    pub fn options(&self) -> &FormatOptions {
        &self.options
    }

    /// Note a frame read from the log, rendered or not.
    ///
    /// The first observed frame fixes the since-start origin. Nothing else is
    /// touched, so filtered-out frames never shift delta timestamps.
    pub fn observe(&mut self, frame: &Frame) {
        self.origin_ns.get_or_insert(frame.timestamp_ns);
    }

    /// Render one frame.
    ///
    /// Half-close and exit frames print a one-line notice when timestamps are
    /// on and nothing otherwise.
    pub fn render<W: Write>(&mut self, frame: &Frame, out: &mut W) -> io::Result<()> {
        self.observe(frame);
        let timestamped = self.options.timestamps != TimestampMode::None;

        if frame.channel_closed || frame.is_exit() {
            if !timestamped {
                return Ok(());
            }
            self.start_line(out)?;
            if frame.channel_closed {
                writeln!(out, "<channel {} closed>", frame.channel)?;
            } else {
                writeln!(out, "<exit code {}>", frame.exit_code.unwrap_or_default())?;
            }
            self.last_was_newline = true;
            return Ok(());
        }

        let payload = frame.payload.as_ref();
        let Some(&last) = payload.last() else {
            return Ok(());
        };

        if timestamped {
            self.start_line(out)?;
            self.write_prefix(frame, out)?;
        }
        self.write_content(frame.channel, payload, out)?;

        self.last_was_newline =
            last == b'\n' && (!self.options.escape || self.options.break_after_newline);
        Ok(())
    }

    fn start_line<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        if !self.last_was_newline {
            out.write_all(b"\n")?;
            self.last_was_newline = true;
        }
        Ok(())
    }

    fn write_prefix<W: Write>(&mut self, frame: &Frame, out: &mut W) -> io::Result<()> {
        let label = channel_label(frame.channel);
        let origin = self.origin_ns.unwrap_or(frame.timestamp_ns);
        match self.options.timestamps {
            TimestampMode::None => Ok(()),
            TimestampMode::SinceStart => {
                let elapsed = frame.timestamp_ns - origin;
                write!(
                    out,
                    "{:6}.{:06}ms {label}: ",
                    elapsed / NS_PER_MS,
                    elapsed % NS_PER_MS
                )
            }
            TimestampMode::Delta => {
                let (marker, reference) = match self.delta_ref_ns {
                    Some(reference) => ('+', reference),
                    None => (' ', origin),
                };
                let elapsed = frame.timestamp_ns - reference;
                self.delta_ref_ns = Some(frame.timestamp_ns);
                write!(
                    out,
                    "{marker}{:5}.{:06}ms {label}: ",
                    elapsed / NS_PER_MS,
                    elapsed % NS_PER_MS
                )
            }
            TimestampMode::Absolute => {
                let secs = frame.timestamp_ns.div_euclid(NS_PER_SEC);
                let nanos = frame.timestamp_ns.rem_euclid(NS_PER_SEC);
                match Local.timestamp_opt(secs, nanos as u32).single() {
                    Some(time) => write!(
                        out,
                        "[{}.{nanos:09}] {label}: ",
                        time.format("%Y-%m-%d %H:%M:%S")
                    ),
                    None => write!(out, "[{}ns] {label}: ", frame.timestamp_ns),
                }
            }
        }
    }

    fn write_content<W: Write>(&self, channel: u8, payload: &[u8], out: &mut W) -> io::Result<()> {
        let color = match channel {
            _ if !self.options.color => None,
            STDIN => Some(STDIN_COLOR),
            STDOUT => Some(STDOUT_COLOR),
            _ => None,
        };

        if let Some(color) = color {
            out.write_all(color)?;
        }
        if self.options.escape {
            write_escaped(payload, self.options.break_after_newline, out)?;
        } else {
            out.write_all(payload)?;
        }
        if color.is_some() {
            out.write_all(RESET_COLOR)?;
        }
        Ok(())
    }
}

/// Write `payload` with `\r`, `\t`, `\n` and other bytes below 0x20 escaped.
fn write_escaped<W: Write>(payload: &[u8], break_after_newline: bool, out: &mut W) -> io::Result<()> {
    let mut plain_start = 0;
    for (i, &byte) in payload.iter().enumerate() {
        if byte >= 0x20 {
            continue;
        }
        out.write_all(&payload[plain_start..i])?;
        plain_start = i + 1;
        match byte {
            b'\n' if break_after_newline => out.write_all(b"\\n\n")?,
            b'\n' => out.write_all(b"\\n")?,
            b'\r' => out.write_all(b"\\r")?,
            b'\t' => out.write_all(b"\\t")?,
            other => write!(out, "\\x{other:02x}")?,
        }
    }
    out.write_all(&payload[plain_start..])
}
