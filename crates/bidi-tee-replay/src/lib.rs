//! Replay engine for bidi-tee session logs.
//!
//! Streams frames out of a log, drops the ones outside the [`ChannelFilter`],
//! and renders the rest through a [`Formatter`].

pub mod error;
pub mod filter;
pub mod format;

use std::io::{Read, Write};

use bidi_tee_frame::FrameReader;
use tracing::debug;

pub use error::{ReplayError, Result};
pub use filter::ChannelFilter;
pub use format::{FormatOptions, Formatter, TimestampMode};

/// Counters from one replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub frames_read: u64,
    pub frames_rendered: u64,
}

/// Render every selected frame of `log` to `out`.
///
/// Output produced before a decode error (e.g. a truncated final record) is
/// kept and flushed; the error is then returned.
pub fn replay<R: Read, W: Write>(
    log: R,
    filter: &ChannelFilter,
    formatter: &mut Formatter,
    out: &mut W,
) -> Result<ReplayStats> {
    let mut stats = ReplayStats::default();
    let result = render_frames(FrameReader::new(log), filter, formatter, out, &mut stats);
    out.flush()?;
    debug!(
        frames_read = stats.frames_read,
        frames_rendered = stats.frames_rendered,
        "replay finished"
    );
    result.map(|()| stats)
}

fn render_frames<R: Read, W: Write>(
    reader: FrameReader<R>,
    filter: &ChannelFilter,
    formatter: &mut Formatter,
    out: &mut W,
    stats: &mut ReplayStats,
) -> Result<()> {
    for frame in reader {
        let frame = frame?;
        stats.frames_read += 1;
        formatter.observe(&frame);
        if !filter.contains(frame.channel) {
            continue;
        }
        formatter.render(&frame, out)?;
        stats.frames_rendered += 1;
    }
    Ok(())
}
