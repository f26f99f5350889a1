use std::fmt;
use std::str::FromStr;

use bidi_tee_frame::{EXIT, MAX_CHANNEL, STDERR, STDIN, STDOUT};

use crate::error::ReplayError;

/// The set of channels replay renders.
///
/// Stored as a 16-bit mask, one bit per possible channel id.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ChannelFilter {
    mask: u16,
}

impl ChannelFilter {
    /// A filter selecting exactly `channels`. Ids above 15 are ignored.
    pub fn new(channels: impl IntoIterator<Item = u8>) -> Self {
        let mask = channels
            .into_iter()
            .filter(|&ch| ch <= MAX_CHANNEL)
            .fold(0u16, |mask, ch| mask | (1 << ch));
        Self { mask }
    }

    /// True if frames on `channel` should be rendered.
    pub fn contains(&self, channel: u8) -> bool {
        channel <= MAX_CHANNEL && self.mask & (1 << channel) != 0
    }

    /// Selected channel ids in ascending order.
    pub fn channels(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=MAX_CHANNEL).filter(|&ch| self.contains(ch))
    }
}

/// stdin, stdout, stderr and the exit marker.
impl Default for ChannelFilter {
    fn default() -> Self {
        Self::new([STDIN, STDOUT, STDERR, EXIT])
    }
}

impl fmt::Debug for ChannelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.channels()).finish()
    }
}

/// Parses a comma-separated list such as `0,2` or `1, 15`.
impl FromStr for ChannelFilter {
    type Err = ReplayError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ReplayError::InvalidSelection {
            input: input.to_string(),
            reason,
        };

        let mut channels = Vec::new();
        for token in input.split(',') {
            let token = token.trim();
            if token.is_empty() {
                return Err(invalid("empty channel id".to_string()));
            }
            let channel: u8 = token
                .parse()
                .map_err(|_| invalid(format!("{token:?} is not a channel id")))?;
            if channel > MAX_CHANNEL {
                return Err(invalid(format!("channel {channel} out of range 0-15")));
            }
            channels.push(channel);
        }
        Ok(Self::new(channels))
    }
}
