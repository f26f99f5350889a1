//! Diagnostics for both binaries.
//!
//! Diagnostics go to the same stderr the child's own stderr is forwarded to,
//! so only events from this workspace's crates are emitted, without ANSI
//! escapes, and nothing below `warn` unless asked for.

use clap::{Args, ValueEnum};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Crates whose events are shown.
const TARGETS: [&str; 4] = [
    "bidi_tee",
    "bidi_tee_frame",
    "bidi_tee_capture",
    "bidi_tee_replay",
];

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Diagnostics options common to both binaries.
#[derive(Args, Debug, Clone, Copy)]
pub struct LoggingArgs {
    /// Log output format (stderr).
    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "text",
        env = "BIDI_TEE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "warn",
        env = "BIDI_TEE_LOG_LEVEL"
    )]
    pub log_level: LogLevel,
}

impl LoggingArgs {
    /// Install the global subscriber. A second call is a no-op.
    pub fn init(self) {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_target(false);
        let filter = workspace_targets(self.log_level);

        let _ = match self.log_format {
            LogFormat::Text => tracing_subscriber::registry()
                .with(layer)
                .with(filter)
                .try_init(),
            LogFormat::Json => tracing_subscriber::registry()
                .with(layer.json())
                .with(filter)
                .try_init(),
        };
    }
}

fn workspace_targets(level: LogLevel) -> Targets {
    Targets::new().with_targets(TARGETS.map(|target| (target, LevelFilter::from(level))))
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn workspace_events_follow_requested_level() {
        let filter = workspace_targets(LogLevel::Info);
        assert!(filter.would_enable("bidi_tee_capture::multiplexer", &Level::INFO));
        assert!(filter.would_enable("bidi_tee_replay", &Level::WARN));
        assert!(!filter.would_enable("bidi_tee_frame::writer", &Level::DEBUG));
    }

    #[test]
    fn other_crates_stay_silent() {
        let filter = workspace_targets(LogLevel::Trace);
        assert!(!filter.would_enable("signal_hook", &Level::ERROR));
        assert!(!filter.would_enable("clap_builder::parser", &Level::ERROR));
    }
}
