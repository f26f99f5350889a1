//! Capture timestamps.
//!
//! Timestamps come from the monotonic clock, rebased once onto the Unix epoch
//! so they read as wall-clock time. The offset is sampled on first use and
//! kept for the life of the process; later wall-clock adjustments do not move
//! timestamps.

use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

static BASE: OnceLock<(Instant, i64)> = OnceLock::new();

/// Current capture time in nanoseconds since the Unix epoch.
pub fn timestamp_ns() -> i64 {
    let (mono, wall_ns) = *BASE.get_or_init(|| {
        let mono = Instant::now();
        let wall_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        (mono, wall_ns)
    });
    let elapsed = i64::try_from(mono.elapsed().as_nanos()).unwrap_or(i64::MAX);
    wall_ns.saturating_add(elapsed)
}
