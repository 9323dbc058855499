//! Time windows for rate limiting.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Time window over which a request count is bounded.
///
/// Windows are epoch-aligned: every instant belongs to exactly one bucket per
/// window, identified by `now / window length`. Bucket ids only ever move
/// forward, so an expired bucket is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    /// Per-minute rate limiting
    Minute,
    /// Per-hour rate limiting
    Hour,
    /// Per-day rate limiting
    Day,
}

impl Window {
    /// All windows, in consultation order (smallest first).
    pub const ALL: [Window; 3] = [Window::Minute, Window::Hour, Window::Day];

    /// Get the duration of this time window.
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.secs())
    }

    /// Window length in seconds.
    pub fn secs(&self) -> u64 {
        match self {
            Window::Minute => 60,
            Window::Hour => 3600,
            Window::Day => 86400,
        }
    }

    /// Epoch-aligned bucket id for `now` (seconds since the Unix epoch).
    pub fn bucket(&self, now: u64) -> u64 {
        now / self.secs()
    }

    /// Start of the bucket containing `now`, in epoch seconds.
    pub fn bucket_start(&self, now: u64) -> u64 {
        self.bucket(now) * self.secs()
    }

    /// Start of the bucket after the one containing `now`.
    pub fn next_boundary(&self, now: u64) -> u64 {
        self.bucket_start(now) + self.secs()
    }

    /// Seconds until the window containing `now` rolls over.
    pub fn remaining_secs(&self, now: u64) -> u64 {
        self.next_boundary(now) - now
    }

    /// Name used in status maps and storage keys.
    pub fn name(&self) -> &'static str {
        match self {
            Window::Minute => "minute",
            Window::Hour => "hour",
            Window::Day => "day",
        }
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Current wall-clock time as a duration since the Unix epoch.
pub(crate) fn unix_now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}
