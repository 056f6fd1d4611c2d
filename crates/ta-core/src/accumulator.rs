//! In-memory counters for one accumulation window.

use chrono::{DateTime, Utc};

use crate::record::FlushSnapshot;

/// Ephemeral counters owned exclusively by one running engine instance.
///
/// `total_seconds` is derived on every tick from wall time elapsed since the
/// window start; `active_seconds` is accumulated tick-by-tick so a brief dip
/// below the idle threshold never retroactively erases prior active time.
///
/// Invariant: `active_seconds <= total_seconds` after every tick. The tick
/// clamps active time to keep the invariant through clock anomalies (system
/// clock jumps, tab suspend/resume), where derived wall time can shrink.
#[derive(Debug, Clone)]
pub struct LocalAccumulator {
    window_start: DateTime<Utc>,
    total_seconds: i64,
    active_seconds: i64,
    page_views: i64,
}

impl LocalAccumulator {
    /// Opens a fresh all-zero window starting at `now`.
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            total_seconds: 0,
            active_seconds: 0,
            page_views: 0,
        }
    }

    /// Samples the window once.
    ///
    /// Recomputes elapsed wall time (floored to seconds, clamped at zero)
    /// and credits one active second when the active predicate held.
    pub fn tick(&mut self, now: DateTime<Utc>, is_active: bool) {
        self.total_seconds = (now - self.window_start).num_seconds().max(0);
        if is_active {
            self.active_seconds += 1;
        }
        self.active_seconds = self.active_seconds.min(self.total_seconds);
    }

    /// Counts one in-context navigation.
    pub const fn record_page_view(&mut self) {
        self.page_views += 1;
    }

    /// Whether a flush would be a no-op.
    pub const fn is_empty(&self) -> bool {
        self.total_seconds == 0 && self.active_seconds == 0
    }

    /// Captures the current counters for a flush.
    pub const fn snapshot(&self) -> FlushSnapshot {
        FlushSnapshot {
            total_seconds: self.total_seconds,
            active_seconds: self.active_seconds,
            page_views: self.page_views,
        }
    }

    /// Zeroes all counters and restarts the window at `now`.
    pub const fn reset(&mut self, now: DateTime<Utc>) {
        self.window_start = now;
        self.total_seconds = 0;
        self.active_seconds = 0;
        self.page_views = 0;
    }

    /// When the current window began.
    pub const fn window_start(&self) -> DateTime<Utc> {
        self.window_start
    }

    /// Wall-clock seconds elapsed since the window start, as of the last tick.
    pub const fn total_seconds(&self) -> i64 {
        self.total_seconds
    }

    /// Active seconds credited in this window.
    pub const fn active_seconds(&self) -> i64 {
        self.active_seconds
    }

    /// In-context navigations counted in this window.
    pub const fn page_views(&self) -> i64 {
        self.page_views
    }
}
