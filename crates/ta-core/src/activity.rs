//! Presence and attention signals.
//!
//! Combines two push-based monitors into a single "active" predicate:
//! document visibility (foreground/background) and recency of the last
//! qualifying user input against an idle threshold.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The qualifying input event classes.
///
/// These are recorded passively at the document level by the host; none of
/// them block or delay the underlying event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    PointerDown,
    PointerMove,
    KeyDown,
    Scroll,
    TouchStart,
    Click,
}

impl InputKind {
    /// String representation for diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PointerDown => "pointer_down",
            Self::PointerMove => "pointer_move",
            Self::KeyDown => "key_down",
            Self::Scroll => "scroll",
            Self::TouchStart => "touch_start",
            Self::Click => "click",
        }
    }
}

/// Tracks visibility and input recency for one engine instance.
///
/// Both signals are last-known values with no error states: visibility
/// defaults to foregrounded at startup, and the last input timestamp starts
/// at the instant the monitor is created (opening the page counts as
/// engagement).
#[derive(Debug, Clone)]
pub struct ActivityMonitor {
    visible: bool,
    last_input_at: DateTime<Utc>,
}

impl ActivityMonitor {
    /// Creates a monitor considering the user present as of `now`.
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            visible: true,
            last_input_at: now,
        }
    }

    /// Updates the foreground/background state.
    pub const fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Whether the document is currently foregrounded.
    pub const fn is_visible(&self) -> bool {
        self.visible
    }

    /// Records a qualifying input at `now`.
    pub fn note_input(&mut self, now: DateTime<Utc>) {
        self.last_input_at = now;
    }

    /// Timestamp of the most recent qualifying input.
    pub const fn last_input_at(&self) -> DateTime<Utc> {
        self.last_input_at
    }

    /// The active predicate: foregrounded and input within the idle threshold.
    ///
    /// The threshold is inclusive - a tick exactly at the threshold still
    /// counts as active.
    pub fn is_active(&self, now: DateTime<Utc>, idle_threshold: Duration) -> bool {
        self.visible && now - self.last_input_at <= idle_threshold
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn ts(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0)
            .single()
            .expect("valid test timestamp")
            + Duration::seconds(seconds)
    }

    #[test]
    fn starts_visible_and_active() {
        let monitor = ActivityMonitor::new(ts(0));
        assert!(monitor.is_visible());
        assert!(monitor.is_active(ts(0), Duration::seconds(60)));
    }

    #[test]
    fn idle_transition_at_threshold() {
        let mut monitor = ActivityMonitor::new(ts(-100));
        monitor.note_input(ts(0));

        let threshold = Duration::seconds(60);
        for t in 0..=60 {
            assert!(monitor.is_active(ts(t), threshold), "tick {t} should be active");
        }
        assert!(!monitor.is_active(ts(61), threshold));
        assert!(!monitor.is_active(ts(120), threshold));
    }

    #[test]
    fn visibility_gates_activity() {
        let mut monitor = ActivityMonitor::new(ts(0));
        monitor.note_input(ts(5));
        monitor.set_visible(false);

        // Recent input does not matter while backgrounded.
        assert!(!monitor.is_active(ts(6), Duration::seconds(60)));

        monitor.set_visible(true);
        assert!(monitor.is_active(ts(6), Duration::seconds(60)));
    }

    #[test]
    fn new_input_resets_idle_window() {
        let mut monitor = ActivityMonitor::new(ts(0));
        let threshold = Duration::seconds(60);

        assert!(!monitor.is_active(ts(61), threshold));
        monitor.note_input(ts(61));
        assert!(monitor.is_active(ts(61), threshold));
        assert!(monitor.is_active(ts(121), threshold));
        assert!(!monitor.is_active(ts(122), threshold));
    }

    #[test]
    fn input_kind_as_str() {
        assert_eq!(InputKind::PointerMove.as_str(), "pointer_move");
        assert_eq!(InputKind::Scroll.as_str(), "scroll");
    }
}
