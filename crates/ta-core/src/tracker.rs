//! Per-context tracking state machine.
//!
//! A [`Tracker`] drives one accumulation window at a time: ticks sample the
//! active predicate into the accumulator, navigations either count a page
//! view or rotate the window to a new context, and flushes drain the window.
//! All I/O (actually persisting the drained snapshot) lives with the caller.

use chrono::{DateTime, Duration, Utc};

use crate::accumulator::LocalAccumulator;
use crate::activity::ActivityMonitor;
use crate::context::TrackingContext;
use crate::record::FlushSnapshot;

/// A drained window awaiting persistence.
///
/// Carries the context the counters were accumulated under, which may no
/// longer be the tracker's current context by the time it is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFlush {
    pub context: TrackingContext,
    pub snapshot: FlushSnapshot,
}

/// Tracks activity for one context, rotating windows on flush and navigation.
#[derive(Debug, Clone)]
pub struct Tracker {
    context: TrackingContext,
    monitor: ActivityMonitor,
    accumulator: LocalAccumulator,
    idle_threshold: Duration,
}

impl Tracker {
    /// Starts tracking `context` with an all-zero window beginning at `now`.
    ///
    /// The navigation that mounted the page is not counted here; the caller
    /// reports it through [`Self::page_view`] or [`Self::navigate`].
    pub const fn new(context: TrackingContext, idle_threshold: Duration, now: DateTime<Utc>) -> Self {
        Self {
            context,
            monitor: ActivityMonitor::new(now),
            accumulator: LocalAccumulator::new(now),
            idle_threshold,
        }
    }

    /// Samples visibility and input recency once, updating the accumulator.
    ///
    /// Returns whether this tick counted as active.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        let is_active = self.monitor.is_active(now, self.idle_threshold);
        self.accumulator.tick(now, is_active);
        is_active
    }

    /// Records a qualifying input at `now`.
    pub fn note_input(&mut self, now: DateTime<Utc>) {
        self.monitor.note_input(now);
    }

    /// Updates the foreground/background state.
    pub const fn set_visible(&mut self, visible: bool) {
        self.monitor.set_visible(visible);
    }

    /// Counts a navigation that stayed within the current context.
    pub const fn page_view(&mut self) {
        self.accumulator.record_page_view();
    }

    /// Handles a navigation event.
    ///
    /// Within the current context this counts a page view. A navigation that
    /// changes context drains the old window first - the returned flush is
    /// keyed to the old context - and the page view lands in the fresh
    /// all-zero window of the new context.
    pub fn navigate(
        &mut self,
        context: TrackingContext,
        now: DateTime<Utc>,
    ) -> Option<PendingFlush> {
        if context == self.context {
            self.accumulator.record_page_view();
            return None;
        }
        let pending = self.replace_context(context, now);
        self.accumulator.record_page_view();
        pending
    }

    /// Switches to a new context without counting a navigation.
    ///
    /// No-op when the context is unchanged.
    pub fn set_context(
        &mut self,
        context: TrackingContext,
        now: DateTime<Utc>,
    ) -> Option<PendingFlush> {
        if context == self.context {
            return None;
        }
        self.replace_context(context, now)
    }

    /// Drains the current window for persistence.
    ///
    /// Returns `None` when no time has accumulated (the no-op flush case);
    /// otherwise snapshots the counters and resets the window at `now`. The
    /// reset happens here, before any persistence attempt, so a failed write
    /// discards the snapshot rather than re-merging it later.
    pub fn take_flush(&mut self, now: DateTime<Utc>) -> Option<PendingFlush> {
        if self.accumulator.is_empty() {
            return None;
        }
        let pending = PendingFlush {
            context: self.context.clone(),
            snapshot: self.accumulator.snapshot(),
        };
        self.accumulator.reset(now);
        Some(pending)
    }

    fn replace_context(
        &mut self,
        context: TrackingContext,
        now: DateTime<Utc>,
    ) -> Option<PendingFlush> {
        let pending = self.take_flush(now);
        self.context = context;
        // take_flush skips the reset for empty windows; restart unconditionally
        // so stale page views never leak into the new context.
        self.accumulator.reset(now);
        pending
    }

    /// The context currently being tracked.
    pub const fn context(&self) -> &TrackingContext {
        &self.context
    }

    /// The current window's counters.
    pub const fn accumulator(&self) -> &LocalAccumulator {
        &self.accumulator
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use crate::context::{CourseId, UserId};

    use super::*;

    fn ts(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0)
            .single()
            .expect("valid test timestamp")
            + Duration::seconds(seconds)
    }

    fn course_context(course: &str) -> TrackingContext {
        TrackingContext::new(UserId::new("u1").unwrap())
            .with_course(CourseId::new(course).unwrap())
    }

    fn tracker() -> Tracker {
        Tracker::new(course_context("c1"), Duration::seconds(60), ts(0))
    }

    #[test]
    fn ticks_accumulate_while_engaged() {
        let mut tracker = tracker();
        for t in 1..=30 {
            assert!(tracker.tick(ts(t)));
        }
        assert_eq!(tracker.accumulator().total_seconds(), 30);
        assert_eq!(tracker.accumulator().active_seconds(), 30);
    }

    #[test]
    fn idle_ticks_stop_crediting_active_time() {
        let mut tracker = tracker();
        // Last input at t=0 (startup); threshold 60s.
        for t in 1..=90 {
            let active = tracker.tick(ts(t));
            assert_eq!(active, t <= 60, "unexpected active state at tick {t}");
        }
        assert_eq!(tracker.accumulator().total_seconds(), 90);
        assert_eq!(tracker.accumulator().active_seconds(), 60);
    }

    #[test]
    fn backgrounded_ticks_are_inactive() {
        let mut tracker = tracker();
        tracker.note_input(ts(1));
        tracker.set_visible(false);
        assert!(!tracker.tick(ts(2)));
        tracker.set_visible(true);
        assert!(tracker.tick(ts(3)));
    }

    #[test]
    fn same_context_navigation_counts_page_view() {
        let mut tracker = tracker();
        tracker.page_view();
        assert!(tracker.navigate(course_context("c1"), ts(5)).is_none());
        assert_eq!(tracker.accumulator().page_views(), 2);
    }

    #[test]
    fn context_change_drains_old_window_first() {
        let mut tracker = tracker();
        tracker.page_view();
        for t in 1..=45 {
            tracker.tick(ts(t));
        }

        let pending = tracker
            .navigate(course_context("c2"), ts(45))
            .expect("accumulated window must flush");
        assert_eq!(pending.context, course_context("c1"));
        assert_eq!(pending.snapshot.total_seconds, 45);
        assert_eq!(pending.snapshot.active_seconds, 45);
        assert_eq!(pending.snapshot.page_views, 1);

        // New context starts from a fresh window, holding only the navigation
        // that brought the user there.
        assert_eq!(tracker.context(), &course_context("c2"));
        assert_eq!(tracker.accumulator().total_seconds(), 0);
        assert_eq!(tracker.accumulator().active_seconds(), 0);
        assert_eq!(tracker.accumulator().page_views(), 1);
    }

    #[test]
    fn context_change_with_empty_window_skips_flush() {
        let mut tracker = tracker();
        tracker.page_view();
        let pending = tracker.set_context(course_context("c2"), ts(0));
        assert!(pending.is_none());
        // The old context's stale page view is gone.
        assert_eq!(tracker.accumulator().page_views(), 0);
    }

    #[test]
    fn take_flush_resets_window() {
        let mut tracker = tracker();
        tracker.page_view();
        for t in 1..=30 {
            tracker.tick(ts(t));
        }

        let pending = tracker.take_flush(ts(30)).expect("window is non-empty");
        assert_eq!(pending.snapshot.total_seconds, 30);
        assert_eq!(pending.snapshot.page_views, 1);
        assert!(tracker.accumulator().is_empty());
        assert_eq!(tracker.accumulator().window_start(), ts(30));

        // Nothing accumulated since the reset: the next flush is a no-op.
        assert!(tracker.take_flush(ts(30)).is_none());
    }

    #[test]
    fn remaining_time_accumulates_into_fresh_window() {
        let mut tracker = tracker();
        for t in 1..=30 {
            tracker.tick(ts(t));
        }
        tracker.take_flush(ts(30)).expect("window is non-empty");

        for t in 31..=45 {
            tracker.tick(ts(t));
        }
        assert_eq!(tracker.accumulator().total_seconds(), 15);
        assert_eq!(tracker.accumulator().active_seconds(), 15);
    }
}
