//! Wall-clock abstraction.
//!
//! The engine loop reads time through this trait so the timer-driven paths
//! can run under virtual time in tests.

use chrono::{DateTime, Local, NaiveDate, Utc};

/// Source of the current instant and the application-local calendar date.
pub trait Clock: Send + Sync + 'static {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;

    /// The application-local calendar date.
    ///
    /// This is the date a flush is attributed to: a window spanning local
    /// midnight lands entirely on the flush-time day.
    fn today(&self) -> NaiveDate;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}
