//! Core domain logic for the activity accounting engine.
//!
//! This crate contains the pure, I/O-free pieces of per-user time accounting:
//! - Tracking context: who and what is being measured
//! - Activity predicate: visibility plus an idle threshold over input recency
//! - Local accumulator: per-window counters awaiting flush
//! - Daily records: the merge math for the persisted aggregate rows
//!
//! Everything here takes explicit `now` parameters, so the logic is fully
//! testable without timers or a runtime.

mod accumulator;
mod activity;
mod context;
mod record;
mod tracker;

pub use accumulator::LocalAccumulator;
pub use activity::{ActivityMonitor, InputKind};
pub use context::{CourseId, SessionId, TrackingContext, UserId, ValidationError};
pub use record::{DailyRecord, DailyRecordKey, FlushSnapshot};
pub use tracker::{PendingFlush, Tracker};
