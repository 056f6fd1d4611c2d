//! Async runtime shell for per-user activity accounting.
//!
//! Wires the pure tracking logic from `ta-core` to real timers and a
//! [`DailyRecordStore`](ta_store::DailyRecordStore): a 1-second tick loop
//! sampling the active predicate, a 30-second flush loop draining the
//! accumulator into the persisted daily rows, host signal intake
//! (visibility, input, navigation), and a best-effort teardown flush.
//!
//! Everything is best-effort telemetry: store failures are logged and
//! swallowed, never surfaced to the learner.

mod clock;
mod config;
mod engine;

pub use clock::{Clock, SystemClock};
pub use config::EngineConfig;
pub use engine::{ActivityEngine, EngineError, EngineState};
