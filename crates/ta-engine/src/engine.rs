//! Engine lifecycle and the tick/flush loop.

use std::sync::Arc;

use ta_core::{DailyRecord, DailyRecordKey, InputKind, PendingFlush, Tracker, TrackingContext};
use ta_store::DailyRecordStore;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;

/// Engine lifecycle errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// `start` was called while the engine was already running.
    #[error("engine is already running")]
    AlreadyRunning,
    /// A signal or stop was issued while the engine was not running.
    #[error("engine is not running")]
    NotRunning,
    /// `start` was called on a stopped engine; stopped engines stay stopped.
    #[error("engine has been stopped")]
    Stopped,
}

/// Engine lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No tracking context yet: no timers, no I/O.
    Uninitialized,
    /// Timers running, accumulating into the current window.
    Running,
    /// Final drain in progress.
    Draining,
    /// Terminal. A new engine instance is needed to resume tracking.
    Stopped,
}

/// Signals forwarded from the hosting application.
enum HostSignal {
    Visibility(bool),
    Input(InputKind),
    Navigate(TrackingContext),
    SetContext(TrackingContext),
}

/// One per-user activity accounting engine instance.
///
/// Owns the tick and flush timers for a single tracking context at a time.
/// Construction leaves the engine uninitialized; [`start`](Self::start)
/// requires a full [`TrackingContext`], so tracking can never begin without
/// an authenticated user.
///
/// All store failures are swallowed here after logging: losing a sliver of
/// telemetry must never degrade the learner's experience.
pub struct ActivityEngine<S> {
    store: Arc<S>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    state: EngineState,
    running: Option<RunningEngine>,
}

struct RunningEngine {
    signals: mpsc::UnboundedSender<HostSignal>,
    cancel: CancellationToken,
    worker: JoinHandle<()>,
}

impl<S: DailyRecordStore + 'static> ActivityEngine<S> {
    /// Creates an uninitialized engine against the given store.
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Creates an uninitialized engine reading time from `clock`.
    pub fn with_clock(store: Arc<S>, config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
            state: EngineState::Uninitialized,
            running: None,
        }
    }

    /// The current lifecycle state.
    pub const fn state(&self) -> EngineState {
        self.state
    }

    /// Starts tracking under `context`, spawning the tick/flush loop.
    ///
    /// The mount itself counts as the first in-context navigation. Must be
    /// called from within a tokio runtime.
    pub fn start(&mut self, context: TrackingContext) -> Result<(), EngineError> {
        match self.state {
            EngineState::Uninitialized => {}
            EngineState::Running | EngineState::Draining => return Err(EngineError::AlreadyRunning),
            EngineState::Stopped => return Err(EngineError::Stopped),
        }

        let (signals, receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(run(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            self.config.clone(),
            context,
            receiver,
            cancel.clone(),
        ));
        self.running = Some(RunningEngine {
            signals,
            cancel,
            worker,
        });
        self.state = EngineState::Running;
        tracing::debug!("engine started");
        Ok(())
    }

    /// Forwards a foreground/background transition.
    pub fn set_visibility(&self, visible: bool) -> Result<(), EngineError> {
        self.send(HostSignal::Visibility(visible))
    }

    /// Forwards a qualifying input event.
    pub fn record_input(&self, kind: InputKind) -> Result<(), EngineError> {
        self.send(HostSignal::Input(kind))
    }

    /// Forwards a navigation event with the routing-derived context.
    ///
    /// An unchanged context counts a page view; a changed context drains the
    /// old window first and starts a fresh one.
    pub fn navigate(&self, context: TrackingContext) -> Result<(), EngineError> {
        self.send(HostSignal::Navigate(context))
    }

    /// Switches context without counting a navigation.
    ///
    /// Performs drain-then-reinitialize when the context actually changed.
    pub fn set_context(&self, context: TrackingContext) -> Result<(), EngineError> {
        self.send(HostSignal::SetContext(context))
    }

    /// Stops the engine: cancels the timers synchronously, drains the final
    /// window with a bounded wait, and transitions to the terminal state.
    ///
    /// No tick fires after cancellation begins. A flush already in flight is
    /// not cancelled, but its outcome has no further effect.
    pub async fn stop(&mut self) -> Result<(), EngineError> {
        let Some(running) = self.running.take() else {
            return Err(EngineError::NotRunning);
        };
        self.state = EngineState::Draining;
        running.cancel.cancel();
        if running.worker.await.is_err() {
            tracing::warn!("engine worker panicked during drain");
        }
        self.state = EngineState::Stopped;
        tracing::debug!("engine stopped");
        Ok(())
    }

    fn send(&self, signal: HostSignal) -> Result<(), EngineError> {
        let Some(running) = self.running.as_ref() else {
            return Err(EngineError::NotRunning);
        };
        running
            .signals
            .send(signal)
            .map_err(|_| EngineError::NotRunning)
    }
}

/// The engine loop: everything that touches the tracker runs here, so the
/// accumulator is owned by exactly one logical flow.
async fn run<S: DailyRecordStore + 'static>(
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    context: TrackingContext,
    mut signals: mpsc::UnboundedReceiver<HostSignal>,
    cancel: CancellationToken,
) {
    let mut tracker = Tracker::new(context, config.idle_threshold(), clock.now());
    // The mount is the first in-context navigation.
    tracker.page_view();

    // First tick one full period after start; a tick at elapsed zero would
    // credit an active second before any wall time has passed.
    let mut ticker = interval_at(
        Instant::now() + config.tick_interval(),
        config.tick_interval(),
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut flusher = interval_at(
        Instant::now() + config.flush_interval(),
        config.flush_interval(),
    );
    flusher.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = ticker.tick() => {
                tracker.tick(clock.now());
            }
            _ = flusher.tick() => {
                // Snapshot-and-reset happens here; the store round trip runs
                // on its own task so ticks keep accumulating into the fresh
                // window while the write is in flight.
                if let Some(pending) = tracker.take_flush(clock.now()) {
                    spawn_flush(&store, &clock, pending);
                } else {
                    tracing::trace!("window empty, skipping flush");
                }
            }
            signal = signals.recv() => match signal {
                Some(HostSignal::Visibility(visible)) => {
                    tracing::trace!(visible, "visibility changed");
                    tracker.set_visible(visible);
                }
                Some(HostSignal::Input(kind)) => {
                    tracing::trace!(kind = kind.as_str(), "qualifying input");
                    tracker.note_input(clock.now());
                }
                Some(HostSignal::Navigate(context)) => {
                    if let Some(pending) = tracker.navigate(context, clock.now()) {
                        tracing::debug!("context changed, draining previous window");
                        spawn_flush(&store, &clock, pending);
                    }
                }
                Some(HostSignal::SetContext(context)) => {
                    if let Some(pending) = tracker.set_context(context, clock.now()) {
                        tracing::debug!("context replaced, draining previous window");
                        spawn_flush(&store, &clock, pending);
                    }
                }
                // Host dropped the handle: tear down as if stopped.
                None => break,
            },
            () = cancel.cancelled() => break,
        }
    }

    // Best-effort teardown flush. Wait briefly so the common case lands, but
    // never hold up host teardown: the spawned task finishes (or not) on its
    // own after the timeout.
    if let Some(pending) = tracker.take_flush(clock.now()) {
        let flush = spawn_flush(&store, &clock, pending);
        if timeout(config.teardown_flush_wait(), flush).await.is_err() {
            tracing::debug!("teardown flush still in flight, not waiting");
        }
    }
}

fn spawn_flush<S: DailyRecordStore + 'static>(
    store: &Arc<S>,
    clock: &Arc<dyn Clock>,
    pending: PendingFlush,
) -> JoinHandle<()> {
    let store = Arc::clone(store);
    let clock = Arc::clone(clock);
    tokio::spawn(async move { flush_pending(store.as_ref(), clock.as_ref(), &pending).await })
}

/// Merges one drained snapshot into the persisted daily record.
///
/// Read-modify-write with no concurrency control: a read failure falls
/// through to an insert attempt, and any write failure drops the snapshot.
/// The accumulator was already reset when the snapshot was taken, so failure
/// handling here is logging only.
async fn flush_pending<S: DailyRecordStore + ?Sized>(
    store: &S,
    clock: &dyn Clock,
    pending: &PendingFlush,
) {
    let now = clock.now();
    let key = DailyRecordKey::new(&pending.context, clock.today());

    let existing = match store.fetch(&key).await {
        Ok(existing) => existing,
        Err(err) => {
            tracing::warn!(error = %err, "daily record read failed, attempting insert");
            None
        }
    };

    let result = match existing {
        Some(record) => store.update(&record.merged(&pending.snapshot, now)).await,
        None => {
            store
                .insert(&DailyRecord::from_snapshot(key, &pending.snapshot, now))
                .await
        }
    };

    if let Err(err) = result {
        tracing::warn!(
            error = %err,
            total_seconds = pending.snapshot.total_seconds,
            active_seconds = pending.snapshot.active_seconds,
            "daily record write failed, snapshot dropped"
        );
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use ta_core::{CourseId, FlushSnapshot, UserId};
    use ta_store::MemoryStore;

    use super::*;

    struct FixedClock {
        now: DateTime<Utc>,
        today: NaiveDate,
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.now
        }

        fn today(&self) -> NaiveDate {
            self.today
        }
    }

    fn clock() -> FixedClock {
        FixedClock {
            now: Utc.with_ymd_and_hms(2025, 3, 10, 9, 30, 0).single().unwrap(),
            today: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
        }
    }

    fn context() -> TrackingContext {
        TrackingContext::new(UserId::new("u1").unwrap())
            .with_course(CourseId::new("c1").unwrap())
    }

    fn pending(total: i64, active: i64, views: i64) -> PendingFlush {
        PendingFlush {
            context: context(),
            snapshot: FlushSnapshot {
                total_seconds: total,
                active_seconds: active,
                page_views: views,
            },
        }
    }

    #[tokio::test]
    async fn flush_inserts_when_absent() {
        let store = MemoryStore::new();
        let clock = clock();
        flush_pending(&store, &clock, &pending(30, 25, 1)).await;

        let key = DailyRecordKey::new(&context(), clock.today());
        let record = store.record(&key).expect("record created");
        assert_eq!(record.total_seconds, 30);
        assert_eq!(record.active_seconds, 25);
        assert_eq!(record.page_views, 1);
        assert_eq!(record.last_activity_at, clock.now());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn flush_merges_into_existing_record() {
        let store = MemoryStore::new();
        let clock = clock();
        flush_pending(&store, &clock, &pending(100, 80, 3)).await;
        flush_pending(&store, &clock, &pending(30, 25, 1)).await;

        let key = DailyRecordKey::new(&context(), clock.today());
        let record = store.record(&key).expect("record exists");
        assert_eq!(record.total_seconds, 130);
        assert_eq!(record.active_seconds, 105);
        assert_eq!(record.page_views, 4);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn read_failure_falls_through_to_insert() {
        let store = MemoryStore::new();
        let clock = clock();
        store.set_fail_reads(true);
        flush_pending(&store, &clock, &pending(30, 25, 1)).await;

        // The insert still happened despite the failed read.
        let key = DailyRecordKey::new(&context(), clock.today());
        assert!(store.record(&key).is_some());
    }

    #[tokio::test]
    async fn write_failure_is_swallowed() {
        let store = MemoryStore::new();
        let clock = clock();
        store.set_fail_writes(true);
        flush_pending(&store, &clock, &pending(30, 25, 1)).await;

        // Snapshot dropped, nothing persisted, no panic.
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn read_failure_collision_surfaces_as_dropped_write() {
        let store = MemoryStore::new();
        let clock = clock();
        flush_pending(&store, &clock, &pending(100, 80, 3)).await;

        // A failed read on a key that does exist collides on insert; the
        // snapshot is lost and the existing row is untouched.
        store.set_fail_reads(true);
        flush_pending(&store, &clock, &pending(30, 25, 1)).await;

        let key = DailyRecordKey::new(&context(), clock.today());
        let record = store.record(&key).expect("original record intact");
        assert_eq!(record.total_seconds, 100);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn lifecycle_guards() {
        let store = Arc::new(MemoryStore::new());
        let mut engine = ActivityEngine::new(Arc::clone(&store), EngineConfig::default());
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert_eq!(
            engine.record_input(InputKind::Click),
            Err(EngineError::NotRunning)
        );

        engine.start(context()).unwrap();
        assert_eq!(engine.state(), EngineState::Running);
        assert_eq!(engine.start(context()), Err(EngineError::AlreadyRunning));

        engine.stop().await.unwrap();
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(engine.stop().await, Err(EngineError::NotRunning));
        // Stopped is terminal.
        assert_eq!(engine.start(context()), Err(EngineError::Stopped));
    }
}
