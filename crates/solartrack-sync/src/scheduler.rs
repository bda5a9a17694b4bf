//! The poll loop.
//!
//! A single tokio task drives a one-second countdown and runs poll cycles
//! inline, so timed cycles never overlap. Manual triggers claim the in-flight
//! flag synchronously and hand the cycle to the same task; a trigger that
//! finds the flag already set is rejected.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use solartrack_model::{ChangeAction, TableKind, TableSnapshot};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::engine::{lock_engine, SharedEngine};
use crate::events::{EventHub, PollState, PollStatus};
use crate::sheets::SheetWriter;
use crate::source::TableSource;
use crate::sync_client::SyncClient;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

pub const STARTING_SUMMARY: &str = "Starting data refresh...";
pub const REFRESHED_SUMMARY: &str = "Data refreshed successfully";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval_secs: u64,
    /// Run one cycle as soon as the scheduler starts.
    pub poll_on_start: bool,
    /// Push highlights for detected changes at the end of each cycle.
    pub auto_sync: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            poll_on_start: true,
            auto_sync: true,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    /// A cycle is already in flight; the trigger was ignored.
    AlreadyPolling,
    /// The scheduler has been shut down.
    Stopped,
}

struct Shared {
    interval_secs: u64,
    in_flight: AtomicBool,
    cancelled: AtomicBool,
    paused: AtomicBool,
    countdown: AtomicU64,
    run_now: Notify,
    shutdown: Notify,
    events: Arc<EventHub>,
}

impl Shared {
    fn try_claim(&self) -> bool {
        !self.in_flight.swap(true, Ordering::SeqCst)
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn reset_countdown(&self) {
        self.countdown.store(self.interval_secs, Ordering::SeqCst);
    }

    fn publish(&self, update: impl FnOnce(&mut PollStatus)) {
        let countdown = self.countdown.load(Ordering::SeqCst);
        let live = !self.paused.load(Ordering::SeqCst);
        self.events.update_status(|status| {
            status.countdown_secs = countdown;
            status.live = live;
            update(status);
        });
    }
}

/// Releases the in-flight flag when a cycle ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handle to a running poll loop. Dropping it cancels the loop.
pub struct PollScheduler {
    shared: Arc<Shared>,
    engine: SharedEngine,
    task: Option<JoinHandle<()>>,
}

impl PollScheduler {
    /// Start the poll loop on the current tokio runtime.
    pub fn spawn<S, W>(
        config: SchedulerConfig,
        engine: SharedEngine,
        source: S,
        sync: Option<SyncClient<W>>,
    ) -> Self
    where
        S: TableSource + 'static,
        W: SheetWriter + 'static,
    {
        let interval_secs = config.poll_interval_secs.max(1);
        let events = Arc::clone(lock_engine(&engine).events());
        events.update_status(|status| *status = PollStatus::new(interval_secs));

        let shared = Arc::new(Shared {
            interval_secs,
            in_flight: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            countdown: AtomicU64::new(interval_secs),
            run_now: Notify::new(),
            shutdown: Notify::new(),
            events,
        });
        if config.poll_on_start && shared.try_claim() {
            shared.run_now.notify_one();
        }

        let runner = Runner {
            shared: Arc::clone(&shared),
            engine: Arc::clone(&engine),
            source,
            sync,
            auto_sync: config.auto_sync,
        };
        let task = tokio::spawn(runner.run());
        Self {
            shared,
            engine,
            task: Some(task),
        }
    }

    /// Request an immediate poll.
    pub fn trigger(&self) -> TriggerOutcome {
        if self.shared.is_cancelled() {
            return TriggerOutcome::Stopped;
        }
        if !self.shared.try_claim() {
            log::debug!("poll already in flight; ignoring trigger");
            return TriggerOutcome::AlreadyPolling;
        }
        self.shared.run_now.notify_one();
        TriggerOutcome::Started
    }

    /// Stop the countdown; manual triggers still work.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::SeqCst);
        self.shared.publish(|_| {});
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::SeqCst);
        self.shared.publish(|_| {});
    }

    pub fn is_polling(&self) -> bool {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> PollStatus {
        self.shared.events.status()
    }

    pub fn events(&self) -> &Arc<EventHub> {
        &self.shared.events
    }

    pub fn engine(&self) -> &SharedEngine {
        &self.engine
    }

    /// Cancel timers and wait for the loop to exit.
    ///
    /// A cycle awaiting the network finishes its request, but its result is
    /// discarded.
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                log::warn!("poll loop ended abnormally: {err}");
            }
        }
    }

    fn cancel(&self) {
        self.shared.cancelled.store(true, Ordering::SeqCst);
        self.shared.shutdown.notify_one();
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct Runner<S, W> {
    shared: Arc<Shared>,
    engine: SharedEngine,
    source: S,
    sync: Option<SyncClient<W>>,
    auto_sync: bool,
}

impl<S: TableSource, W: SheetWriter> Runner<S, W> {
    async fn run(self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        while !self.shared.is_cancelled() {
            tokio::select! {
                _ = self.shared.shutdown.notified() => break,
                _ = self.shared.run_now.notified() => self.run_claimed().await,
                _ = ticker.tick() => self.on_tick().await,
            }
        }
        log::debug!("poll loop stopped");
    }

    async fn on_tick(&self) {
        if self.shared.paused.load(Ordering::SeqCst) || self.shared.in_flight.load(Ordering::SeqCst) {
            return;
        }
        let previous = self
            .shared
            .countdown
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some(c.saturating_sub(1)))
            .unwrap_or(0);
        if previous > 1 {
            self.shared.publish(|_| {});
            return;
        }
        if self.shared.try_claim() {
            self.run_claimed().await;
        } else {
            self.shared.reset_countdown();
        }
    }

    /// Run one cycle; the caller has already claimed the in-flight flag.
    async fn run_claimed(&self) {
        let _guard = InFlightGuard(&self.shared.in_flight);
        self.shared.publish(|s| s.state = PollState::Polling);

        let outcome = self.cycle().await;
        if self.shared.is_cancelled() {
            log::debug!("discarding poll result after cancellation");
            return;
        }

        self.shared.reset_countdown();
        match outcome {
            Ok(()) => self.shared.publish(|s| {
                s.state = PollState::Idle;
                s.cycles_completed += 1;
                s.last_success = Some(Utc::now());
                s.last_error = None;
            }),
            Err(reason) => {
                self.shared.publish(|s| {
                    s.state = PollState::Failed;
                    s.last_error = Some(reason);
                });
                self.shared.publish(|s| {
                    s.state = PollState::Idle;
                    s.cycles_completed += 1;
                });
            }
        }
    }

    async fn cycle(&self) -> Result<(), String> {
        lock_engine(&self.engine).record_lifecycle(ChangeAction::System, STARTING_SUMMARY);

        let mut snapshots: Vec<TableSnapshot> = Vec::with_capacity(TableKind::ALL.len());
        for table in TableKind::ALL {
            match self.source.fetch(table).await {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(err) => {
                    if self.shared.is_cancelled() {
                        return Ok(());
                    }
                    log::warn!("poll failed: {err}");
                    let reason = err.to_string();
                    lock_engine(&self.engine).record_lifecycle(
                        ChangeAction::Error,
                        format!("Failed to refresh data: {reason}"),
                    );
                    return Err(reason);
                }
            }
        }
        if self.shared.is_cancelled() {
            return Ok(());
        }

        let changes = {
            let mut engine = lock_engine(&self.engine);
            match engine.ingest_all(snapshots) {
                Ok(changes) => changes,
                Err(err) => {
                    log::error!("diff failed: {err}");
                    let reason = err.to_string();
                    engine.record_lifecycle(
                        ChangeAction::Error,
                        format!("Failed to refresh data: {reason}"),
                    );
                    return Err(reason);
                }
            }
        };

        if self.auto_sync && !changes.is_empty() {
            if let Some(sync) = &self.sync {
                let result = sync.push(&changes).await;
                if self.shared.is_cancelled() {
                    return Ok(());
                }
                lock_engine(&self.engine).record_sync(&result);
            }
        }

        lock_engine(&self.engine).record_lifecycle(ChangeAction::System, REFRESHED_SUMMARY);
        Ok(())
    }
}
