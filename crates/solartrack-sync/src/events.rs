//! Notifications for the UI layer.
//!
//! Listeners subscribe to `watch` channels and always observe the latest
//! value; the engine never renders anything itself.

use chrono::{DateTime, Utc};
use serde::Serialize;
use solartrack_model::ChangeLogEntry;
use tokio::sync::watch;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Idle,
    Polling,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollStatus {
    pub state: PollState,
    /// Seconds until the next timed poll.
    pub countdown_secs: u64,
    /// `false` while timed polling is paused.
    pub live: bool,
    pub cycles_completed: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl PollStatus {
    pub fn new(countdown_secs: u64) -> Self {
        Self {
            state: PollState::Idle,
            countdown_secs,
            live: true,
            cycles_completed: 0,
            last_success: None,
            last_error: None,
        }
    }
}

#[derive(Debug)]
pub struct EventHub {
    log: watch::Sender<Vec<ChangeLogEntry>>,
    status: watch::Sender<PollStatus>,
}

impl EventHub {
    pub fn new(entries: Vec<ChangeLogEntry>, status: PollStatus) -> Self {
        let (log, _) = watch::channel(entries);
        let (status, _) = watch::channel(status);
        Self { log, status }
    }

    pub fn subscribe_log(&self) -> watch::Receiver<Vec<ChangeLogEntry>> {
        self.log.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<PollStatus> {
        self.status.subscribe()
    }

    pub(crate) fn publish_log(&self, entries: Vec<ChangeLogEntry>) {
        self.log.send_replace(entries);
    }

    pub fn status(&self) -> PollStatus {
        self.status.borrow().clone()
    }

    pub(crate) fn update_status(&self, update: impl FnOnce(&mut PollStatus)) {
        self.status.send_modify(update);
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(Vec::new(), PollStatus::new(0))
    }
}
