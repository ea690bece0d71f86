use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Running totals carried in the checkpoint (cumulative across
/// invocations) and reported per invocation in sync responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounters {
    pub contacts_synced: u64,
    pub sessions_synced: u64,
    pub dials_synced: u64,
    pub campaigns_synced: u64,
    pub leads_synced: u64,
    pub record_errors: u64,
}

impl SyncCounters {
    pub fn merge(&mut self, other: &SyncCounters) {
        self.contacts_synced += other.contacts_synced;
        self.sessions_synced += other.sessions_synced;
        self.dials_synced += other.dials_synced;
        self.campaigns_synced += other.campaigns_synced;
        self.leads_synced += other.leads_synced;
        self.record_errors += other.record_errors;
    }
}

/// Resumable checkpoint, serialized into the connection row before any
/// non-terminal return. `page` is 1-based within the current step (and
/// chunk); `offset` serves steps that iterate stored rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncProgress {
    pub step: String,
    pub page: u64,
    pub chunk_index: usize,
    pub offset: i64,
    /// Fixed at the start of a sync series so date chunks stay stable
    /// across resumed invocations.
    pub window_end: Option<DateTime<Utc>>,
    pub counters: SyncCounters,
    pub done: bool,
}

impl SyncProgress {
    pub fn start(first_step: &str) -> Self {
        Self {
            step: first_step.to_string(),
            page: 1,
            chunk_index: 0,
            offset: 0,
            window_end: None,
            counters: SyncCounters::default(),
            done: false,
        }
    }

    /// Resume from a stored checkpoint. A missing, malformed, or finished
    /// checkpoint starts a fresh series.
    pub fn load(stored: Option<&serde_json::Value>, first_step: &str) -> Self {
        match stored.and_then(|v| serde_json::from_value::<SyncProgress>(v.clone()).ok()) {
            Some(progress) if !progress.done => progress,
            _ => Self::start(first_step),
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }

    /// Move to the next step, resetting per-step cursors.
    pub fn advance_step(&mut self, step: &str) {
        self.step = step.to_string();
        self.page = 1;
        self.chunk_index = 0;
        self.offset = 0;
    }

    pub fn finish(&mut self) {
        self.done = true;
    }
}
