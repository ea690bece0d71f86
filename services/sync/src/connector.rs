use async_trait::async_trait;
use outbeat_common::error::OutbeatError;

use crate::client::ClientError;
use crate::progress::SyncCounters;

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Discard the stored checkpoint and start over.
    pub reset: bool,
    /// Invoked by the retry queue processor; failures are rescheduled by
    /// the processor instead of enqueueing a new entry.
    pub retry: bool,
}

/// What one time-boxed invocation accomplished. Counters are for this
/// invocation only; the cumulative totals live in the checkpoint.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub platform: String,
    pub done: bool,
    pub message: String,
    pub counters: SyncCounters,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Credentials rejected: fatal to this sync and not worth automatic
    /// retries until an operator repairs them.
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("platform not configured: {0}")]
    NotConfigured(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl SyncError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Whether automatic retries can plausibly help. Auth failures need a
    /// human; unconfigured platforms need configuration.
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::Storage(_))
    }

    pub fn from_client(err: ClientError) -> Self {
        if err.is_auth() {
            Self::Auth(err.to_string())
        } else {
            Self::Upstream(err.to_string())
        }
    }
}

impl From<OutbeatError> for SyncError {
    fn from(err: OutbeatError) -> Self {
        Self::Storage(err.to_string())
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    fn platform(&self) -> &str;
    async fn sync(&self, opts: SyncOptions) -> Result<SyncOutcome, SyncError>;
}

/// Orchestration knobs threaded explicitly into every syncer; no
/// cross-invocation state lives outside the persisted checkpoint.
#[derive(Debug, Clone)]
pub struct SyncTuning {
    pub time_budget: std::time::Duration,
    pub lookback_days: i64,
    /// Rows per batch for steps that iterate previously stored rows.
    pub detail_batch: i64,
}

impl SyncTuning {
    /// A heartbeat older than 2× the budget marks a crashed run.
    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.time_budget * 2)
            .unwrap_or_else(|_| chrono::Duration::seconds(100))
    }
}
