use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outbeat_common::error::OutbeatResult;
use uuid::Uuid;

use crate::retry::models::RetryQueueEntry;

#[async_trait]
pub trait RetryQueueRepository: Send + Sync {
    /// Enqueue a retry for a connection. If an open (pending/processing)
    /// entry already exists for the connection, its error message is
    /// refreshed instead of inserting a second entry.
    async fn enqueue(
        &self,
        connection_id: Uuid,
        max_retries: i32,
        next_retry_at: DateTime<Utc>,
        error: &str,
    ) -> OutbeatResult<RetryQueueEntry>;

    /// Pending entries whose `next_retry_at` has passed, ordered by due
    /// time, limited to `limit`.
    async fn due(&self, now: DateTime<Utc>, limit: i64) -> OutbeatResult<Vec<RetryQueueEntry>>;

    /// Conditionally move pending → processing. Returns false when the
    /// entry was already taken by a concurrent runner.
    async fn mark_processing(&self, id: Uuid) -> OutbeatResult<bool>;

    async fn mark_completed(&self, id: Uuid) -> OutbeatResult<()>;

    /// Schedule the next attempt: bump the count, return to pending.
    async fn reschedule(
        &self,
        id: Uuid,
        retry_count: i32,
        next_retry_at: DateTime<Utc>,
        error: &str,
    ) -> OutbeatResult<()>;

    /// Terminal failure; never picked up again.
    async fn mark_failed(&self, id: Uuid, error: &str) -> OutbeatResult<()>;

    async fn get(&self, id: Uuid) -> OutbeatResult<Option<RetryQueueEntry>>;
}
