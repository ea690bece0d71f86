use async_trait::async_trait;
use outbeat_common::error::OutbeatResult;
use uuid::Uuid;

use crate::email::models::{EmailActivity, EmailEventTarget};

#[async_trait]
pub trait EmailActivityRepository: Send + Sync {
    /// Apply one webhook event to domain state, exactly once.
    ///
    /// In a single transaction: flips the raw event's `processed` flag
    /// (the guard: 0 rows means another delivery already applied it),
    /// upserts the activity fact on its natural key, and bumps the hourly
    /// and daily campaign counters. Returns false when the guard lost.
    async fn apply_event(&self, raw_event_id: Uuid, target: &EmailEventTarget)
        -> OutbeatResult<bool>;

    /// Late write-back from the async reply classifier.
    async fn set_reply_category(
        &self,
        workspace_id: Uuid,
        campaign_id: Uuid,
        contact_id: Uuid,
        step: i32,
        category: &str,
    ) -> OutbeatResult<()>;

    async fn get(
        &self,
        workspace_id: Uuid,
        campaign_id: Uuid,
        contact_id: Uuid,
        step: i32,
    ) -> OutbeatResult<Option<EmailActivity>>;

    /// Hourly counter value for one (campaign, bucket, event type).
    async fn hourly_count(
        &self,
        campaign_id: Uuid,
        bucket: chrono::DateTime<chrono::Utc>,
        event_type: &str,
    ) -> OutbeatResult<i64>;
}
