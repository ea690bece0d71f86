use async_trait::async_trait;
use outbeat_common::error::OutbeatResult;
use uuid::Uuid;

use crate::webhook::models::{StoredEvent, WebhookEvent};

#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Durably store a raw event. De-duplicates on
    /// `(source_type, event_id)`: a redelivered event returns the existing
    /// row with `inserted = false`.
    async fn store(
        &self,
        source_type: &str,
        event_type: &str,
        event_id: &str,
        payload: &serde_json::Value,
    ) -> OutbeatResult<StoredEvent>;

    /// Flip `processed` false → true. Returns false when the event was
    /// already processed (another delivery won the race).
    async fn mark_processed(&self, id: Uuid) -> OutbeatResult<bool>;

    /// Oldest-first unprocessed events for a source, for reconciliation.
    async fn unprocessed(&self, source_type: &str, limit: i64)
        -> OutbeatResult<Vec<WebhookEvent>>;

    async fn get(&self, id: Uuid) -> OutbeatResult<Option<WebhookEvent>>;
}
