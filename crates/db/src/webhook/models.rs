use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Append-only raw record of an inbound push notification. Stored before
/// any domain interpretation; only ever mutated to flip `processed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub source_type: String,
    pub event_type: String,
    pub event_id: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
}

/// Result of a durable store attempt: the row, plus whether this call
/// inserted it (false = the event was already known).
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub event: WebhookEvent,
    pub inserted: bool,
}
