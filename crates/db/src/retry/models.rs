use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One entry per failed sync attempt series. Terminal at `completed`
/// or `failed` (retries exhausted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryQueueEntry {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub status: String,
    pub retry_count: i32,
    pub max_retries: i32,
    pub next_retry_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
