use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row per (workspace, platform) pair. The orchestrator owns this row:
/// `sync_status` + `heartbeat_at` form the advisory lock, `sync_progress`
/// holds the resumable checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub platform: String,
    pub credentials_ref: Option<String>,
    pub sync_status: String,
    pub sync_progress: Option<serde_json::Value>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
