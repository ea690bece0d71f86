use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub platform: String,
    pub external_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub dial_count: i32,
    pub raw_ref: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dial {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub platform: String,
    pub external_id: String,
    pub session_external_id: String,
    pub contact_external_id: Option<String>,
    pub disposition: Option<String>,
    pub duration_secs: Option<i32>,
    pub dialed_at: Option<DateTime<Utc>>,
    pub raw_ref: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
