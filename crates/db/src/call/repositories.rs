use async_trait::async_trait;
use outbeat_common::error::OutbeatResult;
use uuid::Uuid;

use crate::call::models::{CallSession, Dial};

#[async_trait]
pub trait CallRepository: Send + Sync {
    /// Upsert on `(workspace_id, platform, external_id)`.
    async fn upsert_session(&self, session: CallSession) -> OutbeatResult<CallSession>;

    /// Upsert on `(workspace_id, platform, external_id)`.
    async fn upsert_dial(&self, dial: Dial) -> OutbeatResult<Dial>;

    /// Stable page of session external ids, for the per-session details
    /// step (ordered so an offset checkpoint resumes deterministically).
    async fn session_external_ids(
        &self,
        workspace_id: Uuid,
        platform: &str,
        offset: i64,
        limit: i64,
    ) -> OutbeatResult<Vec<String>>;
}
