use async_trait::async_trait;
use chrono::Duration;
use outbeat_common::error::OutbeatResult;
use uuid::Uuid;

use crate::connection::models::Connection;

#[async_trait]
pub trait ConnectionRepository: Send + Sync {
    async fn get_or_create(&self, workspace_id: Uuid, platform: &str) -> OutbeatResult<Connection>;

    async fn get(&self, workspace_id: Uuid, platform: &str) -> OutbeatResult<Option<Connection>>;

    async fn get_by_id(&self, id: Uuid) -> OutbeatResult<Option<Connection>>;

    /// Claim the connection for a sync run. Succeeds when the connection is
    /// not currently syncing, or when its heartbeat is older than
    /// `stale_after` (a crashed run eligible for reclaim). Returns `None`
    /// when another run holds a fresh claim.
    async fn acquire(
        &self,
        workspace_id: Uuid,
        platform: &str,
        stale_after: Duration,
    ) -> OutbeatResult<Option<Connection>>;

    /// Persist the checkpoint and refresh the heartbeat. Must be called
    /// after every committed page so a later invocation resumes exactly
    /// where this one stopped.
    async fn save_progress(&self, id: Uuid, progress: &serde_json::Value) -> OutbeatResult<()>;

    /// Persist the checkpoint and release the claim in one write (heartbeat
    /// cleared, status left at `syncing`). Used when the time budget is
    /// exhausted mid-sync: the next invocation may claim immediately and
    /// resume from this checkpoint.
    async fn yield_claim(&self, id: Uuid, progress: &serde_json::Value) -> OutbeatResult<()>;

    async fn mark_success(&self, id: Uuid, progress: &serde_json::Value) -> OutbeatResult<()>;

    async fn mark_error(
        &self,
        id: Uuid,
        progress: Option<&serde_json::Value>,
        message: &str,
    ) -> OutbeatResult<()>;
}
