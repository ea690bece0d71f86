use async_trait::async_trait;
use outbeat_common::error::OutbeatResult;
use uuid::Uuid;

use crate::campaign::models::Campaign;

#[async_trait]
pub trait CampaignRepository: Send + Sync {
    /// Upsert on the natural key `(workspace_id, platform, external_id)`.
    async fn upsert_by_external_id(&self, campaign: Campaign) -> OutbeatResult<Campaign>;

    /// Webhook correlation-id resolution: the platform's campaign id also
    /// yields the owning workspace. Returns `None` for campaigns this
    /// store has not synced yet.
    async fn find_by_external_id(
        &self,
        platform: &str,
        external_id: &str,
    ) -> OutbeatResult<Option<Campaign>>;

    /// Stable page of campaign external ids for a workspace, for steps
    /// that iterate campaigns under an offset checkpoint.
    async fn external_ids(
        &self,
        workspace_id: Uuid,
        platform: &str,
        offset: i64,
        limit: i64,
    ) -> OutbeatResult<Vec<String>>;
}
