use async_trait::async_trait;
use outbeat_common::error::OutbeatResult;
use uuid::Uuid;

use crate::contact::models::Contact;

#[async_trait]
pub trait ContactRepository: Send + Sync {
    /// Upsert on the natural key `(workspace_id, platform, external_id)`.
    /// Repeated delivery of the same record updates in place.
    async fn upsert_by_external_id(&self, contact: Contact) -> OutbeatResult<Contact>;

    /// Idempotent get-or-create for webhook-origin contacts, keyed by
    /// email within the workspace. A contact created this way uses the
    /// email itself as its external id.
    async fn get_or_create_by_email(
        &self,
        workspace_id: Uuid,
        platform: &str,
        email: &str,
        display_name: Option<&str>,
    ) -> OutbeatResult<Contact>;

    async fn get_by_id(&self, workspace_id: Uuid, id: Uuid) -> OutbeatResult<Option<Contact>>;
}
