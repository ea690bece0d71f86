use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::contact::models::Contact;
use crate::contact::repositories::ContactRepository;
use outbeat_common::error::{OutbeatError, OutbeatResult};

const RETURNING: &str = "id, workspace_id, platform, external_id, email, display_name, company, \
     phone, raw_ref, created_at, updated_at";

#[derive(Clone)]
pub struct PgContactRepository {
    pool: PgPool,
}

impl PgContactRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> OutbeatResult<Contact> {
        Ok(Contact {
            id: row.get("id"),
            workspace_id: row.get("workspace_id"),
            platform: row.get("platform"),
            external_id: row.get("external_id"),
            email: row.get("email"),
            display_name: row.get("display_name"),
            company: row.get("company"),
            phone: row.get("phone"),
            raw_ref: row.get("raw_ref"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl ContactRepository for PgContactRepository {
    async fn upsert_by_external_id(&self, contact: Contact) -> OutbeatResult<Contact> {
        let row = sqlx::query(&format!(
            "insert into contacts
             (id, workspace_id, platform, external_id, email, display_name, company, phone, raw_ref)
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             on conflict (workspace_id, platform, external_id) do update set
               email = coalesce(excluded.email, contacts.email),
               display_name = coalesce(excluded.display_name, contacts.display_name),
               company = coalesce(excluded.company, contacts.company),
               phone = coalesce(excluded.phone, contacts.phone),
               raw_ref = coalesce(excluded.raw_ref, contacts.raw_ref),
               updated_at = now()
             returning {RETURNING}",
        ))
        .bind(contact.id)
        .bind(contact.workspace_id)
        .bind(&contact.platform)
        .bind(&contact.external_id)
        .bind(&contact.email)
        .bind(&contact.display_name)
        .bind(&contact.company)
        .bind(&contact.phone)
        .bind(&contact.raw_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn get_or_create_by_email(
        &self,
        workspace_id: Uuid,
        platform: &str,
        email: &str,
        display_name: Option<&str>,
    ) -> OutbeatResult<Contact> {
        let email = email.trim().to_lowercase();

        // Prefer an already-synced contact carrying this email.
        let existing = sqlx::query(&format!(
            "select {RETURNING} from contacts
             where workspace_id = $1 and lower(email) = $2
             order by created_at asc
             limit 1",
        ))
        .bind(workspace_id)
        .bind(&email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        if let Some(row) = existing {
            return Self::map_row(row);
        }

        // Concurrent-safe create: the email doubles as the external id,
        // so a racing insert lands on the natural-key conflict target.
        let row = sqlx::query(&format!(
            "insert into contacts (id, workspace_id, platform, external_id, email, display_name)
             values ($1, $2, $3, $4, $4, $5)
             on conflict (workspace_id, platform, external_id) do update set updated_at = now()
             returning {RETURNING}",
        ))
        .bind(Uuid::new_v4())
        .bind(workspace_id)
        .bind(platform)
        .bind(&email)
        .bind(display_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn get_by_id(&self, workspace_id: Uuid, id: Uuid) -> OutbeatResult<Option<Contact>> {
        let row = sqlx::query(&format!(
            "select {RETURNING} from contacts where workspace_id = $1 and id = $2",
        ))
        .bind(workspace_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }
}
