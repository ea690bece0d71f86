use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::webhook::models::{StoredEvent, WebhookEvent};
use crate::webhook::repositories::WebhookEventRepository;
use outbeat_common::error::{OutbeatError, OutbeatResult};

const RETURNING: &str =
    "id, source_type, event_type, event_id, payload, processed, processed_at, received_at";

#[derive(Clone)]
pub struct PgWebhookEventRepository {
    pool: PgPool,
}

impl PgWebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> OutbeatResult<WebhookEvent> {
        Ok(WebhookEvent {
            id: row.get("id"),
            source_type: row.get("source_type"),
            event_type: row.get("event_type"),
            event_id: row.get("event_id"),
            payload: row.get("payload"),
            processed: row.get("processed"),
            processed_at: row.get("processed_at"),
            received_at: row.get("received_at"),
        })
    }
}

#[async_trait]
impl WebhookEventRepository for PgWebhookEventRepository {
    async fn store(
        &self,
        source_type: &str,
        event_type: &str,
        event_id: &str,
        payload: &serde_json::Value,
    ) -> OutbeatResult<StoredEvent> {
        let inserted = sqlx::query(&format!(
            "insert into webhook_events (id, source_type, event_type, event_id, payload)
             values ($1, $2, $3, $4, $5)
             on conflict (source_type, event_id) do nothing
             returning {RETURNING}",
        ))
        .bind(Uuid::new_v4())
        .bind(source_type)
        .bind(event_type)
        .bind(event_id)
        .bind(payload)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        if let Some(row) = inserted {
            return Ok(StoredEvent {
                event: Self::map_row(row)?,
                inserted: true,
            });
        }

        // Redelivery: return the row the first delivery stored.
        let row = sqlx::query(&format!(
            "select {RETURNING} from webhook_events
             where source_type = $1 and event_id = $2",
        ))
        .bind(source_type)
        .bind(event_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        Ok(StoredEvent {
            event: Self::map_row(row)?,
            inserted: false,
        })
    }

    async fn mark_processed(&self, id: Uuid) -> OutbeatResult<bool> {
        let result = sqlx::query(
            "update webhook_events
             set processed = true, processed_at = now()
             where id = $1 and processed = false",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn unprocessed(
        &self,
        source_type: &str,
        limit: i64,
    ) -> OutbeatResult<Vec<WebhookEvent>> {
        let rows = sqlx::query(&format!(
            "select {RETURNING} from webhook_events
             where source_type = $1 and processed = false
             order by received_at asc
             limit $2",
        ))
        .bind(source_type)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        rows.into_iter().map(Self::map_row).collect()
    }

    async fn get(&self, id: Uuid) -> OutbeatResult<Option<WebhookEvent>> {
        let row = sqlx::query(&format!(
            "select {RETURNING} from webhook_events where id = $1",
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn test_repo() -> Option<(PgWebhookEventRepository, PgPool)> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = create_pool(&url).await.expect("db should connect");
        run_migrations(&pool).await.expect("migrations should apply");
        Some((PgWebhookEventRepository::new(pool.clone()), pool))
    }

    fn payload() -> serde_json::Value {
        serde_json::json!({
            "eventType": "opened",
            "campaignId": "c-1",
            "leadEmail": "lead@example.com"
        })
    }

    #[tokio::test]
    async fn store_inserts_unprocessed_row() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let event_id = Uuid::new_v4().to_string();
        let stored = repo
            .store("smartlead", "opened", &event_id, &payload())
            .await
            .expect("store");
        assert!(stored.inserted);
        assert!(!stored.event.processed);
        assert_eq!(stored.event.event_type, "opened");
        assert_eq!(stored.event.payload["campaignId"], "c-1");
    }

    #[tokio::test]
    async fn store_deduplicates_on_event_id() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let event_id = Uuid::new_v4().to_string();
        let first = repo
            .store("smartlead", "opened", &event_id, &payload())
            .await
            .expect("first");
        let second = repo
            .store("smartlead", "opened", &event_id, &payload())
            .await
            .expect("second");
        assert!(first.inserted);
        assert!(!second.inserted);
        assert_eq!(first.event.id, second.event.id);
    }

    #[tokio::test]
    async fn same_event_id_across_sources_is_distinct() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let event_id = Uuid::new_v4().to_string();
        let a = repo
            .store("smartlead", "opened", &event_id, &payload())
            .await
            .expect("a");
        let b = repo
            .store("phoneburner", "opened", &event_id, &payload())
            .await
            .expect("b");
        assert!(a.inserted);
        assert!(b.inserted);
        assert_ne!(a.event.id, b.event.id);
    }

    #[tokio::test]
    async fn mark_processed_flips_exactly_once() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let event_id = Uuid::new_v4().to_string();
        let stored = repo
            .store("smartlead", "replied", &event_id, &payload())
            .await
            .expect("store");

        assert!(repo.mark_processed(stored.event.id).await.expect("first"));
        assert!(!repo.mark_processed(stored.event.id).await.expect("second"));

        let after = repo
            .get(stored.event.id)
            .await
            .expect("get")
            .expect("exists");
        assert!(after.processed);
        assert!(after.processed_at.is_some());
    }

    #[tokio::test]
    async fn unprocessed_lists_oldest_first_and_skips_processed() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let source = format!("src-{}", Uuid::new_v4());
        let first = repo
            .store(&source, "sent", &Uuid::new_v4().to_string(), &payload())
            .await
            .expect("first");
        let second = repo
            .store(&source, "sent", &Uuid::new_v4().to_string(), &payload())
            .await
            .expect("second");
        repo.mark_processed(first.event.id).await.expect("flip");

        let pending = repo.unprocessed(&source, 10).await.expect("unprocessed");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.event.id);
    }
}
