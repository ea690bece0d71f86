use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::retry::models::RetryQueueEntry;
use crate::retry::repositories::RetryQueueRepository;
use outbeat_common::error::{OutbeatError, OutbeatResult};

const RETURNING: &str = "id, connection_id, status, retry_count, max_retries, next_retry_at, \
     last_error, created_at, updated_at";

#[derive(Clone)]
pub struct PgRetryQueueRepository {
    pool: PgPool,
}

impl PgRetryQueueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> OutbeatResult<RetryQueueEntry> {
        Ok(RetryQueueEntry {
            id: row.get("id"),
            connection_id: row.get("connection_id"),
            status: row.get("status"),
            retry_count: row.get("retry_count"),
            max_retries: row.get("max_retries"),
            next_retry_at: row.get("next_retry_at"),
            last_error: row.get("last_error"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl RetryQueueRepository for PgRetryQueueRepository {
    async fn enqueue(
        &self,
        connection_id: Uuid,
        max_retries: i32,
        next_retry_at: DateTime<Utc>,
        error: &str,
    ) -> OutbeatResult<RetryQueueEntry> {
        // Refresh an open entry if one exists; a connection gets one
        // retry series at a time.
        let existing = sqlx::query(&format!(
            "update retry_queue
             set last_error = $1, updated_at = now()
             where connection_id = $2 and status in ('pending', 'processing')
             returning {RETURNING}",
        ))
        .bind(error)
        .bind(connection_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        if let Some(row) = existing {
            return Self::map_row(row);
        }

        let row = sqlx::query(&format!(
            "insert into retry_queue (id, connection_id, max_retries, next_retry_at, last_error)
             values ($1, $2, $3, $4, $5)
             returning {RETURNING}",
        ))
        .bind(Uuid::new_v4())
        .bind(connection_id)
        .bind(max_retries)
        .bind(next_retry_at)
        .bind(error)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn due(&self, now: DateTime<Utc>, limit: i64) -> OutbeatResult<Vec<RetryQueueEntry>> {
        let rows = sqlx::query(&format!(
            "select {RETURNING} from retry_queue
             where status = 'pending' and next_retry_at <= $1
             order by next_retry_at asc
             limit $2",
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        rows.into_iter().map(Self::map_row).collect()
    }

    async fn mark_processing(&self, id: Uuid) -> OutbeatResult<bool> {
        let result = sqlx::query(
            "update retry_queue
             set status = 'processing', updated_at = now()
             where id = $1 and status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_completed(&self, id: Uuid) -> OutbeatResult<()> {
        sqlx::query(
            "update retry_queue
             set status = 'completed', updated_at = now()
             where id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        Ok(())
    }

    async fn reschedule(
        &self,
        id: Uuid,
        retry_count: i32,
        next_retry_at: DateTime<Utc>,
        error: &str,
    ) -> OutbeatResult<()> {
        sqlx::query(
            "update retry_queue
             set status = 'pending', retry_count = $1, next_retry_at = $2,
                 last_error = $3, updated_at = now()
             where id = $4",
        )
        .bind(retry_count)
        .bind(next_retry_at)
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> OutbeatResult<()> {
        sqlx::query(
            "update retry_queue
             set status = 'failed', last_error = $1, updated_at = now()
             where id = $2",
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> OutbeatResult<Option<RetryQueueEntry>> {
        let row = sqlx::query(&format!(
            "select {RETURNING} from retry_queue where id = $1",
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }
}
