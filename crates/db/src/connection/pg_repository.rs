use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::connection::models::Connection;
use crate::connection::repositories::ConnectionRepository;
use outbeat_common::error::{OutbeatError, OutbeatResult};

const RETURNING: &str = "id, workspace_id, platform, credentials_ref, sync_status, sync_progress, \
     heartbeat_at, last_sync_at, last_error, created_at, updated_at";

#[derive(Clone)]
pub struct PgConnectionRepository {
    pool: PgPool,
}

impl PgConnectionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> OutbeatResult<Connection> {
        Ok(Connection {
            id: row.get("id"),
            workspace_id: row.get("workspace_id"),
            platform: row.get("platform"),
            credentials_ref: row.get("credentials_ref"),
            sync_status: row.get("sync_status"),
            sync_progress: row.get("sync_progress"),
            heartbeat_at: row.get("heartbeat_at"),
            last_sync_at: row.get("last_sync_at"),
            last_error: row.get("last_error"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl ConnectionRepository for PgConnectionRepository {
    async fn get_or_create(&self, workspace_id: Uuid, platform: &str) -> OutbeatResult<Connection> {
        let row = sqlx::query(&format!(
            "insert into connections (id, workspace_id, platform)
             values ($1, $2, $3)
             on conflict (workspace_id, platform) do update set updated_at = now()
             returning {RETURNING}",
        ))
        .bind(Uuid::new_v4())
        .bind(workspace_id)
        .bind(platform)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn get(&self, workspace_id: Uuid, platform: &str) -> OutbeatResult<Option<Connection>> {
        let row = sqlx::query(&format!(
            "select {RETURNING} from connections where workspace_id = $1 and platform = $2",
        ))
        .bind(workspace_id)
        .bind(platform)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }

    async fn get_by_id(&self, id: Uuid) -> OutbeatResult<Option<Connection>> {
        let row = sqlx::query(&format!("select {RETURNING} from connections where id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| OutbeatError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }

    async fn acquire(
        &self,
        workspace_id: Uuid,
        platform: &str,
        stale_after: Duration,
    ) -> OutbeatResult<Option<Connection>> {
        let now = Utc::now();
        let stale_cutoff = now - stale_after;

        // Single-row conditional claim: a fresh heartbeat under 'syncing'
        // means another run is alive and we decline; a stale one is a
        // crashed run and is reclaimed.
        let row = sqlx::query(&format!(
            "update connections
             set sync_status = 'syncing', heartbeat_at = $1, updated_at = $1
             where workspace_id = $2 and platform = $3
               and (sync_status != 'syncing'
                    or heartbeat_at is null
                    or heartbeat_at < $4)
             returning {RETURNING}",
        ))
        .bind(now)
        .bind(workspace_id)
        .bind(platform)
        .bind(stale_cutoff)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }

    async fn save_progress(&self, id: Uuid, progress: &serde_json::Value) -> OutbeatResult<()> {
        let now = Utc::now();
        sqlx::query(
            "update connections
             set sync_progress = $1, heartbeat_at = $2, updated_at = $2
             where id = $3",
        )
        .bind(progress)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        Ok(())
    }

    async fn yield_claim(&self, id: Uuid, progress: &serde_json::Value) -> OutbeatResult<()> {
        sqlx::query(
            "update connections
             set sync_progress = $1, heartbeat_at = null, updated_at = now()
             where id = $2",
        )
        .bind(progress)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        Ok(())
    }

    async fn mark_success(&self, id: Uuid, progress: &serde_json::Value) -> OutbeatResult<()> {
        let now = Utc::now();
        sqlx::query(
            "update connections
             set sync_status = 'success', sync_progress = $1, last_sync_at = $2,
                 last_error = null, updated_at = $2
             where id = $3",
        )
        .bind(progress)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        Ok(())
    }

    async fn mark_error(
        &self,
        id: Uuid,
        progress: Option<&serde_json::Value>,
        message: &str,
    ) -> OutbeatResult<()> {
        let now = Utc::now();
        sqlx::query(
            "update connections
             set sync_status = 'error',
                 sync_progress = coalesce($1, sync_progress),
                 last_error = $2, updated_at = $3
             where id = $4",
        )
        .bind(progress)
        .bind(message)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn test_repo() -> Option<(PgConnectionRepository, PgPool)> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = create_pool(&url).await.expect("db should connect");
        run_migrations(&pool).await.expect("migrations should apply");
        Some((PgConnectionRepository::new(pool.clone()), pool))
    }

    #[tokio::test]
    async fn get_or_create_inserts_new() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let ws = Uuid::new_v4();
        let conn = repo
            .get_or_create(ws, "phoneburner")
            .await
            .expect("should work");
        assert_eq!(conn.workspace_id, ws);
        assert_eq!(conn.platform, "phoneburner");
        assert_eq!(conn.sync_status, "idle");
        assert!(conn.sync_progress.is_none());
    }

    #[tokio::test]
    async fn get_or_create_returns_existing() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let ws = Uuid::new_v4();
        let c1 = repo.get_or_create(ws, "smartlead").await.expect("first");
        let c2 = repo.get_or_create(ws, "smartlead").await.expect("second");
        assert_eq!(c1.id, c2.id);
    }

    #[tokio::test]
    async fn acquire_succeeds_when_idle() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let ws = Uuid::new_v4();
        repo.get_or_create(ws, "phoneburner").await.expect("create");
        let claim = repo
            .acquire(ws, "phoneburner", Duration::seconds(100))
            .await
            .expect("acquire");
        assert!(claim.is_some());
        assert_eq!(claim.unwrap().sync_status, "syncing");
    }

    #[tokio::test]
    async fn acquire_declines_on_fresh_heartbeat() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let ws = Uuid::new_v4();
        repo.get_or_create(ws, "phoneburner").await.expect("create");
        repo.acquire(ws, "phoneburner", Duration::seconds(100))
            .await
            .expect("first claim");
        let second = repo
            .acquire(ws, "phoneburner", Duration::seconds(100))
            .await
            .expect("second claim");
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn acquire_reclaims_stale_heartbeat() {
        let (repo, pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let ws = Uuid::new_v4();
        let conn = repo.get_or_create(ws, "phoneburner").await.expect("create");
        repo.acquire(ws, "phoneburner", Duration::seconds(100))
            .await
            .expect("first claim");

        // Age the heartbeat past the stale threshold
        sqlx::query("update connections set heartbeat_at = now() - interval '10 minutes' where id = $1")
            .bind(conn.id)
            .execute(&pool)
            .await
            .expect("age heartbeat");

        let reclaimed = repo
            .acquire(ws, "phoneburner", Duration::seconds(100))
            .await
            .expect("reclaim");
        assert!(reclaimed.is_some());
    }

    #[tokio::test]
    async fn yield_claim_releases_for_immediate_reacquire() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let ws = Uuid::new_v4();
        repo.get_or_create(ws, "phoneburner").await.expect("create");
        let claim = repo
            .acquire(ws, "phoneburner", Duration::seconds(100))
            .await
            .expect("claim")
            .expect("should claim");

        let progress = serde_json::json!({ "step": "contacts", "page": 3, "done": false });
        repo.yield_claim(claim.id, &progress).await.expect("yield");

        // A follow-up invocation can claim right away and sees the checkpoint.
        let next = repo
            .acquire(ws, "phoneburner", Duration::seconds(100))
            .await
            .expect("reacquire")
            .expect("claim should succeed after yield");
        assert_eq!(next.sync_progress.unwrap()["page"], 3);
    }

    #[tokio::test]
    async fn save_progress_refreshes_heartbeat() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let ws = Uuid::new_v4();
        let conn = repo.get_or_create(ws, "smartlead").await.expect("create");

        let progress = serde_json::json!({ "step": "campaigns", "page": 3 });
        repo.save_progress(conn.id, &progress)
            .await
            .expect("save progress");

        let after = repo
            .get(ws, "smartlead")
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(after.sync_progress.unwrap()["page"], 3);
        assert!(after.heartbeat_at.is_some());
    }

    #[tokio::test]
    async fn mark_success_clears_error_and_sets_last_sync() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let ws = Uuid::new_v4();
        let conn = repo.get_or_create(ws, "smartlead").await.expect("create");
        repo.mark_error(conn.id, None, "boom").await.expect("error");
        repo.mark_success(conn.id, &serde_json::json!({ "done": true }))
            .await
            .expect("success");

        let after = repo
            .get(ws, "smartlead")
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(after.sync_status, "success");
        assert!(after.last_error.is_none());
        assert!(after.last_sync_at.is_some());
    }

    #[tokio::test]
    async fn mark_error_keeps_existing_progress_when_none_given() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let ws = Uuid::new_v4();
        let conn = repo.get_or_create(ws, "phoneburner").await.expect("create");
        repo.save_progress(conn.id, &serde_json::json!({ "page": 7 }))
            .await
            .expect("save");
        repo.mark_error(conn.id, None, "upstream 500")
            .await
            .expect("error");

        let after = repo
            .get(ws, "phoneburner")
            .await
            .expect("get")
            .expect("exists");
        assert_eq!(after.sync_status, "error");
        assert_eq!(after.last_error.as_deref(), Some("upstream 500"));
        assert_eq!(after.sync_progress.unwrap()["page"], 7);
    }
}
