use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::call::models::{CallSession, Dial};
use crate::call::repositories::CallRepository;
use outbeat_common::error::{OutbeatError, OutbeatResult};

const SESSION_RETURNING: &str = "id, workspace_id, platform, external_id, started_at, ended_at, \
     dial_count, raw_ref, created_at, updated_at";

const DIAL_RETURNING: &str = "id, workspace_id, platform, external_id, session_external_id, \
     contact_external_id, disposition, duration_secs, dialed_at, raw_ref, created_at, updated_at";

#[derive(Clone)]
pub struct PgCallRepository {
    pool: PgPool,
}

impl PgCallRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_session_row(row: PgRow) -> OutbeatResult<CallSession> {
        Ok(CallSession {
            id: row.get("id"),
            workspace_id: row.get("workspace_id"),
            platform: row.get("platform"),
            external_id: row.get("external_id"),
            started_at: row.get("started_at"),
            ended_at: row.get("ended_at"),
            dial_count: row.get("dial_count"),
            raw_ref: row.get("raw_ref"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn map_dial_row(row: PgRow) -> OutbeatResult<Dial> {
        Ok(Dial {
            id: row.get("id"),
            workspace_id: row.get("workspace_id"),
            platform: row.get("platform"),
            external_id: row.get("external_id"),
            session_external_id: row.get("session_external_id"),
            contact_external_id: row.get("contact_external_id"),
            disposition: row.get("disposition"),
            duration_secs: row.get("duration_secs"),
            dialed_at: row.get("dialed_at"),
            raw_ref: row.get("raw_ref"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl CallRepository for PgCallRepository {
    async fn upsert_session(&self, session: CallSession) -> OutbeatResult<CallSession> {
        let row = sqlx::query(&format!(
            "insert into call_sessions
             (id, workspace_id, platform, external_id, started_at, ended_at, dial_count, raw_ref)
             values ($1, $2, $3, $4, $5, $6, $7, $8)
             on conflict (workspace_id, platform, external_id) do update set
               started_at = coalesce(excluded.started_at, call_sessions.started_at),
               ended_at = coalesce(excluded.ended_at, call_sessions.ended_at),
               dial_count = excluded.dial_count,
               raw_ref = coalesce(excluded.raw_ref, call_sessions.raw_ref),
               updated_at = now()
             returning {SESSION_RETURNING}",
        ))
        .bind(session.id)
        .bind(session.workspace_id)
        .bind(&session.platform)
        .bind(&session.external_id)
        .bind(session.started_at)
        .bind(session.ended_at)
        .bind(session.dial_count)
        .bind(&session.raw_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        Self::map_session_row(row)
    }

    async fn upsert_dial(&self, dial: Dial) -> OutbeatResult<Dial> {
        let row = sqlx::query(&format!(
            "insert into dials
             (id, workspace_id, platform, external_id, session_external_id, contact_external_id,
              disposition, duration_secs, dialed_at, raw_ref)
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             on conflict (workspace_id, platform, external_id) do update set
               disposition = coalesce(excluded.disposition, dials.disposition),
               duration_secs = coalesce(excluded.duration_secs, dials.duration_secs),
               dialed_at = coalesce(excluded.dialed_at, dials.dialed_at),
               raw_ref = coalesce(excluded.raw_ref, dials.raw_ref),
               updated_at = now()
             returning {DIAL_RETURNING}",
        ))
        .bind(dial.id)
        .bind(dial.workspace_id)
        .bind(&dial.platform)
        .bind(&dial.external_id)
        .bind(&dial.session_external_id)
        .bind(&dial.contact_external_id)
        .bind(&dial.disposition)
        .bind(dial.duration_secs)
        .bind(dial.dialed_at)
        .bind(&dial.raw_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        Self::map_dial_row(row)
    }

    async fn session_external_ids(
        &self,
        workspace_id: Uuid,
        platform: &str,
        offset: i64,
        limit: i64,
    ) -> OutbeatResult<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            "select external_id from call_sessions
             where workspace_id = $1 and platform = $2
             order by external_id asc
             limit $3 offset $4",
        )
        .bind(workspace_id)
        .bind(platform)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use chrono::Utc;

    async fn test_repo() -> Option<(PgCallRepository, PgPool)> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = create_pool(&url).await.expect("db should connect");
        run_migrations(&pool).await.expect("migrations should apply");
        Some((PgCallRepository::new(pool.clone()), pool))
    }

    fn make_session(workspace_id: Uuid, external_id: &str) -> CallSession {
        CallSession {
            id: Uuid::new_v4(),
            workspace_id,
            platform: "phoneburner".to_string(),
            external_id: external_id.to_string(),
            started_at: Some(Utc::now()),
            ended_at: None,
            dial_count: 12,
            raw_ref: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn make_dial(workspace_id: Uuid, session: &str, external_id: &str) -> Dial {
        Dial {
            id: Uuid::new_v4(),
            workspace_id,
            platform: "phoneburner".to_string(),
            external_id: external_id.to_string(),
            session_external_id: session.to_string(),
            contact_external_id: Some("pb-contact-1".to_string()),
            disposition: Some("connected".to_string()),
            duration_secs: Some(145),
            dialed_at: Some(Utc::now()),
            raw_ref: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn session_upsert_is_idempotent() {
        let (repo, pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let ws = Uuid::new_v4();
        let first = repo
            .upsert_session(make_session(ws, "sess-1"))
            .await
            .expect("first");
        let second = repo
            .upsert_session(make_session(ws, "sess-1"))
            .await
            .expect("second");
        assert_eq!(first.id, second.id);

        let count: i64 =
            sqlx::query_scalar("select count(*) from call_sessions where workspace_id = $1")
                .bind(ws)
                .fetch_one(&pool)
                .await
                .expect("count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn dial_upsert_is_idempotent() {
        let (repo, pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let ws = Uuid::new_v4();
        repo.upsert_dial(make_dial(ws, "sess-1", "dial-1"))
            .await
            .expect("first");
        repo.upsert_dial(make_dial(ws, "sess-1", "dial-1"))
            .await
            .expect("second");

        let count: i64 = sqlx::query_scalar("select count(*) from dials where workspace_id = $1")
            .bind(ws)
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn session_ids_page_deterministically() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let ws = Uuid::new_v4();
        for i in 0..5 {
            repo.upsert_session(make_session(ws, &format!("sess-{i}")))
                .await
                .expect("upsert");
        }

        let first = repo
            .session_external_ids(ws, "phoneburner", 0, 3)
            .await
            .expect("page 1");
        let second = repo
            .session_external_ids(ws, "phoneburner", 3, 3)
            .await
            .expect("page 2");

        assert_eq!(first, vec!["sess-0", "sess-1", "sess-2"]);
        assert_eq!(second, vec!["sess-3", "sess-4"]);
    }
}
