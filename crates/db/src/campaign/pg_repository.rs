use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::campaign::models::Campaign;
use crate::campaign::repositories::CampaignRepository;
use outbeat_common::error::{OutbeatError, OutbeatResult};

const RETURNING: &str =
    "id, workspace_id, platform, external_id, name, status, raw_ref, created_at, updated_at";

#[derive(Clone)]
pub struct PgCampaignRepository {
    pool: PgPool,
}

impl PgCampaignRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> OutbeatResult<Campaign> {
        Ok(Campaign {
            id: row.get("id"),
            workspace_id: row.get("workspace_id"),
            platform: row.get("platform"),
            external_id: row.get("external_id"),
            name: row.get("name"),
            status: row.get("status"),
            raw_ref: row.get("raw_ref"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl CampaignRepository for PgCampaignRepository {
    async fn upsert_by_external_id(&self, campaign: Campaign) -> OutbeatResult<Campaign> {
        let row = sqlx::query(&format!(
            "insert into campaigns
             (id, workspace_id, platform, external_id, name, status, raw_ref)
             values ($1, $2, $3, $4, $5, $6, $7)
             on conflict (workspace_id, platform, external_id) do update set
               name = coalesce(excluded.name, campaigns.name),
               status = coalesce(excluded.status, campaigns.status),
               raw_ref = coalesce(excluded.raw_ref, campaigns.raw_ref),
               updated_at = now()
             returning {RETURNING}",
        ))
        .bind(campaign.id)
        .bind(campaign.workspace_id)
        .bind(&campaign.platform)
        .bind(&campaign.external_id)
        .bind(&campaign.name)
        .bind(&campaign.status)
        .bind(&campaign.raw_ref)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        Self::map_row(row)
    }

    async fn find_by_external_id(
        &self,
        platform: &str,
        external_id: &str,
    ) -> OutbeatResult<Option<Campaign>> {
        let row = sqlx::query(&format!(
            "select {RETURNING} from campaigns
             where platform = $1 and external_id = $2
             order by created_at asc
             limit 1",
        ))
        .bind(platform)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }

    async fn external_ids(
        &self,
        workspace_id: Uuid,
        platform: &str,
        offset: i64,
        limit: i64,
    ) -> OutbeatResult<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            "select external_id from campaigns
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
    use uuid::Uuid;

    async fn test_repo() -> Option<(PgCampaignRepository, PgPool)> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = create_pool(&url).await.expect("db should connect");
        run_migrations(&pool).await.expect("migrations should apply");
        Some((PgCampaignRepository::new(pool.clone()), pool))
    }

    fn make_campaign(workspace_id: Uuid, external_id: &str) -> Campaign {
        Campaign {
            id: Uuid::new_v4(),
            workspace_id,
            platform: "smartlead".to_string(),
            external_id: external_id.to_string(),
            name: Some("Q3 Outbound".to_string()),
            status: Some("active".to_string()),
            raw_ref: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_twice_keeps_one_row() {
        let (repo, pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let ws = Uuid::new_v4();
        let first = repo
            .upsert_by_external_id(make_campaign(ws, "cmp-1"))
            .await
            .expect("first");
        let second = repo
            .upsert_by_external_id(make_campaign(ws, "cmp-1"))
            .await
            .expect("second");
        assert_eq!(first.id, second.id);

        let count: i64 = sqlx::query_scalar(
            "select count(*) from campaigns where workspace_id = $1 and external_id = 'cmp-1'",
        )
        .bind(ws)
        .fetch_one(&pool)
        .await
        .expect("count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn find_by_external_id_resolves_workspace() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let ws = Uuid::new_v4();
        let external = format!("cmp-{}", Uuid::new_v4());
        repo.upsert_by_external_id(make_campaign(ws, &external))
            .await
            .expect("upsert");

        let found = repo
            .find_by_external_id("smartlead", &external)
            .await
            .expect("find")
            .expect("should resolve");
        assert_eq!(found.workspace_id, ws);
    }

    #[tokio::test]
    async fn external_ids_page_deterministically() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let ws = Uuid::new_v4();
        for i in 0..4 {
            repo.upsert_by_external_id(make_campaign(ws, &format!("cmp-{i}")))
                .await
                .expect("upsert");
        }

        let first = repo
            .external_ids(ws, "smartlead", 0, 3)
            .await
            .expect("page 1");
        let second = repo
            .external_ids(ws, "smartlead", 3, 3)
            .await
            .expect("page 2");
        assert_eq!(first, vec!["cmp-0", "cmp-1", "cmp-2"]);
        assert_eq!(second, vec!["cmp-3"]);
    }

    #[tokio::test]
    async fn find_by_external_id_misses_unknown_campaign() {
        let (repo, _pool) = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let found = repo
            .find_by_external_id("smartlead", "never-synced")
            .await
            .expect("find");
        assert!(found.is_none());
    }
}
