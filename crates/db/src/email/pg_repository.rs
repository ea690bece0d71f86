use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use crate::email::models::{EmailActivity, EmailEventKind, EmailEventTarget};
use crate::email::repositories::EmailActivityRepository;
use outbeat_common::error::{OutbeatError, OutbeatResult};

const RETURNING: &str = "id, workspace_id, campaign_id, contact_id, step, sent_at, open_count, \
     last_opened_at, click_count, last_clicked_at, replied_at, reply_category, bounced_at, \
     unsubscribed_at, finished_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgEmailActivityRepository {
    pool: PgPool,
}

impl PgEmailActivityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> OutbeatResult<EmailActivity> {
        Ok(EmailActivity {
            id: row.get("id"),
            workspace_id: row.get("workspace_id"),
            campaign_id: row.get("campaign_id"),
            contact_id: row.get("contact_id"),
            step: row.get("step"),
            sent_at: row.get("sent_at"),
            open_count: row.get("open_count"),
            last_opened_at: row.get("last_opened_at"),
            click_count: row.get("click_count"),
            last_clicked_at: row.get("last_clicked_at"),
            replied_at: row.get("replied_at"),
            reply_category: row.get("reply_category"),
            bounced_at: row.get("bounced_at"),
            unsubscribed_at: row.get("unsubscribed_at"),
            finished_at: row.get("finished_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    /// Upsert SQL for one event kind. Timestamp kinds keep the first-seen
    /// time; counter kinds accumulate per distinct event.
    fn fact_upsert_sql(kind: EmailEventKind) -> String {
        let (insert_cols, insert_vals, update_set) = match kind {
            EmailEventKind::Sent => ("sent_at", "$6", "sent_at = coalesce(email_activities.sent_at, excluded.sent_at)"),
            EmailEventKind::Opened => (
                "open_count, last_opened_at",
                "1, $6",
                "open_count = email_activities.open_count + 1, last_opened_at = excluded.last_opened_at",
            ),
            EmailEventKind::Clicked => (
                "click_count, last_clicked_at",
                "1, $6",
                "click_count = email_activities.click_count + 1, last_clicked_at = excluded.last_clicked_at",
            ),
            EmailEventKind::Replied => (
                "replied_at",
                "$6",
                "replied_at = coalesce(email_activities.replied_at, excluded.replied_at)",
            ),
            EmailEventKind::Bounced => (
                "bounced_at",
                "$6",
                "bounced_at = coalesce(email_activities.bounced_at, excluded.bounced_at)",
            ),
            EmailEventKind::Finished => (
                "finished_at",
                "$6",
                "finished_at = coalesce(email_activities.finished_at, excluded.finished_at)",
            ),
            EmailEventKind::Unsubscribed => (
                "unsubscribed_at",
                "$6",
                "unsubscribed_at = coalesce(email_activities.unsubscribed_at, excluded.unsubscribed_at)",
            ),
        };

        format!(
            "insert into email_activities (id, workspace_id, campaign_id, contact_id, step, {insert_cols})
             values ($1, $2, $3, $4, $5, {insert_vals})
             on conflict (workspace_id, campaign_id, contact_id, step) do update set
               {update_set}, updated_at = now()",
        )
    }
}

#[async_trait]
impl EmailActivityRepository for PgEmailActivityRepository {
    async fn apply_event(
        &self,
        raw_event_id: Uuid,
        target: &EmailEventTarget,
    ) -> OutbeatResult<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| OutbeatError::Database(e.to_string()))?;

        // Guard: only the delivery that flips the flag applies the event.
        let flipped = sqlx::query(
            "update webhook_events
             set processed = true, processed_at = now()
             where id = $1 and processed = false",
        )
        .bind(raw_event_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        if flipped.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| OutbeatError::Database(e.to_string()))?;
            return Ok(false);
        }

        sqlx::query(&Self::fact_upsert_sql(target.kind))
            .bind(Uuid::new_v4())
            .bind(target.workspace_id)
            .bind(target.campaign_id)
            .bind(target.contact_id)
            .bind(target.step)
            .bind(target.occurred_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| OutbeatError::Database(e.to_string()))?;

        sqlx::query(
            "insert into campaign_stats_hourly (campaign_id, bucket, event_type, count)
             values ($1, date_trunc('hour', $2::timestamptz), $3, 1)
             on conflict (campaign_id, bucket, event_type)
             do update set count = campaign_stats_hourly.count + 1",
        )
        .bind(target.campaign_id)
        .bind(target.occurred_at)
        .bind(target.kind.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        sqlx::query(
            "insert into campaign_stats_daily (campaign_id, bucket, event_type, count)
             values ($1, ($2::timestamptz)::date, $3, 1)
             on conflict (campaign_id, bucket, event_type)
             do update set count = campaign_stats_daily.count + 1",
        )
        .bind(target.campaign_id)
        .bind(target.occurred_at)
        .bind(target.kind.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| OutbeatError::Database(e.to_string()))?;

        Ok(true)
    }

    async fn set_reply_category(
        &self,
        workspace_id: Uuid,
        campaign_id: Uuid,
        contact_id: Uuid,
        step: i32,
        category: &str,
    ) -> OutbeatResult<()> {
        sqlx::query(
            "update email_activities
             set reply_category = $1, updated_at = now()
             where workspace_id = $2 and campaign_id = $3 and contact_id = $4 and step = $5",
        )
        .bind(category)
        .bind(workspace_id)
        .bind(campaign_id)
        .bind(contact_id)
        .bind(step)
        .execute(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        Ok(())
    }

    async fn get(
        &self,
        workspace_id: Uuid,
        campaign_id: Uuid,
        contact_id: Uuid,
        step: i32,
    ) -> OutbeatResult<Option<EmailActivity>> {
        let row = sqlx::query(&format!(
            "select {RETURNING} from email_activities
             where workspace_id = $1 and campaign_id = $2 and contact_id = $3 and step = $4",
        ))
        .bind(workspace_id)
        .bind(campaign_id)
        .bind(contact_id)
        .bind(step)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        row.map(Self::map_row).transpose()
    }

    async fn hourly_count(
        &self,
        campaign_id: Uuid,
        bucket: DateTime<Utc>,
        event_type: &str,
    ) -> OutbeatResult<i64> {
        let count: Option<i64> = sqlx::query_scalar(
            "select count from campaign_stats_hourly
             where campaign_id = $1 and bucket = date_trunc('hour', $2::timestamptz)
               and event_type = $3",
        )
        .bind(campaign_id)
        .bind(bucket)
        .bind(event_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))?;

        Ok(count.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::models::Campaign;
    use crate::campaign::pg_repository::PgCampaignRepository;
    use crate::campaign::repositories::CampaignRepository;
    use crate::contact::pg_repository::PgContactRepository;
    use crate::contact::repositories::ContactRepository;
    use crate::webhook::pg_repository::PgWebhookEventRepository;
    use crate::webhook::repositories::WebhookEventRepository;
    use crate::{create_pool, run_migrations};

    struct Fixture {
        repo: PgEmailActivityRepository,
        webhook_repo: PgWebhookEventRepository,
        workspace_id: Uuid,
        campaign_id: Uuid,
        contact_id: Uuid,
    }

    async fn fixture() -> Option<Fixture> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = create_pool(&url).await.expect("db should connect");
        run_migrations(&pool).await.expect("migrations should apply");

        let workspace_id = Uuid::new_v4();
        let campaign = PgCampaignRepository::new(pool.clone())
            .upsert_by_external_id(Campaign {
                id: Uuid::new_v4(),
                workspace_id,
                platform: "smartlead".to_string(),
                external_id: format!("cmp-{workspace_id}"),
                name: Some("Test".to_string()),
                status: None,
                raw_ref: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .expect("campaign");
        let contact = PgContactRepository::new(pool.clone())
            .get_or_create_by_email(workspace_id, "smartlead", "lead@example.com", None)
            .await
            .expect("contact");

        Some(Fixture {
            repo: PgEmailActivityRepository::new(pool.clone()),
            webhook_repo: PgWebhookEventRepository::new(pool),
            workspace_id,
            campaign_id: campaign.id,
            contact_id: contact.id,
        })
    }

    impl Fixture {
        async fn store_raw(&self, kind: EmailEventKind) -> Uuid {
            self.webhook_repo
                .store(
                    "smartlead",
                    kind.as_str(),
                    &Uuid::new_v4().to_string(),
                    &serde_json::json!({}),
                )
                .await
                .expect("raw event")
                .event
                .id
        }

        fn target(&self, kind: EmailEventKind, occurred_at: DateTime<Utc>) -> EmailEventTarget {
            EmailEventTarget {
                workspace_id: self.workspace_id,
                campaign_id: self.campaign_id,
                contact_id: self.contact_id,
                step: 1,
                kind,
                occurred_at,
            }
        }
    }

    #[tokio::test]
    async fn apply_sent_creates_fact_and_counter() {
        let fx = match fixture().await {
            Some(f) => f,
            None => return,
        };
        let now = Utc::now();
        let raw = fx.store_raw(EmailEventKind::Sent).await;

        let applied = fx
            .repo
            .apply_event(raw, &fx.target(EmailEventKind::Sent, now))
            .await
            .expect("apply");
        assert!(applied);

        let activity = fx
            .repo
            .get(fx.workspace_id, fx.campaign_id, fx.contact_id, 1)
            .await
            .expect("get")
            .expect("fact exists");
        assert!(activity.sent_at.is_some());

        let count = fx
            .repo
            .hourly_count(fx.campaign_id, now, "sent")
            .await
            .expect("count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn replayed_event_does_not_double_count() {
        let fx = match fixture().await {
            Some(f) => f,
            None => return,
        };
        let now = Utc::now();
        let raw = fx.store_raw(EmailEventKind::Sent).await;
        let target = fx.target(EmailEventKind::Sent, now);

        assert!(fx.repo.apply_event(raw, &target).await.expect("first"));
        // Redelivery of the same raw event loses the processed guard.
        assert!(!fx.repo.apply_event(raw, &target).await.expect("second"));

        let count = fx
            .repo
            .hourly_count(fx.campaign_id, now, "sent")
            .await
            .expect("count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn distinct_open_events_accumulate() {
        let fx = match fixture().await {
            Some(f) => f,
            None => return,
        };
        let now = Utc::now();

        for _ in 0..2 {
            let raw = fx.store_raw(EmailEventKind::Opened).await;
            assert!(fx
                .repo
                .apply_event(raw, &fx.target(EmailEventKind::Opened, now))
                .await
                .expect("apply"));
        }

        let activity = fx
            .repo
            .get(fx.workspace_id, fx.campaign_id, fx.contact_id, 1)
            .await
            .expect("get")
            .expect("fact exists");
        assert_eq!(activity.open_count, 2);

        let count = fx
            .repo
            .hourly_count(fx.campaign_id, now, "opened")
            .await
            .expect("count");
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn set_reply_category_updates_fact() {
        let fx = match fixture().await {
            Some(f) => f,
            None => return,
        };
        let now = Utc::now();
        let raw = fx.store_raw(EmailEventKind::Replied).await;
        fx.repo
            .apply_event(raw, &fx.target(EmailEventKind::Replied, now))
            .await
            .expect("apply");

        fx.repo
            .set_reply_category(fx.workspace_id, fx.campaign_id, fx.contact_id, 1, "interested")
            .await
            .expect("set category");

        let activity = fx
            .repo
            .get(fx.workspace_id, fx.campaign_id, fx.contact_id, 1)
            .await
            .expect("get")
            .expect("fact exists");
        assert_eq!(activity.reply_category.as_deref(), Some("interested"));
    }

    #[tokio::test]
    async fn raw_event_survives_when_handler_never_ran() {
        let fx = match fixture().await {
            Some(f) => f,
            None => return,
        };
        let raw = fx.store_raw(EmailEventKind::Clicked).await;

        // Nothing applied it yet: the raw row is still queryable and open.
        let event = fx
            .webhook_repo
            .get(raw)
            .await
            .expect("get")
            .expect("raw row exists");
        assert!(!event.processed);

        // A later replay applies it exactly once.
        let applied = fx
            .repo
            .apply_event(raw, &fx.target(EmailEventKind::Clicked, Utc::now()))
            .await
            .expect("replay");
        assert!(applied);
    }
}
