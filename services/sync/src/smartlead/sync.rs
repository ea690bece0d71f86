use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use outbeat_db::campaign::models::Campaign;
use outbeat_db::campaign::repositories::CampaignRepository;
use outbeat_db::connection::repositories::ConnectionRepository;
use outbeat_db::contact::models::Contact;
use outbeat_db::contact::repositories::ContactRepository;

use crate::budget::TimeBudget;
use crate::connector::{Connector, SyncError, SyncOptions, SyncOutcome, SyncTuning};
use crate::progress::{SyncCounters, SyncProgress};
use crate::smartlead::client::SmartleadClient;
use crate::smartlead::models::{CampaignRecord, LeadRecord};

pub const PLATFORM: &str = "smartlead";

const STEP_CAMPAIGNS: &str = "campaigns";
const STEP_LEADS: &str = "leads";

enum StepEnd {
    Complete,
    Yielded,
}

pub struct SmartleadSyncer<S, M, C> {
    workspace_id: Uuid,
    client: SmartleadClient,
    conn_repo: S,
    campaign_repo: M,
    contact_repo: C,
    tuning: SyncTuning,
}

impl<S, M, C> SmartleadSyncer<S, M, C>
where
    S: ConnectionRepository,
    M: CampaignRepository,
    C: ContactRepository,
{
    pub fn new(
        workspace_id: Uuid,
        client: SmartleadClient,
        conn_repo: S,
        campaign_repo: M,
        contact_repo: C,
        tuning: SyncTuning,
    ) -> Self {
        Self {
            workspace_id,
            client,
            conn_repo,
            campaign_repo,
            contact_repo,
            tuning,
        }
    }

    fn to_campaign(&self, record: CampaignRecord) -> Campaign {
        let now = Utc::now();
        Campaign {
            id: Uuid::new_v4(),
            workspace_id: self.workspace_id,
            platform: PLATFORM.to_string(),
            external_id: record.external_id,
            name: record.name,
            status: record.status,
            raw_ref: Some(record.raw),
            created_at: now,
            updated_at: now,
        }
    }

    fn to_contact(&self, record: LeadRecord) -> Contact {
        let now = Utc::now();
        Contact {
            id: Uuid::new_v4(),
            workspace_id: self.workspace_id,
            platform: PLATFORM.to_string(),
            external_id: record.external_id,
            email: record.email,
            display_name: record.display_name,
            company: record.company,
            phone: None,
            raw_ref: Some(record.raw),
            created_at: now,
            updated_at: now,
        }
    }

    async fn run_steps(
        &self,
        conn_id: Uuid,
        progress: &mut SyncProgress,
        run: &mut SyncCounters,
        budget: &TimeBudget,
    ) -> Result<bool, SyncError> {
        loop {
            let end = match progress.step.as_str() {
                STEP_CAMPAIGNS => self.campaigns_step(conn_id, progress, run, budget).await?,
                STEP_LEADS => self.leads_step(conn_id, progress, run, budget).await?,
                other => {
                    tracing::warn!(step = other, "unknown checkpoint step, restarting series");
                    progress.advance_step(STEP_CAMPAIGNS);
                    continue;
                }
            };

            if let StepEnd::Yielded = end {
                return Ok(false);
            }

            match progress.step.as_str() {
                STEP_CAMPAIGNS => progress.advance_step(STEP_LEADS),
                _ => {
                    progress.finish();
                    return Ok(true);
                }
            }

            self.conn_repo
                .save_progress(conn_id, &progress.to_value())
                .await?;
            if budget.expired() {
                return Ok(false);
            }
        }
    }

    async fn campaigns_step(
        &self,
        conn_id: Uuid,
        progress: &mut SyncProgress,
        run: &mut SyncCounters,
        budget: &TimeBudget,
    ) -> Result<StepEnd, SyncError> {
        let page_size = self.client.config().page_size as usize;

        loop {
            let records = self
                .client
                .fetch_campaigns_page(progress.offset)
                .await
                .map_err(SyncError::from_client)?;
            let fetched = records.len();

            let mut page = SyncCounters::default();
            for record in records {
                match record {
                    Ok(r) => match self
                        .campaign_repo
                        .upsert_by_external_id(self.to_campaign(r))
                        .await
                    {
                        Ok(_) => page.campaigns_synced += 1,
                        Err(e) => {
                            tracing::warn!(error = %e, "campaign upsert failed");
                            page.record_errors += 1;
                        }
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping malformed campaign");
                        page.record_errors += 1;
                    }
                }
            }

            progress.counters.merge(&page);
            run.merge(&page);

            if fetched < page_size {
                return Ok(StepEnd::Complete);
            }

            progress.offset += fetched as i64;
            self.conn_repo
                .save_progress(conn_id, &progress.to_value())
                .await?;
            if budget.expired() {
                tracing::info!(
                    step = STEP_CAMPAIGNS,
                    offset = progress.offset,
                    "time budget reached, yielding"
                );
                return Ok(StepEnd::Yielded);
            }
        }
    }

    async fn leads_step(
        &self,
        conn_id: Uuid,
        progress: &mut SyncProgress,
        run: &mut SyncCounters,
        budget: &TimeBudget,
    ) -> Result<StepEnd, SyncError> {
        let page_size = self.client.config().page_size as usize;

        loop {
            // One campaign at a time; `offset` indexes the stored campaigns.
            let ids = self
                .campaign_repo
                .external_ids(self.workspace_id, PLATFORM, progress.offset, 1)
                .await?;
            let campaign_id = match ids.first() {
                Some(id) => id.clone(),
                None => return Ok(StepEnd::Complete),
            };

            loop {
                let lead_offset = (progress.page - 1) as i64 * page_size as i64;
                let records = self
                    .client
                    .fetch_campaign_leads(&campaign_id, lead_offset)
                    .await
                    .map_err(SyncError::from_client)?;
                let fetched = records.len();

                let mut page = SyncCounters::default();
                for record in records {
                    match record {
                        Ok(r) => match self
                            .contact_repo
                            .upsert_by_external_id(self.to_contact(r))
                            .await
                        {
                            Ok(_) => page.leads_synced += 1,
                            Err(e) => {
                                tracing::warn!(error = %e, "lead upsert failed");
                                page.record_errors += 1;
                            }
                        },
                        Err(e) => {
                            tracing::warn!(error = %e, "skipping malformed lead");
                            page.record_errors += 1;
                        }
                    }
                }

                progress.counters.merge(&page);
                run.merge(&page);

                let campaign_drained = fetched < page_size;
                if campaign_drained {
                    progress.offset += 1;
                    progress.page = 1;
                } else {
                    progress.page += 1;
                }

                self.conn_repo
                    .save_progress(conn_id, &progress.to_value())
                    .await?;
                if budget.expired() {
                    tracing::info!(
                        step = STEP_LEADS,
                        campaign = %campaign_id,
                        "time budget reached, yielding"
                    );
                    return Ok(StepEnd::Yielded);
                }

                if campaign_drained {
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl<S, M, C> Connector for SmartleadSyncer<S, M, C>
where
    S: ConnectionRepository,
    M: CampaignRepository,
    C: ContactRepository,
{
    fn platform(&self) -> &str {
        PLATFORM
    }

    async fn sync(&self, opts: SyncOptions) -> Result<SyncOutcome, SyncError> {
        self.conn_repo
            .get_or_create(self.workspace_id, PLATFORM)
            .await?;

        let claim = self
            .conn_repo
            .acquire(self.workspace_id, PLATFORM, self.tuning.stale_after())
            .await?;

        let claim = match claim {
            Some(c) => c,
            None => {
                tracing::info!(
                    workspace = %self.workspace_id,
                    "smartlead sync already running, declining"
                );
                return Ok(SyncOutcome {
                    platform: PLATFORM.to_string(),
                    done: false,
                    message: "sync already running".to_string(),
                    counters: SyncCounters::default(),
                });
            }
        };

        let mut progress = if opts.reset {
            SyncProgress::start(STEP_CAMPAIGNS)
        } else {
            SyncProgress::load(claim.sync_progress.as_ref(), STEP_CAMPAIGNS)
        };
        if progress.window_end.is_none() {
            progress.window_end = Some(Utc::now());
        }

        let budget = TimeBudget::new(self.tuning.time_budget);
        let mut run = SyncCounters::default();

        match self
            .run_steps(claim.id, &mut progress, &mut run, &budget)
            .await
        {
            Ok(true) => {
                self.conn_repo
                    .mark_success(claim.id, &progress.to_value())
                    .await?;
                tracing::info!(workspace = %self.workspace_id, ?run, "smartlead sync complete");
                Ok(SyncOutcome {
                    platform: PLATFORM.to_string(),
                    done: true,
                    message: "sync complete".to_string(),
                    counters: run,
                })
            }
            Ok(false) => {
                self.conn_repo
                    .yield_claim(claim.id, &progress.to_value())
                    .await?;
                Ok(SyncOutcome {
                    platform: PLATFORM.to_string(),
                    done: false,
                    message: "time budget exhausted, checkpoint saved".to_string(),
                    counters: run,
                })
            }
            Err(err) => {
                let message = err.to_string();
                tracing::error!(workspace = %self.workspace_id, error = %message, "smartlead sync failed");
                if let Err(e) = self
                    .conn_repo
                    .mark_error(claim.id, Some(&progress.to_value()), &message)
                    .await
                {
                    tracing::error!(error = %e, "failed to record sync error");
                }
                Err(err)
            }
        }
    }
}
