use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use outbeat_db::call::models::{CallSession, Dial};
use outbeat_db::call::repositories::CallRepository;
use outbeat_db::connection::repositories::ConnectionRepository;
use outbeat_db::contact::models::Contact;
use outbeat_db::contact::repositories::ContactRepository;

use crate::budget::TimeBudget;
use crate::chunk::chunk_window;
use crate::connector::{Connector, SyncError, SyncOptions, SyncOutcome, SyncTuning};
use crate::phoneburner::client::PhoneBurnerClient;
use crate::phoneburner::models::{ContactRecord, DialRecord, SessionRecord};
use crate::progress::{SyncCounters, SyncProgress};

pub const PLATFORM: &str = "phoneburner";

const STEP_CONTACTS: &str = "contacts";
const STEP_SESSIONS: &str = "sessions";
const STEP_SESSION_DETAILS: &str = "session_details";

enum StepEnd {
    Complete,
    Yielded,
}

pub struct PhoneBurnerSyncer<S, C, K> {
    workspace_id: Uuid,
    client: PhoneBurnerClient,
    conn_repo: S,
    contact_repo: C,
    call_repo: K,
    tuning: SyncTuning,
}

impl<S, C, K> PhoneBurnerSyncer<S, C, K>
where
    S: ConnectionRepository,
    C: ContactRepository,
    K: CallRepository,
{
    pub fn new(
        workspace_id: Uuid,
        client: PhoneBurnerClient,
        conn_repo: S,
        contact_repo: C,
        call_repo: K,
        tuning: SyncTuning,
    ) -> Self {
        Self {
            workspace_id,
            client,
            conn_repo,
            contact_repo,
            call_repo,
            tuning,
        }
    }

    fn to_contact(&self, record: ContactRecord) -> Contact {
        let now = Utc::now();
        Contact {
            id: Uuid::new_v4(),
            workspace_id: self.workspace_id,
            platform: PLATFORM.to_string(),
            external_id: record.external_id,
            email: record.email,
            display_name: record.display_name,
            company: record.company,
            phone: record.phone,
            raw_ref: Some(record.raw),
            created_at: now,
            updated_at: now,
        }
    }

    fn to_session(&self, record: SessionRecord) -> CallSession {
        let now = Utc::now();
        CallSession {
            id: Uuid::new_v4(),
            workspace_id: self.workspace_id,
            platform: PLATFORM.to_string(),
            external_id: record.external_id,
            started_at: record.started_at,
            ended_at: record.ended_at,
            dial_count: record.dial_count,
            raw_ref: Some(record.raw),
            created_at: now,
            updated_at: now,
        }
    }

    fn to_dial(&self, session_external_id: &str, record: DialRecord) -> Dial {
        let now = Utc::now();
        Dial {
            id: Uuid::new_v4(),
            workspace_id: self.workspace_id,
            platform: PLATFORM.to_string(),
            external_id: record.external_id,
            session_external_id: session_external_id.to_string(),
            contact_external_id: record.contact_external_id,
            disposition: record.disposition,
            duration_secs: record.duration_secs,
            dialed_at: record.dialed_at,
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
                STEP_CONTACTS => self.contacts_step(conn_id, progress, run, budget).await?,
                STEP_SESSIONS => self.sessions_step(conn_id, progress, run, budget).await?,
                STEP_SESSION_DETAILS => {
                    self.session_details_step(conn_id, progress, run, budget)
                        .await?
                }
                other => {
                    tracing::warn!(step = other, "unknown checkpoint step, restarting series");
                    progress.advance_step(STEP_CONTACTS);
                    continue;
                }
            };

            if let StepEnd::Yielded = end {
                return Ok(false);
            }

            match progress.step.as_str() {
                STEP_CONTACTS => progress.advance_step(STEP_SESSIONS),
                STEP_SESSIONS => progress.advance_step(STEP_SESSION_DETAILS),
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

    async fn contacts_step(
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
                .fetch_contacts_page(progress.page)
                .await
                .map_err(SyncError::from_client)?;
            let fetched = records.len();

            let mut page = SyncCounters::default();
            for record in records {
                match record {
                    Ok(r) => match self.contact_repo.upsert_by_external_id(self.to_contact(r)).await
                    {
                        Ok(_) => page.contacts_synced += 1,
                        Err(e) => {
                            tracing::warn!(error = %e, "contact upsert failed");
                            page.record_errors += 1;
                        }
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping malformed contact");
                        page.record_errors += 1;
                    }
                }
            }

            progress.counters.merge(&page);
            run.merge(&page);

            if fetched < page_size {
                return Ok(StepEnd::Complete);
            }

            progress.page += 1;
            self.conn_repo
                .save_progress(conn_id, &progress.to_value())
                .await?;
            if budget.expired() {
                tracing::info!(
                    step = STEP_CONTACTS,
                    next_page = progress.page,
                    "time budget reached, yielding"
                );
                return Ok(StepEnd::Yielded);
            }
        }
    }

    async fn sessions_step(
        &self,
        conn_id: Uuid,
        progress: &mut SyncProgress,
        run: &mut SyncCounters,
        budget: &TimeBudget,
    ) -> Result<StepEnd, SyncError> {
        let page_size = self.client.config().page_size as usize;
        let window_end = progress.window_end.unwrap_or_else(Utc::now);
        let window_start = window_end - Duration::days(self.tuning.lookback_days);
        let chunks = chunk_window(
            window_start,
            window_end,
            self.client.config().max_range_days,
        );

        loop {
            let range = match chunks.get(progress.chunk_index) {
                Some(range) => range,
                None => return Ok(StepEnd::Complete),
            };

            let records = self
                .client
                .fetch_sessions_page(range, progress.page)
                .await
                .map_err(SyncError::from_client)?;
            let fetched = records.len();

            let mut page = SyncCounters::default();
            for record in records {
                match record {
                    Ok(r) => match self.call_repo.upsert_session(self.to_session(r)).await {
                        Ok(_) => page.sessions_synced += 1,
                        Err(e) => {
                            tracing::warn!(error = %e, "session upsert failed");
                            page.record_errors += 1;
                        }
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping malformed session");
                        page.record_errors += 1;
                    }
                }
            }

            progress.counters.merge(&page);
            run.merge(&page);

            if fetched < page_size {
                // This date sub-range is drained; move to the next one.
                progress.chunk_index += 1;
                progress.page = 1;
            } else {
                progress.page += 1;
            }

            self.conn_repo
                .save_progress(conn_id, &progress.to_value())
                .await?;
            if budget.expired() {
                tracing::info!(
                    step = STEP_SESSIONS,
                    chunk = progress.chunk_index,
                    "time budget reached, yielding"
                );
                return Ok(StepEnd::Yielded);
            }
        }
    }

    async fn session_details_step(
        &self,
        conn_id: Uuid,
        progress: &mut SyncProgress,
        run: &mut SyncCounters,
        budget: &TimeBudget,
    ) -> Result<StepEnd, SyncError> {
        loop {
            let session_ids = self
                .call_repo
                .session_external_ids(
                    self.workspace_id,
                    PLATFORM,
                    progress.offset,
                    self.tuning.detail_batch,
                )
                .await?;
            if session_ids.is_empty() {
                return Ok(StepEnd::Complete);
            }

            let mut page = SyncCounters::default();
            for session_id in &session_ids {
                match self.client.fetch_session_dials(session_id).await {
                    Err(e) if e.is_auth() => return Err(SyncError::from_client(e)),
                    Err(e) => {
                        // One unfetchable session does not abort the batch.
                        tracing::warn!(session = %session_id, error = %e, "dial fetch failed");
                        page.record_errors += 1;
                    }
                    Ok(records) => {
                        for record in records {
                            match record {
                                Ok(r) => match self
                                    .call_repo
                                    .upsert_dial(self.to_dial(session_id, r))
                                    .await
                                {
                                    Ok(_) => page.dials_synced += 1,
                                    Err(e) => {
                                        tracing::warn!(error = %e, "dial upsert failed");
                                        page.record_errors += 1;
                                    }
                                },
                                Err(e) => {
                                    tracing::warn!(error = %e, "skipping malformed dial");
                                    page.record_errors += 1;
                                }
                            }
                        }
                    }
                }
            }

            progress.offset += session_ids.len() as i64;
            progress.counters.merge(&page);
            run.merge(&page);

            self.conn_repo
                .save_progress(conn_id, &progress.to_value())
                .await?;
            if budget.expired() {
                tracing::info!(
                    step = STEP_SESSION_DETAILS,
                    offset = progress.offset,
                    "time budget reached, yielding"
                );
                return Ok(StepEnd::Yielded);
            }
        }
    }
}

#[async_trait]
impl<S, C, K> Connector for PhoneBurnerSyncer<S, C, K>
where
    S: ConnectionRepository,
    C: ContactRepository,
    K: CallRepository,
{
    fn platform(&self) -> &str {
        PLATFORM
    }

    async fn sync(&self, opts: SyncOptions) -> Result<SyncOutcome, SyncError> {
        // Ensure the connection row exists before trying to claim it.
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
                    "phoneburner sync already running, declining"
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
            SyncProgress::start(STEP_CONTACTS)
        } else {
            SyncProgress::load(claim.sync_progress.as_ref(), STEP_CONTACTS)
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
                tracing::info!(workspace = %self.workspace_id, ?run, "phoneburner sync complete");
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
                tracing::error!(workspace = %self.workspace_id, error = %message, "phoneburner sync failed");
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
