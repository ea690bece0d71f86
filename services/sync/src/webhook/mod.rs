pub mod event;
pub mod routes;

use std::time::Duration;

use serde::Serialize;

use outbeat_common::error::OutbeatResult;
use outbeat_db::campaign::repositories::CampaignRepository;
use outbeat_db::contact::repositories::ContactRepository;
use outbeat_db::email::models::{EmailEventKind, EmailEventTarget};
use outbeat_db::email::repositories::EmailActivityRepository;
use outbeat_db::webhook::models::WebhookEvent;
use outbeat_db::webhook::repositories::WebhookEventRepository;

use crate::webhook::event::Envelope;

pub const SOURCE_SMARTLEAD: &str = "smartlead";

/// Explicit outcome of one pipeline pass over an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Raw event was already applied; nothing to do.
    Duplicate,
    /// Stored durably but the campaign (or lead) is not known yet; held
    /// unprocessed for reconciliation.
    Unresolved,
    /// Event type this pipeline does not handle; consumed with no domain
    /// effect.
    UnknownType,
    Applied(EmailEventKind),
}

impl IngestOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Unresolved => "unresolved",
            Self::UnknownType => "ignored",
            Self::Applied(_) => "accepted",
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct ReconcileSummary {
    pub scanned: usize,
    pub applied: usize,
    pub still_unresolved: usize,
}

/// Fire-and-forget reply classification against a downstream service.
#[derive(Clone)]
pub struct ReplyClassifier {
    http: reqwest::Client,
    url: String,
}

impl ReplyClassifier {
    pub fn new(url: String) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http, url })
    }

    pub async fn classify(&self, text: &str) -> Option<String> {
        let response = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .ok()?;
        let body = response.json::<serde_json::Value>().await.ok()?;
        body.get("category")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}

/// Staged webhook pipeline: persist → resolve → dispatch. Each stage
/// returns an explicit outcome so redelivery and reconciliation replay the
/// same path.
pub struct WebhookPipeline<W, M, C, E> {
    webhook_repo: W,
    campaign_repo: M,
    contact_repo: C,
    email_repo: E,
    classifier: Option<ReplyClassifier>,
}

impl<W, M, C, E> WebhookPipeline<W, M, C, E>
where
    W: WebhookEventRepository,
    M: CampaignRepository,
    C: ContactRepository,
    E: EmailActivityRepository + Clone + Send + Sync + 'static,
{
    pub fn new(
        webhook_repo: W,
        campaign_repo: M,
        contact_repo: C,
        email_repo: E,
        classifier: Option<ReplyClassifier>,
    ) -> Self {
        Self {
            webhook_repo,
            campaign_repo,
            contact_repo,
            email_repo,
            classifier,
        }
    }

    /// Accept one push event. The raw row is stored before any domain
    /// interpretation; an error after that point leaves it unprocessed and
    /// recoverable.
    pub async fn ingest(&self, payload: &serde_json::Value) -> OutbeatResult<IngestOutcome> {
        let envelope = Envelope::from_payload(payload);

        let stored = self
            .webhook_repo
            .store(
                SOURCE_SMARTLEAD,
                &envelope.event_type,
                &envelope.event_id,
                payload,
            )
            .await?;

        if !stored.inserted && stored.event.processed {
            tracing::debug!(event_id = %envelope.event_id, "redelivered event already applied");
            return Ok(IngestOutcome::Duplicate);
        }

        self.apply(&stored.event).await
    }

    /// Resolution + dispatch for a stored raw event. Shared by the live
    /// ingest path and the reconciliation pass.
    async fn apply(&self, event: &WebhookEvent) -> OutbeatResult<IngestOutcome> {
        let kind = match event.event_type.parse::<EmailEventKind>() {
            Ok(kind) => kind,
            Err(_) => {
                self.webhook_repo.mark_processed(event.id).await?;
                tracing::info!(event_type = %event.event_type, "consumed unhandled event type");
                return Ok(IngestOutcome::UnknownType);
            }
        };

        let envelope = Envelope::from_payload(&event.payload);

        let campaign_external_id = match envelope.campaign_external_id.as_deref() {
            Some(id) => id,
            None => return Ok(IngestOutcome::Unresolved),
        };
        let campaign = match self
            .campaign_repo
            .find_by_external_id(SOURCE_SMARTLEAD, campaign_external_id)
            .await?
        {
            Some(campaign) => campaign,
            None => {
                tracing::info!(
                    campaign = campaign_external_id,
                    "webhook campaign unknown, holding for reconciliation"
                );
                return Ok(IngestOutcome::Unresolved);
            }
        };

        let email = match envelope.lead_email.as_deref() {
            Some(email) => email,
            None => return Ok(IngestOutcome::Unresolved),
        };
        let contact = self
            .contact_repo
            .get_or_create_by_email(
                campaign.workspace_id,
                SOURCE_SMARTLEAD,
                email,
                envelope.lead_name.as_deref(),
            )
            .await?;

        let target = EmailEventTarget {
            workspace_id: campaign.workspace_id,
            campaign_id: campaign.id,
            contact_id: contact.id,
            step: envelope.step,
            kind,
            occurred_at: envelope.occurred_at,
        };

        let applied = self.email_repo.apply_event(event.id, &target).await?;
        if !applied {
            return Ok(IngestOutcome::Duplicate);
        }

        if kind == EmailEventKind::Replied {
            self.spawn_classification(&envelope, &target);
        }

        Ok(IngestOutcome::Applied(kind))
    }

    /// The webhook response never blocks on classification.
    fn spawn_classification(&self, envelope: &Envelope, target: &EmailEventTarget) {
        let classifier = match self.classifier.clone() {
            Some(c) => c,
            None => return,
        };
        let text = match envelope.reply_text.clone() {
            Some(t) if !t.is_empty() => t,
            _ => return,
        };
        let email_repo = self.email_repo.clone();
        let target = target.clone();

        tokio::spawn(async move {
            if let Some(category) = classifier.classify(&text).await {
                if let Err(e) = email_repo
                    .set_reply_category(
                        target.workspace_id,
                        target.campaign_id,
                        target.contact_id,
                        target.step,
                        &category,
                    )
                    .await
                {
                    tracing::warn!(error = %e, "reply category write failed");
                }
            }
        });
    }

    /// Re-run resolution for held events, oldest first. Events whose
    /// campaign has since been synced get applied; the rest stay held.
    pub async fn reconcile(&self, limit: i64) -> OutbeatResult<ReconcileSummary> {
        let events = self.webhook_repo.unprocessed(SOURCE_SMARTLEAD, limit).await?;

        let mut summary = ReconcileSummary {
            scanned: events.len(),
            ..Default::default()
        };

        for event in &events {
            match self.apply(event).await {
                Ok(IngestOutcome::Unresolved) => summary.still_unresolved += 1,
                Ok(_) => summary.applied += 1,
                Err(e) => {
                    tracing::warn!(event_id = %event.event_id, error = %e, "reconcile pass failed");
                    summary.still_unresolved += 1;
                }
            }
        }

        Ok(summary)
    }
}
