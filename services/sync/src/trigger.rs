use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use outbeat_common::error::OutbeatError;
use outbeat_db::connection::repositories::ConnectionRepository;
use outbeat_db::retry::repositories::RetryQueueRepository;

use crate::connector::{Connector, SyncError, SyncOptions, SyncOutcome};
use crate::error::ApiError;
use crate::phoneburner::sync::PhoneBurnerSyncer;
use crate::progress::SyncCounters;
use crate::retry;
use crate::smartlead::sync::SmartleadSyncer;
use crate::{phoneburner, smartlead, AppState};

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub workspace_id: Uuid,
    pub sync_type: Option<String>,
    #[serde(default)]
    pub reset: bool,
    #[serde(default)]
    pub diagnostic: bool,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub done: bool,
    pub message: String,
    #[serde(flatten)]
    pub counters: SyncCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<serde_json::Value>,
}

fn selected_platforms(sync_type: Option<&str>) -> Result<Vec<&'static str>, OutbeatError> {
    match sync_type {
        None => Ok(vec![phoneburner::sync::PLATFORM, smartlead::sync::PLATFORM]),
        Some("phoneburner") => Ok(vec![phoneburner::sync::PLATFORM]),
        Some("smartlead") => Ok(vec![smartlead::sync::PLATFORM]),
        Some(other) => Err(OutbeatError::Validation(format!(
            "sync_type must be 'phoneburner' or 'smartlead', got '{other}'"
        ))),
    }
}

/// Standard sync entry point, shared by the HTTP trigger and the retry
/// queue processor. A terminal non-auth failure enqueues a retry entry
/// unless the invocation is itself a retry.
pub async fn run_platform(
    state: &AppState,
    workspace_id: Uuid,
    platform: &str,
    opts: SyncOptions,
) -> Result<SyncOutcome, SyncError> {
    let result = match platform {
        phoneburner::sync::PLATFORM => {
            let client = state
                .phoneburner
                .clone()
                .ok_or_else(|| SyncError::NotConfigured("phoneburner".to_string()))?;
            PhoneBurnerSyncer::new(
                workspace_id,
                client,
                state.connection_repo.clone(),
                state.contact_repo.clone(),
                state.call_repo.clone(),
                state.tuning(),
            )
            .sync(opts)
            .await
        }
        smartlead::sync::PLATFORM => {
            let client = state
                .smartlead
                .clone()
                .ok_or_else(|| SyncError::NotConfigured("smartlead".to_string()))?;
            SmartleadSyncer::new(
                workspace_id,
                client,
                state.connection_repo.clone(),
                state.campaign_repo.clone(),
                state.contact_repo.clone(),
                state.tuning(),
            )
            .sync(opts)
            .await
        }
        other => Err(SyncError::NotConfigured(format!(
            "unknown platform: {other}"
        ))),
    };

    if let Err(err) = &result {
        if !opts.retry && err.retryable() {
            enqueue_retry(state, workspace_id, platform, err).await;
        }
    }

    result
}

async fn enqueue_retry(state: &AppState, workspace_id: Uuid, platform: &str, err: &SyncError) {
    let connection = match state.connection_repo.get(workspace_id, platform).await {
        Ok(Some(conn)) => conn,
        Ok(None) => return,
        Err(e) => {
            tracing::error!(error = %e, "connection lookup for retry enqueue failed");
            return;
        }
    };

    let next_retry_at = Utc::now() + retry::backoff(1);
    match state
        .retry_repo
        .enqueue(
            connection.id,
            retry::DEFAULT_MAX_RETRIES,
            next_retry_at,
            &err.to_string(),
        )
        .await
    {
        Ok(entry) => {
            tracing::info!(
                connection = %connection.id,
                entry = %entry.id,
                %next_retry_at,
                "sync failure queued for retry"
            );
        }
        Err(e) => tracing::error!(error = %e, "retry enqueue failed"),
    }
}

async fn run_diagnostics(state: &AppState, platforms: &[&str]) -> SyncResponse {
    let mut report = serde_json::Map::new();

    for platform in platforms {
        let shape = match *platform {
            phoneburner::sync::PLATFORM => match &state.phoneburner {
                Some(client) => client
                    .diagnostic()
                    .await
                    .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() })),
                None => serde_json::json!({ "error": "not configured" }),
            },
            smartlead::sync::PLATFORM => match &state.smartlead {
                Some(client) => client
                    .diagnostic()
                    .await
                    .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() })),
                None => serde_json::json!({ "error": "not configured" }),
            },
            _ => serde_json::json!({ "error": "unknown platform" }),
        };
        report.insert((*platform).to_string(), shape);
    }

    SyncResponse {
        success: true,
        done: true,
        message: "diagnostic complete".to_string(),
        counters: SyncCounters::default(),
        diagnostics: Some(serde_json::Value::Object(report)),
    }
}

async fn trigger_sync(
    State(state): State<AppState>,
    Json(body): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, ApiError> {
    let platforms = selected_platforms(body.sync_type.as_deref())?;

    if body.diagnostic {
        // Diagnostic mode performs no writes.
        return Ok(Json(run_diagnostics(&state, &platforms).await));
    }

    let opts = SyncOptions {
        reset: body.reset,
        retry: false,
    };

    let mut success = true;
    let mut done = true;
    let mut counters = SyncCounters::default();
    let mut messages = Vec::new();

    for platform in &platforms {
        match run_platform(&state, body.workspace_id, platform, opts).await {
            Ok(outcome) => {
                done &= outcome.done;
                counters.merge(&outcome.counters);
                messages.push(format!("{platform}: {}", outcome.message));
            }
            Err(err) => {
                success = false;
                done = false;
                messages.push(format!("{platform}: {err}"));
            }
        }
    }

    Ok(Json(SyncResponse {
        success,
        done,
        message: messages.join("; "),
        counters,
        diagnostics: None,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/sync", post(trigger_sync))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_sync_type_selects_every_platform() {
        let platforms = selected_platforms(None).unwrap();
        assert_eq!(platforms, vec!["phoneburner", "smartlead"]);
    }

    #[test]
    fn explicit_sync_type_selects_one_platform() {
        assert_eq!(
            selected_platforms(Some("smartlead")).unwrap(),
            vec!["smartlead"]
        );
    }

    #[test]
    fn unknown_sync_type_is_a_validation_error() {
        let err = selected_platforms(Some("hubspot")).unwrap_err();
        assert!(matches!(err, OutbeatError::Validation(_)));
    }
}
