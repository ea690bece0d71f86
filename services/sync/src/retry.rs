use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use serde::Serialize;

use outbeat_db::connection::repositories::ConnectionRepository;
use outbeat_db::retry::repositories::RetryQueueRepository;

use crate::connector::SyncOptions;
use crate::trigger;
use crate::AppState;

pub const DEFAULT_MAX_RETRIES: i32 = 5;

/// Exponential backoff in minutes: 3^retry_count.
pub fn backoff(retry_count: i32) -> Duration {
    let exponent = retry_count.clamp(0, 8) as u32;
    Duration::minutes(3_i64.pow(exponent))
}

#[derive(Debug, Default, Serialize)]
pub struct RetrySummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Drain due retry entries, strictly sequentially: the upstream APIs are
/// already rate-limited and a parallel drain would stampede them.
pub async fn process_due(state: &AppState) -> RetrySummary {
    let mut summary = RetrySummary::default();

    let due = match state
        .retry_repo
        .due(Utc::now(), state.config.retry_batch_size)
        .await
    {
        Ok(entries) => entries,
        Err(e) => {
            summary.errors.push(format!("retry queue query failed: {e}"));
            return summary;
        }
    };

    for entry in due {
        // Conditional claim: a concurrent runner loses this entry.
        match state.retry_repo.mark_processing(entry.id).await {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                summary.errors.push(format!("claim failed: {e}"));
                continue;
            }
        }
        summary.processed += 1;

        let connection = match state.connection_repo.get_by_id(entry.connection_id).await {
            Ok(Some(conn)) => conn,
            Ok(None) => {
                let msg = format!("connection {} no longer exists", entry.connection_id);
                let _ = state.retry_repo.mark_failed(entry.id, &msg).await;
                summary.failed += 1;
                summary.errors.push(msg);
                continue;
            }
            Err(e) => {
                summary.errors.push(format!("connection lookup failed: {e}"));
                continue;
            }
        };

        let result = trigger::run_platform(
            state,
            connection.workspace_id,
            &connection.platform,
            SyncOptions {
                reset: false,
                retry: true,
            },
        )
        .await;

        match result {
            Ok(outcome) => {
                tracing::info!(
                    connection = %entry.connection_id,
                    platform = %connection.platform,
                    done = outcome.done,
                    "retried sync succeeded"
                );
                if let Err(e) = state.retry_repo.mark_completed(entry.id).await {
                    summary.errors.push(format!("completion write failed: {e}"));
                }
                summary.succeeded += 1;
            }
            Err(err) if err.is_auth() => {
                // Backoff cannot repair credentials; stop retrying.
                let msg = err.to_string();
                if let Err(e) = state.retry_repo.mark_failed(entry.id, &msg).await {
                    summary.errors.push(format!("failure write failed: {e}"));
                }
                summary.failed += 1;
                summary.errors.push(msg);
            }
            Err(err) => {
                let msg = err.to_string();
                let next_count = entry.retry_count + 1;
                summary.failed += 1;
                summary.errors.push(msg.clone());

                if next_count >= entry.max_retries {
                    tracing::warn!(
                        connection = %entry.connection_id,
                        retries = next_count,
                        "retry ceiling reached, giving up"
                    );
                    if let Err(e) = state.retry_repo.mark_failed(entry.id, &msg).await {
                        summary.errors.push(format!("failure write failed: {e}"));
                    }
                } else {
                    let next_retry_at = Utc::now() + backoff(next_count);
                    if let Err(e) = state
                        .retry_repo
                        .reschedule(entry.id, next_count, next_retry_at, &msg)
                        .await
                    {
                        summary.errors.push(format!("reschedule failed: {e}"));
                    }
                }
            }
        }
    }

    summary
}

async fn run_retries(State(state): State<AppState>) -> Json<RetrySummary> {
    let summary = process_due(&state).await;
    tracing::info!(
        processed = summary.processed,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "retry queue run complete"
    );
    Json(summary)
}

pub fn router() -> Router<AppState> {
    Router::new().route("/retry/run", post(run_retries))
}
