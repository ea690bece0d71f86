use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use crate::error::ApiError;
use crate::webhook::ReconcileSummary;
use crate::AppState;

/// Receives one platform-native push event. Responds 2xx whenever the raw
/// event is durably stored (including unresolved events) so the sender
/// does not retry pointlessly; 5xx only when the store or handler failed,
/// which is exactly when the sender's redelivery helps.
async fn receive_smartlead(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state.webhook_pipeline().ingest(&payload).await?;
    Ok(Json(serde_json::json!({ "status": outcome.label() })))
}

async fn reconcile(State(state): State<AppState>) -> Result<Json<ReconcileSummary>, ApiError> {
    let summary = state
        .webhook_pipeline()
        .reconcile(state.config.retry_batch_size.max(50))
        .await?;
    tracing::info!(
        scanned = summary.scanned,
        applied = summary.applied,
        still_unresolved = summary.still_unresolved,
        "webhook reconciliation complete"
    );
    Ok(Json(summary))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhooks/smartlead", post(receive_smartlead))
        .route("/webhooks/reconcile", post(reconcile))
}
