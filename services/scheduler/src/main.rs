use std::time::Duration;

use outbeat_config::init_tracing;
use uuid::Uuid;

/// A sync series that never reports done within this many follow-up
/// invocations is left for the next tick.
const MAX_FOLLOW_UPS: usize = 20;

fn parse_workspaces(raw: &str) -> Vec<Uuid> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(value = s, "skipping invalid workspace id");
                None
            }
        })
        .collect()
}

/// Invoke the time-boxed sync repeatedly until it reports `done`.
async fn drive_workspace(http: &reqwest::Client, base_url: &str, workspace_id: Uuid) {
    for _ in 0..MAX_FOLLOW_UPS {
        let response = http
            .post(format!("{base_url}/sync"))
            .json(&serde_json::json!({ "workspace_id": workspace_id }))
            .send()
            .await;

        let body: serde_json::Value = match response {
            Ok(resp) => match resp.json().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::error!(%workspace_id, error = %e, "sync response unreadable");
                    return;
                }
            },
            Err(e) => {
                tracing::error!(%workspace_id, error = %e, "sync trigger failed");
                return;
            }
        };

        if body["success"] == false {
            tracing::warn!(%workspace_id, message = %body["message"], "sync reported failure");
            return;
        }
        if body["done"] == true {
            tracing::info!(%workspace_id, "sync series complete");
            return;
        }
        tracing::info!(%workspace_id, "sync yielded, continuing");
    }
    tracing::warn!(%workspace_id, "sync still not done after follow-ups, deferring to next tick");
}

async fn post_and_log(http: &reqwest::Client, url: String, what: &str) {
    match http.post(&url).send().await {
        Ok(resp) => {
            let body = resp.json::<serde_json::Value>().await.unwrap_or_default();
            tracing::info!(target = what, %body, "run complete");
        }
        Err(e) => tracing::error!(target = what, error = %e, "run failed"),
    }
}

#[tokio::main]
async fn main() {
    init_tracing("info");
    let _ = dotenvy::dotenv();

    let base_url = std::env::var("SYNC_SERVICE_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());
    let workspaces = std::env::var("SYNC_WORKSPACE_IDS")
        .map(|raw| parse_workspaces(&raw))
        .unwrap_or_default();
    let interval_secs: u64 = std::env::var("SCHEDULER_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(300);

    tracing::info!(
        service = "outbeat-scheduler",
        %base_url,
        workspaces = workspaces.len(),
        interval_secs,
        "starting"
    );
    if workspaces.is_empty() {
        tracing::warn!("SYNC_WORKSPACE_IDS is empty, only retry/reconcile runs will fire");
    }

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .expect("http client");

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for workspace_id in &workspaces {
                    drive_workspace(&http, &base_url, *workspace_id).await;
                }
                post_and_log(&http, format!("{base_url}/retry/run"), "retry-queue").await;
                post_and_log(&http, format!("{base_url}/webhooks/reconcile"), "reconcile").await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }
}
