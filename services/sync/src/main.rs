mod budget;
mod chunk;
mod client;
mod connector;
mod error;
mod phoneburner;
mod progress;
mod retry;
mod smartlead;
mod trigger;
mod webhook;

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;

use outbeat_common::types::ServiceInfo;
use outbeat_config::{init_tracing, AppConfig};
use outbeat_db::call::pg_repository::PgCallRepository;
use outbeat_db::campaign::pg_repository::PgCampaignRepository;
use outbeat_db::connection::pg_repository::PgConnectionRepository;
use outbeat_db::contact::pg_repository::PgContactRepository;
use outbeat_db::email::pg_repository::PgEmailActivityRepository;
use outbeat_db::retry::pg_repository::PgRetryQueueRepository;
use outbeat_db::webhook::pg_repository::PgWebhookEventRepository;

use crate::connector::SyncTuning;
use crate::phoneburner::client::{PhoneBurnerClient, PhoneBurnerClientConfig};
use crate::smartlead::client::{SmartleadClient, SmartleadClientConfig};
use crate::webhook::{ReplyClassifier, WebhookPipeline};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub connection_repo: PgConnectionRepository,
    pub retry_repo: PgRetryQueueRepository,
    pub webhook_repo: PgWebhookEventRepository,
    pub contact_repo: PgContactRepository,
    pub campaign_repo: PgCampaignRepository,
    pub email_repo: PgEmailActivityRepository,
    pub call_repo: PgCallRepository,
    pub phoneburner: Option<PhoneBurnerClient>,
    pub smartlead: Option<SmartleadClient>,
    pub classifier: Option<ReplyClassifier>,
}

impl AppState {
    pub fn new(config: AppConfig, pool: sqlx::PgPool) -> Self {
        let phoneburner = PhoneBurnerClientConfig::from_env()
            .map(|cfg| PhoneBurnerClient::new(cfg).expect("phoneburner client"));
        let smartlead = SmartleadClientConfig::from_env()
            .map(|cfg| SmartleadClient::new(cfg).expect("smartlead client"));
        let classifier = config
            .classifier_url
            .clone()
            .map(|url| ReplyClassifier::new(url).expect("classifier client"));

        Self {
            config,
            connection_repo: PgConnectionRepository::new(pool.clone()),
            retry_repo: PgRetryQueueRepository::new(pool.clone()),
            webhook_repo: PgWebhookEventRepository::new(pool.clone()),
            contact_repo: PgContactRepository::new(pool.clone()),
            campaign_repo: PgCampaignRepository::new(pool.clone()),
            email_repo: PgEmailActivityRepository::new(pool.clone()),
            call_repo: PgCallRepository::new(pool),
            phoneburner,
            smartlead,
            classifier,
        }
    }

    pub fn tuning(&self) -> SyncTuning {
        SyncTuning {
            time_budget: Duration::from_secs(self.config.sync_time_budget_secs),
            lookback_days: i64::from(self.config.sync_lookback_days),
            detail_batch: 10,
        }
    }

    pub fn webhook_pipeline(
        &self,
    ) -> WebhookPipeline<
        PgWebhookEventRepository,
        PgCampaignRepository,
        PgContactRepository,
        PgEmailActivityRepository,
    > {
        WebhookPipeline::new(
            self.webhook_repo.clone(),
            self.campaign_repo.clone(),
            self.contact_repo.clone(),
            self.email_repo.clone(),
            self.classifier.clone(),
        )
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn info() -> Json<ServiceInfo> {
    Json(ServiceInfo::new("outbeat-sync"))
}

async fn metrics() -> impl IntoResponse {
    let body = "\
# HELP outbeat_up Service up indicator\n\
# TYPE outbeat_up gauge\n\
outbeat_up 1\n\
# HELP outbeat_info Service info\n\
# TYPE outbeat_info gauge\n\
outbeat_info{service=\"outbeat-sync\",version=\"0.1.0\"} 1\n";

    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        body,
    )
}

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            "http://localhost:3000".parse::<HeaderValue>().unwrap(),
            "http://127.0.0.1:3000".parse::<HeaderValue>().unwrap(),
        ])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/metrics", get(metrics))
        .merge(trigger::router())
        .merge(webhook::routes::router())
        .merge(retry::router())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() {
    init_tracing("info");

    let config = AppConfig::from_env().expect("failed to load config");
    tracing::info!(service = "outbeat-sync", "starting");

    let pool = outbeat_db::create_pool(&config.database_url)
        .await
        .expect("failed to create database pool");
    outbeat_db::run_migrations(&pool)
        .await
        .expect("failed to run migrations");

    let state = AppState::new(config.clone(), pool);
    if state.phoneburner.is_none() {
        tracing::info!("no phoneburner credentials found, connector disabled");
    }
    if state.smartlead.is_none() {
        tracing::info!("no smartlead credentials found, connector disabled");
    }

    let app = build_router(state);
    let addr: SocketAddr = config.bind_addr().parse().expect("invalid bind address");

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app).await.expect("server error");
}
