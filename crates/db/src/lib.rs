pub mod call;
pub mod campaign;
pub mod connection;
pub mod contact;
pub mod email;
pub mod retry;
pub mod webhook;

use outbeat_common::error::{OutbeatError, OutbeatResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Create a Postgres connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> OutbeatResult<PgPool> {
    tracing::info!("connecting to database");
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))
}

/// Apply embedded SQL migrations.
pub async fn run_migrations(pool: &PgPool) -> OutbeatResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| OutbeatError::Database(e.to_string()))
}
