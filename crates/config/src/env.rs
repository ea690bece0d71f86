use outbeat_common::error::{OutbeatError, OutbeatResult};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Wall-clock budget for one sync invocation, in seconds.
    pub sync_time_budget_secs: u64,
    /// How far back a full sync reaches, in days.
    pub sync_lookback_days: u32,
    /// Max retry-queue entries handled per runner invocation.
    pub retry_batch_size: i64,
    /// Downstream reply classifier; replies are not classified when unset.
    pub classifier_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    /// Loads `.env` file if present, then reads required vars.
    pub fn from_env() -> OutbeatResult<Self> {
        // Best-effort .env load; ignore if missing
        let _ = dotenvy::dotenv();

        Ok(Self {
            database_url: get_var("DATABASE_URL")?,
            host: get_var_or("HOST", "0.0.0.0"),
            port: get_var_or("PORT", "8080")
                .parse()
                .map_err(|e| OutbeatError::Config(format!("invalid PORT: {e}")))?,
            log_level: get_var_or("LOG_LEVEL", "info"),
            sync_time_budget_secs: get_var_or("SYNC_TIME_BUDGET_SECS", "50")
                .parse()
                .map_err(|e| OutbeatError::Config(format!("invalid SYNC_TIME_BUDGET_SECS: {e}")))?,
            sync_lookback_days: get_var_or("SYNC_LOOKBACK_DAYS", "180")
                .parse()
                .map_err(|e| OutbeatError::Config(format!("invalid SYNC_LOOKBACK_DAYS: {e}")))?,
            retry_batch_size: get_var_or("RETRY_BATCH_SIZE", "10")
                .parse()
                .map_err(|e| OutbeatError::Config(format!("invalid RETRY_BATCH_SIZE: {e}")))?,
            classifier_url: env::var("CLASSIFIER_URL").ok().filter(|v| !v.is_empty()),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn get_var(key: &str) -> OutbeatResult<String> {
    env::var(key).map_err(|_| OutbeatError::Config(format!("{key} is required but not set")))
}

fn get_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn config_from_env_succeeds_with_required_vars() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");

        env::set_var("DATABASE_URL", "postgres://localhost/outbeat_test");

        let cfg = AppConfig::from_env().expect("should parse config");
        assert_eq!(cfg.database_url, "postgres://localhost/outbeat_test");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.sync_time_budget_secs, 50);
        assert_eq!(cfg.sync_lookback_days, 180);
        assert_eq!(cfg.retry_batch_size, 10);
        assert!(cfg.classifier_url.is_none());

        env::remove_var("DATABASE_URL");
    }

    #[test]
    fn config_from_env_fails_without_database_url() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");

        env::remove_var("DATABASE_URL");
        let result = AppConfig::from_env();
        assert!(result.is_err());
    }

    #[test]
    fn config_parses_sync_overrides() {
        let _guard = ENV_LOCK.lock().expect("env lock poisoned");

        env::set_var("DATABASE_URL", "postgres://localhost/outbeat_test");
        env::set_var("SYNC_TIME_BUDGET_SECS", "25");
        env::set_var("SYNC_LOOKBACK_DAYS", "90");

        let cfg = AppConfig::from_env().expect("should parse config");
        assert_eq!(cfg.sync_time_budget_secs, 25);
        assert_eq!(cfg.sync_lookback_days, 90);

        env::remove_var("DATABASE_URL");
        env::remove_var("SYNC_TIME_BUDGET_SECS");
        env::remove_var("SYNC_LOOKBACK_DAYS");
    }

    #[test]
    fn bind_addr_formats_correctly() {
        let cfg = AppConfig {
            database_url: String::new(),
            host: "127.0.0.1".to_owned(),
            port: 3000,
            log_level: "debug".to_owned(),
            sync_time_budget_secs: 50,
            sync_lookback_days: 180,
            retry_batch_size: 10,
            classifier_url: None,
        };
        assert_eq!(cfg.bind_addr(), "127.0.0.1:3000");
    }
}
