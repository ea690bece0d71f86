use chrono::{Duration, Utc};

use crate::chunk::DateChunk;
use crate::client::{ClientError, RateLimitedClient, RetryPolicy};
use crate::phoneburner::models::{
    contact_page_items, dial_page_items, parse_contact, parse_dial, parse_session,
    session_page_items, ContactRecord, ContactSchemaVersion, DialRecord, SessionRecord,
};

#[derive(Debug, Clone)]
pub struct PhoneBurnerClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub schema: ContactSchemaVersion,
    pub page_size: u32,
    /// The dial-session listing rejects ranges wider than this.
    pub max_range_days: i64,
    pub timeout_secs: u64,
    pub policy: RetryPolicy,
}

impl PhoneBurnerClientConfig {
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("PHONEBURNER_API_KEY").ok()?;
        let base_url = std::env::var("PHONEBURNER_BASE_URL")
            .unwrap_or_else(|_| "https://api.phoneburner.com".to_string());
        let schema = std::env::var("PHONEBURNER_API_VERSION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(ContactSchemaVersion::V2);
        let page_size = std::env::var("PHONEBURNER_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100)
            .min(100);
        let max_range_days = std::env::var("PHONEBURNER_MAX_RANGE_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(90);
        let timeout_secs = std::env::var("PHONEBURNER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Some(Self {
            base_url,
            api_key,
            schema,
            page_size,
            max_range_days,
            timeout_secs,
            policy: RetryPolicy::default(),
        })
    }
}

#[derive(Clone)]
pub struct PhoneBurnerClient {
    inner: RateLimitedClient,
    config: PhoneBurnerClientConfig,
}

/// Records from one page: each element parsed independently so one bad
/// record never poisons the batch.
pub type RecordPage<T> = Vec<Result<T, String>>;

impl PhoneBurnerClient {
    pub fn new(config: PhoneBurnerClientConfig) -> Result<Self, reqwest::Error> {
        let inner = RateLimitedClient::new(config.policy.clone(), config.timeout_secs)?;
        Ok(Self { inner, config })
    }

    pub fn config(&self) -> &PhoneBurnerClientConfig {
        &self.config
    }

    /// For testing: point the client at a specific base URL (e.g., wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    async fn get(&self, path_and_query: &str) -> Result<serde_json::Value, ClientError> {
        let url = format!("{}{}", self.config.base_url, path_and_query);
        let auth = format!("Bearer {}", self.config.api_key);
        self.inner
            .get_json(&url, &[("Authorization", auth.as_str())])
            .await
    }

    pub async fn fetch_contacts_page(
        &self,
        page: u64,
    ) -> Result<RecordPage<ContactRecord>, ClientError> {
        let body = self
            .get(&format!(
                "/rest/1/contacts?page={page}&page_size={}",
                self.config.page_size
            ))
            .await?;

        let items = contact_page_items(self.config.schema, &body)
            .map_err(ClientError::UnexpectedShape)?;
        Ok(items
            .iter()
            .map(|item| parse_contact(self.config.schema, item))
            .collect())
    }

    pub async fn fetch_sessions_page(
        &self,
        range: &DateChunk,
        page: u64,
    ) -> Result<RecordPage<SessionRecord>, ClientError> {
        let body = self
            .get(&format!(
                "/rest/1/dialsessions?from={}&to={}&page={page}&page_size={}",
                range.start.format("%Y-%m-%d"),
                range.end.format("%Y-%m-%d"),
                self.config.page_size
            ))
            .await?;

        let items = session_page_items(&body).map_err(ClientError::UnexpectedShape)?;
        Ok(items.iter().map(parse_session).collect())
    }

    pub async fn fetch_session_dials(
        &self,
        session_external_id: &str,
    ) -> Result<RecordPage<DialRecord>, ClientError> {
        let body = self
            .get(&format!("/rest/1/dialsessions/{session_external_id}/dials"))
            .await?;

        let items = dial_page_items(&body).map_err(ClientError::UnexpectedShape)?;
        Ok(items.iter().map(parse_dial).collect())
    }

    /// Exercise each endpoint once and return the raw shapes. Performs no
    /// writes; used for connection troubleshooting.
    pub async fn diagnostic(&self) -> Result<serde_json::Value, ClientError> {
        let contacts = self.get("/rest/1/contacts?page=1&page_size=1").await?;
        let week_ago = Utc::now() - Duration::days(7);
        let sessions = self
            .get(&format!(
                "/rest/1/dialsessions?from={}&to={}&page=1&page_size=1",
                week_ago.format("%Y-%m-%d"),
                Utc::now().format("%Y-%m-%d")
            ))
            .await?;

        Ok(serde_json::json!({
            "contacts": contacts,
            "sessions": sessions,
        }))
    }
}
