use crate::client::{ClientError, RateLimitedClient, RetryPolicy};
use crate::smartlead::models::{
    campaign_page_items, lead_page_items, parse_campaign, parse_lead, CampaignRecord, LeadRecord,
};

#[derive(Debug, Clone)]
pub struct SmartleadClientConfig {
    pub base_url: String,
    /// Smartlead authenticates with an `api_key` query parameter.
    pub api_key: String,
    pub page_size: u32,
    pub timeout_secs: u64,
    pub policy: RetryPolicy,
}

impl SmartleadClientConfig {
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("SMARTLEAD_API_KEY").ok()?;
        let base_url = std::env::var("SMARTLEAD_BASE_URL")
            .unwrap_or_else(|_| "https://server.smartlead.ai/api/v1".to_string());
        let page_size = std::env::var("SMARTLEAD_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(100)
            .min(100);
        let timeout_secs = std::env::var("SMARTLEAD_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Some(Self {
            base_url,
            api_key,
            page_size,
            timeout_secs,
            policy: RetryPolicy::default(),
        })
    }
}

pub type RecordPage<T> = Vec<Result<T, String>>;

#[derive(Clone)]
pub struct SmartleadClient {
    inner: RateLimitedClient,
    config: SmartleadClientConfig,
}

impl SmartleadClient {
    pub fn new(config: SmartleadClientConfig) -> Result<Self, reqwest::Error> {
        let inner = RateLimitedClient::new(config.policy.clone(), config.timeout_secs)?;
        Ok(Self { inner, config })
    }

    pub fn config(&self) -> &SmartleadClientConfig {
        &self.config
    }

    /// For testing: point the client at a specific base URL (e.g., wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    async fn get(&self, path: &str, query: &str) -> Result<serde_json::Value, ClientError> {
        let url = format!(
            "{}{}?api_key={}&{}",
            self.config.base_url, path, self.config.api_key, query
        );
        self.inner.get_json(&url, &[]).await
    }

    pub async fn fetch_campaigns_page(
        &self,
        offset: i64,
    ) -> Result<RecordPage<CampaignRecord>, ClientError> {
        let body = self
            .get(
                "/campaigns",
                &format!("offset={offset}&limit={}", self.config.page_size),
            )
            .await?;

        let items = campaign_page_items(&body).map_err(ClientError::UnexpectedShape)?;
        Ok(items.iter().map(parse_campaign).collect())
    }

    pub async fn fetch_campaign_leads(
        &self,
        campaign_external_id: &str,
        offset: i64,
    ) -> Result<RecordPage<LeadRecord>, ClientError> {
        let body = self
            .get(
                &format!("/campaigns/{campaign_external_id}/leads"),
                &format!("offset={offset}&limit={}", self.config.page_size),
            )
            .await?;

        let items = lead_page_items(&body).map_err(ClientError::UnexpectedShape)?;
        Ok(items.iter().map(parse_lead).collect())
    }

    /// Exercise each endpoint once and return the raw shapes. Performs no
    /// writes; used for connection troubleshooting.
    pub async fn diagnostic(&self) -> Result<serde_json::Value, ClientError> {
        let campaigns = self.get("/campaigns", "offset=0&limit=1").await?;
        Ok(serde_json::json!({ "campaigns": campaigns }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> SmartleadClientConfig {
        SmartleadClientConfig {
            base_url: "http://localhost".to_string(),
            api_key: "sl-test-key".to_string(),
            page_size: 2,
            timeout_secs: 5,
            policy: RetryPolicy {
                request_interval_ms: 1,
                base_delay_ms: 5,
                max_retries: 1,
            },
        }
    }

    #[tokio::test]
    async fn fetch_campaigns_sends_api_key_param() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/campaigns"))
            .and(query_param("api_key", "sl-test-key"))
            .and(query_param("offset", "0"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": 1, "name": "A", "status": "ACTIVE" },
                { "id": 2, "name": "B", "status": "PAUSED" }
            ])))
            .mount(&server)
            .await;

        let client = SmartleadClient::new(test_config())
            .unwrap()
            .with_base_url(&server.uri());

        let page = client.fetch_campaigns_page(0).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].as_ref().unwrap().external_id, "1");
    }

    #[tokio::test]
    async fn fetch_leads_targets_campaign_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/campaigns/42/leads"))
            .and(query_param("offset", "4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [ { "id": 9, "email": "x@example.com" } ]
            })))
            .mount(&server)
            .await;

        let client = SmartleadClient::new(test_config())
            .unwrap()
            .with_base_url(&server.uri());

        let page = client.fetch_campaign_leads("42", 4).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].as_ref().unwrap().external_id, "9");
    }

    #[tokio::test]
    async fn unauthorized_propagates_as_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/campaigns"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = SmartleadClient::new(test_config())
            .unwrap()
            .with_base_url(&server.uri());

        let err = client.fetch_campaigns_page(0).await.unwrap_err();
        assert!(err.is_auth());
    }
}
