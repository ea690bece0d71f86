use std::time::Duration;

use reqwest::{Client, StatusCode};

/// Pacing and retry knobs shared by all platform clients.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Fixed delay inserted before every outbound call.
    pub request_interval_ms: u64,
    /// Unit for the 429 backoff: wait `(attempt + 1) * base_delay_ms`.
    pub base_delay_ms: u64,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            request_interval_ms: 200,
            base_delay_ms: 1_000,
            max_retries: 3,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Credentials are assumed invalid for the remainder of the sync;
    /// never retried.
    #[error("authentication rejected (HTTP 401)")]
    Unauthorized,

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),

    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl ClientError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

/// Read-only GET client with fixed inter-request pacing and in-place
/// retries. Safe to call repeatedly: the upstream endpoints are queries.
#[derive(Clone)]
pub struct RateLimitedClient {
    http: Client,
    policy: RetryPolicy,
}

impl RateLimitedClient {
    pub fn new(policy: RetryPolicy, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { http, policy })
    }

    pub async fn get_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<serde_json::Value, ClientError> {
        let mut last_error = String::new();

        for attempt in 0..=self.policy.max_retries {
            if self.policy.request_interval_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.policy.request_interval_ms)).await;
            }

            let mut request = self.http.get(url);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(attempt, error = %last_error, "request failed, retrying");
                    continue;
                }
            };

            let status = response.status();

            if status.is_success() {
                return response.json::<serde_json::Value>().await.map_err(Into::into);
            }

            if status == StatusCode::UNAUTHORIZED {
                return Err(ClientError::Unauthorized);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let wait_ms = u64::from(attempt + 1) * self.policy.base_delay_ms;
                tracing::warn!(attempt, wait_ms, "rate-limited, backing off");
                tokio::time::sleep(Duration::from_millis(wait_ms)).await;
                last_error = "429 Too Many Requests".to_string();
                continue;
            }

            // Everything else (5xx, stray 4xx) is retried to the ceiling.
            let body = response.text().await.unwrap_or_default();
            last_error = format!("{status}: {body}");
            tracing::warn!(attempt, %status, "upstream error, retrying");
        }

        Err(ClientError::MaxRetriesExceeded {
            attempts: self.policy.max_retries + 1,
            last_error,
        })
    }
}
