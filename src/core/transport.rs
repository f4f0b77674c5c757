//! HTTP transport to the completion endpoint

use async_trait::async_trait;
use std::time::Duration;

use crate::core::config::TranslatorConfig;
use crate::core::errors::{Result, TranslateError};

/// One network round trip to the provider.
///
/// Implementations classify every outcome into the error taxonomy: a
/// successful post returns the decoded completion payload, everything else
/// maps to `QuotaExceeded`, `UpstreamUnavailable`, `PermanentRequest` or
/// `Connectivity`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST the JSON payload to the configured endpoint.
    async fn post(&self, body: &serde_json::Value) -> Result<serde_json::Value>;
}

/// reqwest-backed transport with bearer authentication.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpTransport {
    /// Build a transport from the configured endpoint, key and timeout.
    pub fn new(config: &TranslatorConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| TranslateError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, body: &serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| TranslateError::Connectivity {
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();

        if (200..300).contains(&status) {
            return response
                .json()
                .await
                .map_err(|e| TranslateError::ResponseMalformed {
                    message: e.to_string(),
                });
        }

        let error_text = response.text().await.unwrap_or_default();
        Err(classify_failure(status, error_text))
    }
}

/// Map a non-success HTTP status and error body onto the taxonomy.
fn classify_failure(status: u16, body: String) -> TranslateError {
    if status == 429 {
        return TranslateError::QuotaExceeded;
    }

    if (500..600).contains(&status) {
        return TranslateError::UpstreamUnavailable { status };
    }

    // Some providers signal quota exhaustion with a 4xx and an explanatory body
    if body.contains("quota") || body.contains("rate limit") {
        return TranslateError::QuotaExceeded;
    }

    TranslateError::PermanentRequest {
        status,
        message: body,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_status_is_classified() {
        assert!(matches!(
            classify_failure(429, String::new()),
            TranslateError::QuotaExceeded
        ));
    }

    #[test]
    fn quota_body_text_is_classified() {
        assert!(matches!(
            classify_failure(403, "daily quota exhausted".to_string()),
            TranslateError::QuotaExceeded
        ));
    }

    #[test]
    fn server_errors_are_upstream_unavailable() {
        assert!(matches!(
            classify_failure(503, "unavailable".to_string()),
            TranslateError::UpstreamUnavailable { status: 503 }
        ));
    }

    #[test]
    fn other_client_errors_are_permanent() {
        let err = classify_failure(401, "invalid api key".to_string());
        match err {
            TranslateError::PermanentRequest { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid api key");
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }
}
