//! Translation client facade

use std::sync::Arc;
use tracing::debug;

use crate::core::batch::BatchCoordinator;
use crate::core::config::TranslatorConfig;
use crate::core::errors::{Result, TranslateError};
use crate::core::models::{Translation, TranslationRequest};
use crate::core::parser;
use crate::core::prompt;
use crate::core::rate_limiter::RateLimiter;
use crate::core::retry::RetryingCaller;
use crate::core::transport::{HttpTransport, Transport};

/// Public entry point: routes each request to the single-call path or the
/// batch coordinator, depending on configuration and caller intent.
///
/// Clones share the same limiter, transport and batch registry, so a client
/// can be handed freely to concurrent tasks.
#[derive(Clone)]
pub struct TranslationClient {
    config: Arc<TranslatorConfig>,
    caller: RetryingCaller,
    coordinator: BatchCoordinator,
}

impl TranslationClient {
    /// Create a client over the real HTTP transport.
    pub fn new(config: TranslatorConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Self::with_transport(config, transport)
    }

    /// Create a client over a caller-supplied transport.
    pub fn with_transport(config: TranslatorConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate().map_err(|e| TranslateError::Config {
            message: e.to_string(),
        })?;

        let config = Arc::new(config);
        let limiter = RateLimiter::new(config.requests_per_minute);
        let caller = RetryingCaller::new(
            transport,
            limiter,
            config.max_attempts,
            config.initial_backoff(),
        );
        let coordinator = BatchCoordinator::new(Arc::clone(&config), caller.clone());

        Ok(Self {
            config,
            caller,
            coordinator,
        })
    }

    /// Create from environment
    pub fn from_env() -> Result<Self> {
        let config = TranslatorConfig::from_env().map_err(|e| TranslateError::Config {
            message: e.to_string(),
        })?;
        Self::new(config)
    }

    /// Translate a single request.
    ///
    /// Requests that opt into batching (and a configuration that allows it)
    /// go through the coordinator; everything else makes its own upstream
    /// call. Either way the caller blocks until its result is ready or its
    /// bounded wait elapses.
    pub async fn translate(&self, request: &TranslationRequest) -> Result<Translation> {
        let quality_score = request.quality_score();

        if self.config.batch_enabled && request.batch {
            let text = self.coordinator.submit(request).await?;
            return Ok(Translation {
                text,
                quality_score,
            });
        }

        let rendered = prompt::build_single_prompt(
            &self.config.single_prompt,
            &request.source_lang,
            &request.target_lang,
            &request.text,
        );
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "user", "content": rendered }
            ],
        });

        debug!(
            source = %request.source_lang,
            target = %request.target_lang,
            "single translation call"
        );
        let payload = self.caller.call(&body).await?;
        let text = parser::completion_text(&payload)?;

        Ok(Translation {
            text: Some(text),
            quality_score,
        })
    }

    /// Read-only view of the active configuration.
    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::testing::{completion, ScriptedTransport};
    use assert_json_diff::assert_json_eq;

    fn config() -> TranslatorConfig {
        TranslatorConfig {
            api_key: "test_key".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn single_translation_end_to_end() {
        let transport = ScriptedTransport::new(vec![Ok(completion("hola"))]);
        let client = TranslationClient::with_transport(config(), transport.clone()).unwrap();

        let request = TranslationRequest::new("hello", "en", "es");
        let result = client.translate(&request).await.unwrap();

        assert_eq!(result.text, Some("hola".to_string()));
        assert_eq!(result.quality_score, 500);

        let expected_prompt = prompt::build_single_prompt(
            &client.config().single_prompt,
            "en",
            "es",
            "hello",
        );
        assert_json_eq!(
            transport.bodies()[0],
            serde_json::json!({
                "model": client.config().model,
                "messages": [
                    { "role": "user", "content": expected_prompt }
                ],
            })
        );
    }

    #[tokio::test]
    async fn single_mode_fails_on_empty_content() {
        let transport = ScriptedTransport::new(vec![Ok(completion(""))]);
        let client = TranslationClient::with_transport(config(), transport).unwrap();

        let request = TranslationRequest::new("hello", "en", "es");
        let err = client.translate(&request).await.unwrap_err();
        assert!(matches!(err, TranslateError::ResponseMalformed { .. }));
    }

    #[tokio::test]
    async fn batched_request_routes_through_the_coordinator() {
        let transport = ScriptedTransport::new(vec![Ok(completion(r#"{"translations": ["hola"]}"#))]);
        let client = TranslationClient::with_transport(
            TranslatorConfig {
                batch_threshold: 1,
                ..config()
            },
            transport.clone(),
        )
        .unwrap();

        let request = TranslationRequest::new("hello", "en", "es").batched();
        let result = client.translate(&request).await.unwrap();

        assert_eq!(result.text, Some("hola".to_string()));
        assert_eq!(result.quality_score, 500);

        // The upstream call carried the batch template, not the single one
        let content = transport.bodies()[0]["messages"][0]["content"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(content.contains("translations"));
        assert!(content.contains(r#"["hello"]"#));
    }

    #[tokio::test]
    async fn opting_out_bypasses_the_coordinator() {
        let transport = ScriptedTransport::new(vec![Ok(completion("hola"))]);
        let client = TranslationClient::with_transport(
            TranslatorConfig {
                batch_threshold: 5,
                ..config()
            },
            transport.clone(),
        )
        .unwrap();

        // No .batched(): dispatches immediately even though the threshold
        // would never be reached.
        let request = TranslationRequest::new("hello", "en", "es");
        let result = client.translate(&request).await.unwrap();

        assert_eq!(result.text, Some("hola".to_string()));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn disabled_batching_forces_the_single_path() {
        let transport = ScriptedTransport::new(vec![Ok(completion("hola"))]);
        let client = TranslationClient::with_transport(
            TranslatorConfig {
                batch_enabled: false,
                batch_threshold: 5,
                ..config()
            },
            transport.clone(),
        )
        .unwrap();

        let request = TranslationRequest::new("hello", "en", "es").batched();
        let result = client.translate(&request).await.unwrap();

        assert_eq!(result.text, Some("hola".to_string()));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let transport = ScriptedTransport::new(vec![]);
        let result = TranslationClient::with_transport(
            TranslatorConfig {
                api_key: String::new(),
                ..Default::default()
            },
            transport,
        );
        assert!(matches!(result, Err(TranslateError::Config { .. })));
    }
}
