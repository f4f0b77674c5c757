//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Default prompt for a single text, with `{source}`, `{target}` and `{text}`
/// placeholders.
pub const DEFAULT_SINGLE_PROMPT: &str = "Translate the following text from {source} to {target}. \
     Reply with the translation only, no commentary.\n\n{text}";

/// Default prompt for a batch, with `{source}`, `{target}` and `{texts}`
/// placeholders. `{texts}` is replaced by a JSON array of the batch texts.
pub const DEFAULT_BATCH_PROMPT: &str = "Translate every string in the following JSON array from {source} to {target}. \
     Reply with a JSON object of the form {\"translations\": [...]} containing \
     one translated string per input, in the same order.\n\n{texts}";

/// Configuration for the translation client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    /// Bearer token for the provider
    pub api_key: String,
    /// Completion endpoint URL
    pub endpoint: String,
    /// Model identifier sent with every request
    pub model: String,
    /// Template for single-text calls ({source}, {target}, {text})
    pub single_prompt: String,
    /// Template for batch calls ({source}, {target}, {texts})
    pub batch_prompt: String,
    /// Attempt cap shared by all retryable error classes
    pub max_attempts: u32,
    /// First backoff delay, grown per attempt by the applicable law
    pub initial_backoff_ms: u64,
    /// Requests-per-minute budget, applied as the admission ceiling
    pub requests_per_minute: usize,
    /// Whether batch coalescing is available at all
    pub batch_enabled: bool,
    /// Batch size that triggers a dispatch
    pub batch_threshold: usize,
    /// How long a sub-threshold batch may linger before being flushed
    /// anyway; 0 disables time-based flushing entirely
    pub batch_linger_ms: u64,
    /// How long a caller waits on its batch slot before giving up
    pub batch_wait_timeout_ms: u64,
    /// Per-request HTTP timeout
    pub request_timeout_ms: u64,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("TRANSLATE_API_KEY").unwrap_or_default(),
            endpoint: std::env::var("TRANSLATE_ENDPOINT")
                .unwrap_or_else(|_| "https://api.example.com/v1/chat/completions".to_string()),
            model: "gpt-4o-mini".to_string(),
            single_prompt: DEFAULT_SINGLE_PROMPT.to_string(),
            batch_prompt: DEFAULT_BATCH_PROMPT.to_string(),
            max_attempts: 3,
            initial_backoff_ms: 1000,
            requests_per_minute: 60,
            batch_enabled: true,
            batch_threshold: 10,
            batch_linger_ms: 5000,
            batch_wait_timeout_ms: 30_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl TranslatorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("TRANSLATE_API_KEY")
            .map_err(|_| anyhow::anyhow!("TRANSLATE_API_KEY environment variable is required"))?;

        let endpoint = std::env::var("TRANSLATE_ENDPOINT")
            .unwrap_or_else(|_| "https://api.example.com/v1/chat/completions".to_string());

        let model = std::env::var("TRANSLATE_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let max_attempts = std::env::var("MAX_ATTEMPTS")
            .unwrap_or_else(|_| "3".to_string())
            .parse::<u32>()?;

        let initial_backoff_ms = std::env::var("INITIAL_BACKOFF_MS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse::<u64>()?;

        let requests_per_minute = std::env::var("REQUESTS_PER_MINUTE")
            .unwrap_or_else(|_| "60".to_string())
            .parse::<usize>()?;

        let batch_enabled = std::env::var("BATCH_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()?;

        let batch_threshold = std::env::var("BATCH_THRESHOLD")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<usize>()?;

        let batch_linger_ms = std::env::var("BATCH_LINGER_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse::<u64>()?;

        let batch_wait_timeout_ms = std::env::var("BATCH_WAIT_TIMEOUT_MS")
            .unwrap_or_else(|_| "30000".to_string())
            .parse::<u64>()?;

        let request_timeout_ms = std::env::var("REQUEST_TIMEOUT_MS")
            .unwrap_or_else(|_| "30000".to_string())
            .parse::<u64>()?;

        Ok(Self {
            api_key,
            endpoint,
            model,
            single_prompt: DEFAULT_SINGLE_PROMPT.to_string(),
            batch_prompt: DEFAULT_BATCH_PROMPT.to_string(),
            max_attempts,
            initial_backoff_ms,
            requests_per_minute,
            batch_enabled,
            batch_threshold,
            batch_linger_ms,
            batch_wait_timeout_ms,
            request_timeout_ms,
        })
    }

    /// Load from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_key.is_empty() {
            return Err(anyhow::anyhow!("API key is required"));
        }

        if self.endpoint.is_empty() {
            return Err(anyhow::anyhow!("endpoint is required"));
        }

        if self.model.is_empty() {
            return Err(anyhow::anyhow!("model identifier is required"));
        }

        for placeholder in ["{source}", "{target}", "{text}"] {
            if !self.single_prompt.contains(placeholder) {
                return Err(anyhow::anyhow!(
                    "single prompt template is missing the {} placeholder",
                    placeholder
                ));
            }
        }

        for placeholder in ["{source}", "{target}", "{texts}"] {
            if !self.batch_prompt.contains(placeholder) {
                return Err(anyhow::anyhow!(
                    "batch prompt template is missing the {} placeholder",
                    placeholder
                ));
            }
        }

        if self.max_attempts == 0 {
            return Err(anyhow::anyhow!("max_attempts must be greater than 0"));
        }

        if self.requests_per_minute == 0 {
            return Err(anyhow::anyhow!("requests_per_minute must be greater than 0"));
        }

        if self.batch_enabled && self.batch_threshold == 0 {
            return Err(anyhow::anyhow!(
                "batch_threshold must be greater than 0 when batching is enabled"
            ));
        }

        if self.batch_wait_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(anyhow::anyhow!("timeouts must be greater than 0"));
        }

        if self.batch_enabled && self.batch_linger_ms == 0 {
            warn!("batch_linger_ms is 0; sub-threshold batches are only flushed by size");
        }

        Ok(())
    }

    /// Batch wait timeout as a `Duration`.
    pub fn batch_wait_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.batch_wait_timeout_ms)
    }

    /// Initial retry backoff as a `Duration`.
    pub fn initial_backoff(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.initial_backoff_ms)
    }
}
