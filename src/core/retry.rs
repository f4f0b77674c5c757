//! Retry state machine around a single upstream call

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::core::errors::{Result, TranslateError};
use crate::core::rate_limiter::RateLimiter;
use crate::core::transport::Transport;

/// Ceiling for the doubling backoff law.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Drives one logical call through attempt/backoff cycles.
///
/// Shared by the single-call path and batch dispatch; clones share the
/// transport and limiter.
#[derive(Clone)]
pub struct RetryingCaller {
    transport: Arc<dyn Transport>,
    limiter: RateLimiter,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl RetryingCaller {
    /// Create a caller with the shared transport and admission limiter.
    pub fn new(
        transport: Arc<dyn Transport>,
        limiter: RateLimiter,
        max_attempts: u32,
        initial_backoff: Duration,
    ) -> Self {
        Self {
            transport,
            limiter,
            max_attempts,
            initial_backoff,
        }
    }

    /// Post `body` upstream, retrying transient failures.
    ///
    /// Every attempt acquires and releases exactly one rate permit, on every
    /// exit path. Quota errors back off linearly (`initial × attempt`);
    /// server and connectivity failures double the delay, capped at 10
    /// seconds. Permanent request errors and malformed successes fail
    /// immediately without another attempt.
    pub async fn call(&self, body: &serde_json::Value) -> Result<serde_json::Value> {
        for attempt in 1..=self.max_attempts {
            let permit = self.limiter.acquire().await?;
            let outcome = self.transport.post(body).await;
            drop(permit);

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        info!(attempt, "call succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = backoff_delay(&err, attempt, self.initial_backoff);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retry scheduled"
                    );
                    sleep(delay).await;
                }
                Err(err) if err.is_transient() => {
                    warn!(attempts = self.max_attempts, error = %err, "retries exhausted");
                    return Err(TranslateError::RetriesExhausted {
                        attempts: self.max_attempts,
                        source: Box::new(err),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        Err(TranslateError::Internal {
            message: "retry loop ran zero attempts".to_string(),
        })
    }
}

/// Delay before the attempt following failed attempt number `attempt`.
fn backoff_delay(err: &TranslateError, attempt: u32, initial: Duration) -> Duration {
    match err {
        // Categorized provider pushback grows linearly with the attempt number
        TranslateError::QuotaExceeded => initial
            .checked_mul(attempt)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF),
        // Uncategorized transient failures double, capped
        _ => initial
            .checked_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF),
    }
}
