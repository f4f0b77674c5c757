//! Custom error types for translation operations

use thiserror::Error;

/// Translation-related errors.
///
/// The enum is `Clone` because a single failed batch dispatch fans the same
/// cause out to every waiting slot; underlying transport causes are carried
/// as rendered strings for that reason.
#[derive(Error, Debug, Clone)]
pub enum TranslateError {
    /// Permanent client-side error (bad request, bad credentials). Never retried.
    #[error("permanent request error: {status} - {message}")]
    PermanentRequest {
        /// HTTP status code reported by the provider
        status: u16,
        /// Error body or description from the provider
        message: String,
    },

    /// Provider signalled "too many requests". Retried with linear backoff.
    #[error("provider quota exceeded")]
    QuotaExceeded,

    /// Provider-side failure (5xx). Retried, then fatal.
    #[error("upstream unavailable: HTTP {status}")]
    UpstreamUnavailable {
        /// HTTP status code reported by the provider
        status: u16,
    },

    /// DNS, connect, reset or timeout failure below the HTTP layer.
    #[error("connectivity failure: {message}")]
    Connectivity {
        /// Rendered transport cause
        message: String,
    },

    /// A success response without usable content. Not retried.
    #[error("malformed response: {message}")]
    ResponseMalformed {
        /// What was missing or undecodable
        message: String,
    },

    /// Waited the full bound for rate-limiter admission.
    #[error("timed out waiting for rate limiter admission")]
    RateLimitTimeout,

    /// Waited the full bound for a batch slot result.
    #[error("timed out waiting for batch result")]
    BatchWaitTimeout,

    /// Transient errors persisted through every allowed attempt.
    #[error("retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
        /// The last transient cause observed
        #[source]
        source: Box<TranslateError>,
    },

    /// Configuration error
    #[error("configuration error: {message}")]
    Config {
        /// What was invalid or missing
        message: String,
    },

    /// Invariant violation inside the client itself
    #[error("internal error: {message}")]
    Internal {
        /// Description of the broken invariant
        message: String,
    },
}

impl TranslateError {
    /// Whether another attempt may succeed.
    ///
    /// Quota, upstream and connectivity failures are transient; everything
    /// else fails the call immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TranslateError::QuotaExceeded
                | TranslateError::UpstreamUnavailable { .. }
                | TranslateError::Connectivity { .. }
        )
    }
}

/// Result type for translation operations
pub type Result<T> = std::result::Result<T, TranslateError>;
