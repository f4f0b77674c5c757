//! batchtrans - Rate-limited batching translation client
//!
//! This library translates text through an LLM completion endpoint,
//! coalescing concurrent requests into batches, throttling against a
//! requests-per-minute budget and retrying transient failures.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod core;

// Re-export key types for convenience
pub use crate::core::{
    batch::BatchCoordinator,
    client::TranslationClient,
    config::TranslatorConfig,
    errors::TranslateError,
    models::{BatchKey, Translation, TranslationRequest},
    rate_limiter::{RateLimiter, RatePermit},
    retry::RetryingCaller,
    transport::{HttpTransport, Transport},
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
