//! Core data models for translation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Multiplier applied to the input byte length to form the quality score.
const QUALITY_PER_BYTE: usize = 100;

/// Translation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationRequest {
    /// Text to translate
    pub text: String,
    /// Source language tag (e.g. "en")
    pub source_lang: String,
    /// Target language tag (e.g. "es")
    pub target_lang: String,
    /// Whether the caller opts into batch coalescing
    pub batch: bool,
}

impl TranslationRequest {
    /// Create a single-call request for the given language pair.
    pub fn new(
        text: impl Into<String>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            source_lang: source_lang.into(),
            target_lang: target_lang.into(),
            batch: false,
        }
    }

    /// Opt this request into batch coalescing.
    pub fn batched(mut self) -> Self {
        self.batch = true;
        self
    }

    /// Grouping key for requests that can share one upstream call.
    pub fn batch_key(&self) -> BatchKey {
        BatchKey {
            source: self.source_lang.clone(),
            target: self.target_lang.clone(),
        }
    }

    /// Deterministic confidence/size metric for this request's text.
    pub fn quality_score(&self) -> usize {
        self.text.len() * QUALITY_PER_BYTE
    }
}

/// Translation result
///
/// `text` is `None` only for batch members whose position fell past an
/// undercounted provider response, or whose batch payload could not be
/// decoded at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Translation {
    /// Translated text, if the provider produced one for this position
    pub text: Option<String>,
    /// Deterministic metric: 100 per input byte
    pub quality_score: usize,
}

/// Language pair identifying one batch queue.
///
/// A composite struct rather than a joined string, so tags containing any
/// separator character cannot collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchKey {
    /// Source language tag
    pub source: String,
    /// Target language tag
    pub target: String,
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.source, self.target)
    }
}
