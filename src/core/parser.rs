//! Completion payload decoding
//!
//! Single-text calls take the first choice's message content verbatim. Batch
//! calls decode that content through an explicit two-stage parse: a
//! `{"translations": [...]}` object first, then a bare JSON string array,
//! and degrade to empty results when neither shape fits.

use serde::Deserialize;
use tracing::warn;

use crate::core::errors::{Result, TranslateError};

#[derive(Debug, Deserialize)]
struct CompletionPayload {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranslationsEnvelope {
    translations: Vec<String>,
}

/// Extract the first choice's message content from a completion payload.
///
/// An absent or empty content is a malformed response, not a transient one.
pub fn completion_text(payload: &serde_json::Value) -> Result<String> {
    let decoded: CompletionPayload =
        serde_json::from_value(payload.clone()).map_err(|e| TranslateError::ResponseMalformed {
            message: e.to_string(),
        })?;

    let content = decoded
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default();

    if content.is_empty() {
        return Err(TranslateError::ResponseMalformed {
            message: "no content in first choice".to_string(),
        });
    }

    Ok(content)
}

/// Outcome of decoding a batch completion's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedBatch {
    /// Decoded from a `{"translations": [...]}` object
    Object(Vec<String>),
    /// Decoded from a bare JSON array of strings
    Array(Vec<String>),
    /// Neither shape decoded
    Unparsable,
}

/// Decode batch content without using parse failures as control flow.
pub fn parse_batch(content: &str) -> ParsedBatch {
    let stripped = strip_code_fence(content);

    if let Ok(envelope) = serde_json::from_str::<TranslationsEnvelope>(stripped) {
        return ParsedBatch::Object(envelope.translations);
    }

    if let Ok(values) = serde_json::from_str::<Vec<String>>(stripped) {
        return ParsedBatch::Array(values);
    }

    ParsedBatch::Unparsable
}

/// Map a parsed batch onto `expected` positions.
///
/// Equal lengths map one to one; an undercount fills the tail with `None`
/// and is logged, never escalated; an unparsable payload yields `None` for
/// every position.
pub fn assign_results(parsed: ParsedBatch, expected: usize) -> Vec<Option<String>> {
    let translations = match parsed {
        ParsedBatch::Object(t) | ParsedBatch::Array(t) => t,
        ParsedBatch::Unparsable => {
            warn!(expected, "batch response unparsable, degrading to empty results");
            return vec![None; expected];
        }
    };

    if translations.len() < expected {
        warn!(
            received = translations.len(),
            expected, "batch response undercount"
        );
    }

    let mut results: Vec<Option<String>> = translations
        .into_iter()
        .take(expected)
        .map(Some)
        .collect();
    results.resize(expected, None);
    results
}

/// Models often wrap JSON replies in a Markdown code fence; strip one
/// surrounding fence before decoding.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Skip the info string on the opening fence line ("json", "JSON", ...)
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };

    rest.strip_suffix("```").unwrap_or(rest).trim()
}
