//! Prompt template rendering

/// Render the single-text template, substituting `{source}`, `{target}` and
/// `{text}`.
pub fn build_single_prompt(template: &str, source: &str, target: &str, text: &str) -> String {
    template
        .replace("{source}", source)
        .replace("{target}", target)
        .replace("{text}", text)
}

/// Render the batch template, substituting `{source}`, `{target}` and
/// `{texts}` with the batch texts as a JSON array.
///
/// The array form survives texts that themselves contain newlines or quotes.
pub fn build_batch_prompt(template: &str, source: &str, target: &str, texts: &[String]) -> String {
    let texts_json = serde_json::Value::from(texts.to_vec()).to_string();
    template
        .replace("{source}", source)
        .replace("{target}", target)
        .replace("{texts}", &texts_json)
}
