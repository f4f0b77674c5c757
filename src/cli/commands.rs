//! CLI command definitions and handlers

use clap::Subcommand;
use indicatif::ProgressBar;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::core::client::TranslationClient;
use crate::core::models::TranslationRequest;

/// Commands for the batchtrans CLI
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Translate a single text
    Text {
        /// Text to translate
        text: String,

        /// Source language tag
        #[arg(short, long, default_value = "en")]
        source: String,

        /// Target language tag
        #[arg(short, long, default_value = "es")]
        target: String,
    },

    /// Translate a file line by line through the batch path
    File {
        /// Input file, one text per line
        #[arg(short, long)]
        input: PathBuf,

        /// Output file, one translated line per input line
        #[arg(short, long)]
        output: PathBuf,

        /// Source language tag
        #[arg(long, default_value = "en")]
        source: String,

        /// Target language tag
        #[arg(long, default_value = "es")]
        target: String,

        /// Send every line as its own upstream call instead of batching
        #[arg(long)]
        no_batch: bool,
    },
}

/// Handle the `text` command
pub async fn handle_text(text: String, source: String, target: String) -> anyhow::Result<()> {
    let client = TranslationClient::from_env()?;
    let request = TranslationRequest::new(text, source, target);

    let result = client.translate(&request).await?;
    match result.text {
        Some(translated) => println!("{translated}"),
        None => warn!("provider returned no translation"),
    }

    Ok(())
}

/// Handle the `file` command
pub async fn handle_file(
    input: PathBuf,
    output: PathBuf,
    source: String,
    target: String,
    no_batch: bool,
) -> anyhow::Result<()> {
    let client = TranslationClient::from_env()?;
    let content = tokio::fs::read_to_string(&input).await?;
    let lines: Vec<String> = content.lines().map(str::to_string).collect();

    let total = lines.iter().filter(|line| !line.trim().is_empty()).count();
    let bar = ProgressBar::new(total as u64);
    info!(lines = total, "translating file");

    // Blank lines pass through untranslated; everything else runs
    // concurrently so same-pair lines coalesce into shared batches.
    let mut handles = Vec::with_capacity(lines.len());
    for line in lines {
        if line.trim().is_empty() {
            handles.push(None);
            continue;
        }

        let client = client.clone();
        let mut request = TranslationRequest::new(line, source.clone(), target.clone());
        if !no_batch {
            request = request.batched();
        }
        handles.push(Some(tokio::spawn(async move {
            client.translate(&request).await
        })));
    }

    let mut translated = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle {
            None => translated.push(String::new()),
            Some(handle) => {
                let result = handle.await??;
                bar.inc(1);
                translated.push(result.text.unwrap_or_default());
            }
        }
    }
    bar.finish();

    tokio::fs::write(&output, translated.join("\n") + "\n").await?;
    info!(output = %output.display(), "translated file written");

    Ok(())
}
