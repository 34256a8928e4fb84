//! `chainscrape parse <FILE>`: extract the straddle table from a saved page.

use super::{emit, OutputFormat};
use crate::chain::html::extract_table;
use crate::config::ScrapeConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, clap::Args)]
pub struct ParseArgs {
    /// Saved HTML page
    pub file: PathBuf,
    /// Write to this file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    pub format: OutputFormat,
}

/// Ticker from a saved page's file name, e.g. `yahoo_AAPL_straddle.html`.
fn symbol_hint(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|stem| stem.split('_').find(|part| {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_uppercase() || c == '.' || c == '-')
        }))
        .unwrap_or("data")
        .to_string()
}

/// Run the parse command.
pub async fn run(config: &ScrapeConfig, args: &ParseArgs) -> Result<()> {
    let html = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let chain = extract_table(&html, &config.table_locator)
        .with_context(|| format!("no straddle table in {}", args.file.display()))?;
    eprintln!(
        "  Extracted {} rows with {} columns.",
        chain.len(),
        chain.columns.len()
    );

    emit(
        &chain,
        &symbol_hint(&args.file),
        "",
        args.format,
        args.output.as_deref(),
    )
}
