//! `chainscrape scrape <SYMBOL> <DATE>`: scrape one options chain.

use super::{emit, OutputFormat};
use crate::config::ScrapeConfig;
use crate::scrape::{with_retry, RetryPolicy, ScrapeRequest, Scraper, Strategy};
use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, clap::Args)]
pub struct ScrapeArgs {
    /// Instrument symbol (e.g. AAPL, TSLA, $SPX)
    pub symbol: String,
    /// Expiration date (e.g. 2026-01-17, or 2026-01-10-w for a weekly)
    pub date: String,
    /// Where the chain is read from
    #[arg(long, value_enum, default_value_t = Strategy::Api)]
    pub strategy: Strategy,
    /// Write to this file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    pub format: OutputFormat,
    /// Total attempts when the upstream site is unreachable
    #[arg(long, default_value = "1")]
    pub retries: u32,
    /// Abort the whole scrape after this many milliseconds
    #[arg(long)]
    pub deadline_ms: Option<u64>,
}

/// Run the scrape command.
pub async fn run(config: ScrapeConfig, args: &ScrapeArgs) -> Result<()> {
    let scraper = Scraper::with_chromium(config);
    let req = ScrapeRequest::normalized(&args.symbol, &args.date, args.strategy);
    let policy = RetryPolicy {
        attempts: args.retries.max(1),
        ..RetryPolicy::default()
    };
    let deadline = args.deadline_ms.map(Duration::from_millis);

    let (scraper, request) = (&scraper, &req);
    let chain = with_retry(&policy, move || async move {
        match deadline {
            Some(d) => scraper.scrape_with_deadline(request, d).await,
            None => scraper.scrape(request).await,
        }
    })
    .await?;

    info!(strikes = chain.len(), "scraped {} on {}", req.symbol, req.expiration);
    emit(
        &chain,
        &req.symbol,
        &req.expiration,
        args.format,
        args.output.as_deref(),
    )?;
    if let Some(path) = &args.output {
        eprintln!("  Saved {} strikes to {}", chain.len(), path.display());
    }
    Ok(())
}
