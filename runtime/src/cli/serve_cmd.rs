//! `chainscrape serve`: run the HTTP API.

use crate::config::ScrapeConfig;
use crate::renderer::chromium::find_chromium;
use crate::rest::{self, ApiState};
use crate::scrape::{RetryPolicy, Scraper, Strategy};
use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, clap::Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, default_value = "8000")]
    pub port: u16,
    /// Where each request reads its chain from
    #[arg(long, value_enum, default_value_t = Strategy::Api)]
    pub strategy: Strategy,
    /// Total attempts per request when the upstream site is unreachable
    #[arg(long, default_value = "1")]
    pub retries: u32,
}

/// Run the HTTP API until interrupted.
pub async fn run(config: ScrapeConfig, args: &ServeArgs) -> Result<()> {
    info!("starting chainscrape v{}", env!("CARGO_PKG_VERSION"));
    match find_chromium(config.browser.chrome_path.as_deref()) {
        Some(path) => info!(path = %path.display(), "Chromium found"),
        None => warn!("Chromium not found; requests will fail until one is installed"),
    }

    let state = Arc::new(ApiState {
        scraper: Scraper::with_chromium(config),
        strategy: args.strategy,
        retry: RetryPolicy {
            attempts: args.retries.max(1),
            ..RetryPolicy::default()
        },
    });

    tokio::select! {
        result = rest::start(args.port, state) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
            Ok(())
        }
    }
}
