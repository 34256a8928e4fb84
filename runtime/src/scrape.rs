// Copyright 2026 Chainscrape Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scrape controller: one request, one browser session, one result.
//!
//! Opens a fresh session, runs the selected strategy (API capture, HTML
//! table, or API with HTML fallback), releases the session on every exit
//! path, and reports either a chain or a [`ScrapeFailure`] naming the symbol
//! and expiration.

use crate::capture::{capture, fetch_body, primary_predicate};
use crate::chain::html::extract_table;
use crate::chain::normalize::normalize_body;
use crate::chain::OptionChain;
use crate::config::ScrapeConfig;
use crate::error::{FailureKind, ScrapeError, ScrapeFailure};
use crate::renderer::chromium::ChromiumFactory;
use crate::renderer::{NavigationOutcome, RenderContext, SessionFactory};
use crate::session::BrowserSession;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument};

/// Outcome of one scrape.
pub type ScrapeResult = Result<OptionChain, ScrapeFailure>;

/// Where the chain is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Capture the page's data API response.
    #[default]
    Api,
    /// Parse the statically rendered straddle table.
    Html,
    /// Capture the API; fall back to the table when no data is found.
    ///
    /// A fallback chain keeps the page's own header labels (`Call Last
    /// Price`, `Call Change`, ...), so its columns differ from an API chain.
    /// The fallback only runs when the HTML page is addressed by expiration.
    ApiThenHtml,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeRequest {
    pub symbol: String,
    /// Expiration in upstream syntax, e.g. `2026-01-17` or `2026-01-10-w`
    /// for weeklies.
    pub expiration: String,
    pub strategy: Strategy,
}

impl ScrapeRequest {
    /// Trim both inputs and upper-case the symbol.
    pub fn normalized(symbol: &str, expiration: &str, strategy: Strategy) -> Self {
        Self {
            symbol: symbol.trim().to_uppercase(),
            expiration: expiration.trim().to_string(),
            strategy,
        }
    }
}

/// Runs scrapes against sessions from a [`SessionFactory`].
#[derive(Clone)]
pub struct Scraper {
    config: Arc<ScrapeConfig>,
    factory: Arc<dyn SessionFactory>,
}

impl Scraper {
    pub fn new(config: ScrapeConfig, factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            config: Arc::new(config),
            factory,
        }
    }

    /// A scraper that launches headless Chromium per request.
    pub fn with_chromium(config: ScrapeConfig) -> Self {
        let factory = Arc::new(ChromiumFactory::new(config.browser.clone()));
        Self::new(config, factory)
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    pub async fn scrape(&self, req: &ScrapeRequest) -> ScrapeResult {
        let span = info_span!(
            "scrape",
            symbol = %req.symbol,
            expiration = %req.expiration,
            strategy = ?req.strategy
        );
        self.run(req)
            .instrument(span)
            .await
            .map_err(|e| ScrapeFailure::new(&req.symbol, &req.expiration, e))
    }

    /// [`Scraper::scrape`] bounded by an overall deadline. The session is
    /// still released when the deadline cuts the scrape short.
    pub async fn scrape_with_deadline(&self, req: &ScrapeRequest, deadline: Duration) -> ScrapeResult {
        match tokio::time::timeout(deadline, self.scrape(req)).await {
            Ok(result) => result,
            Err(_) => Err(ScrapeFailure::new(
                &req.symbol,
                &req.expiration,
                ScrapeError::DeadlineExceeded(deadline.as_millis() as u64),
            )),
        }
    }

    async fn run(&self, req: &ScrapeRequest) -> Result<OptionChain, ScrapeError> {
        let mut session = BrowserSession::open(self.factory.as_ref()).await?;
        let result = self.run_strategy(session.context_mut(), req).await;
        session.release().await;

        match &result {
            Ok(chain) => info!(strikes = chain.len(), "scrape complete"),
            Err(e) => warn!(kind = %e.kind(), "scrape failed: {e}"),
        }
        result
    }

    async fn run_strategy(
        &self,
        ctx: &mut dyn RenderContext,
        req: &ScrapeRequest,
    ) -> Result<OptionChain, ScrapeError> {
        match req.strategy {
            Strategy::Api => self.via_api(ctx, req).await,
            Strategy::Html => self.via_html(ctx, req).await,
            Strategy::ApiThenHtml => match self.via_api(ctx, req).await {
                Err(e) if e.kind() == FailureKind::NotFound => {
                    if !self.config.html_selects_expiration() {
                        warn!("API capture found no data ({e}), HTML page ignores expiration");
                        return Err(ScrapeError::StructuralMismatch(format!(
                            "{e}; HTML fallback skipped, its page does not select an expiration"
                        )));
                    }
                    warn!("API capture found no data ({e}), trying the HTML table");
                    self.via_html(ctx, req).await
                }
                other => other,
            },
        }
    }

    async fn via_api(
        &self,
        ctx: &mut dyn RenderContext,
        req: &ScrapeRequest,
    ) -> Result<OptionChain, ScrapeError> {
        let url = self.config.api_url(&req.symbol, &req.expiration)?;
        let predicates = &self.config.predicates;
        let primary = primary_predicate(predicates).ok_or_else(|| ScrapeError::CaptureTimeout {
            predicate: "(no predicates configured)".into(),
            waited_ms: 0,
        })?;

        let captures = capture(ctx, &url, predicates, &self.config.timing).await?;
        let exchange = captures
            .get(&primary.name)
            .ok_or_else(|| ScrapeError::CaptureTimeout {
                predicate: primary.name.clone(),
                waited_ms: self.config.timing.ceiling().as_millis() as u64,
            })?;
        for (name, other) in captures.iter().filter(|(name, _)| **name != primary.name) {
            info!(predicate = %name, url = %other.url, "secondary response captured");
        }

        let body = fetch_body(ctx, exchange).await?;
        info!(bytes = body.text.len(), encoding = ?body.encoding, "processing captured payload");
        let chain = normalize_body(&body.text)?;
        if chain.is_empty() {
            return Err(ScrapeError::EmptyChain);
        }
        Ok(chain)
    }

    async fn via_html(
        &self,
        ctx: &mut dyn RenderContext,
        req: &ScrapeRequest,
    ) -> Result<OptionChain, ScrapeError> {
        let url = self.config.html_url(&req.symbol, &req.expiration)?;
        let timing = &self.config.timing;
        if !self.config.html_selects_expiration() {
            warn!(expiration = %req.expiration, "HTML page shows its default expiration");
        }

        info!(url = %url, "navigating for HTML table");
        match ctx.navigate(&url, timing.navigation_timeout()).await {
            Ok(NavigationOutcome::Loaded { load_time_ms, .. }) => {
                info!(load_time_ms, "page load event received")
            }
            Ok(NavigationOutcome::StillLoading { waited_ms }) => {
                warn!(waited_ms, "timeout waiting for page load, proceeding anyway")
            }
            Err(e) => return Err(ScrapeError::NavigationFailure(format!("{e:#}"))),
        }

        // Dynamic content keeps rendering after the load event.
        tokio::time::sleep(timing.html_settle()).await;

        let html = ctx
            .get_html()
            .await
            .map_err(|e| ScrapeError::NavigationFailure(format!("could not read page source: {e:#}")))?;
        info!(chars = html.len(), "page source captured");
        extract_table(&html, &self.config.table_locator)
    }
}

/// Caller-level retry around whole scrapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay before retry `n` is `n × base_delay`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Never retry.
    pub fn single() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Wait before retry `n`, saturating instead of overflowing.
    pub fn delay_before(&self, n: u32) -> Duration {
        self.base_delay.checked_mul(n).unwrap_or(Duration::MAX)
    }
}

/// Run `op` until it succeeds, fails with a non-transient kind, or the
/// attempt cap is reached. Only [`FailureKind::UpstreamTimeout`] failures
/// are retried, with linear backoff.
pub async fn with_retry<F, Fut>(policy: &RetryPolicy, mut op: F) -> ScrapeResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ScrapeResult>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(failure)
                if failure.kind == FailureKind::UpstreamTimeout && attempt < policy.attempts =>
            {
                let delay = policy.delay_before(attempt);
                warn!(attempt, ?delay, "retrying after upstream failure: {}", failure.error);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Scrape with [`with_retry`]; each attempt gets a fresh browser session.
pub async fn retry_scrape(scraper: &Scraper, req: &ScrapeRequest, policy: &RetryPolicy) -> ScrapeResult {
    with_retry(policy, || scraper.scrape(req)).await
}
