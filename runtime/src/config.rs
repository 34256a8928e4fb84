// Copyright 2026 Chainscrape Contributors
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration.
//!
//! Resolution order: built-in defaults, then a JSON config file (explicit
//! path or `~/.chainscrape/config.json`), then `CHAINSCRAPE_*` environment
//! variables. CLI flags are applied last by the binary.

use crate::capture::MatchPredicate;
use crate::chain::html::TableLocator;
use crate::error::ScrapeError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str =
    "https://www.barchart.com/stocks/quotes/{symbol}/options?expiration={expiration}&view=sbs";
pub const DEFAULT_HTML_URL: &str =
    "https://ca.finance.yahoo.com/quote/{symbol}/options/?straddle=true";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Browser launch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Explicit browser binary. Discovered on PATH when unset.
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    /// Required when running as root inside containers.
    pub no_sandbox: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: String,
    pub extra_args: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            no_sandbox: true,
            window_width: 1920,
            window_height: 1080,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// Time budget of one capture run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureTiming {
    pub poll_interval_ms: u64,
    /// Polling ceiling in ticks.
    pub max_polls: u32,
    /// Extra wait after the required response is seen, so a still-streaming
    /// body can finish.
    pub grace_ms: u64,
    /// Navigation is abandoned (not failed) after this long.
    pub navigation_timeout_ms: u64,
    /// Wait after load before reading markup on the HTML path.
    pub html_settle_ms: u64,
}

impl Default for CaptureTiming {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            max_polls: 25,
            grace_ms: 2_000,
            navigation_timeout_ms: 30_000,
            html_settle_ms: 5_000,
        }
    }
}

impl CaptureTiming {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn html_settle(&self) -> Duration {
        Duration::from_millis(self.html_settle_ms)
    }

    /// Longest the wait loop can run.
    pub fn ceiling(&self) -> Duration {
        self.poll_interval()
            .checked_mul(self.max_polls)
            .unwrap_or(Duration::MAX)
    }
}

/// Full scraper configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub browser: BrowserSettings,
    pub timing: CaptureTiming,
    /// Page whose data API is captured. `{symbol}` and `{expiration}` are
    /// substituted.
    pub api_url_template: String,
    /// Page with the statically rendered straddle table. The default page
    /// shows the nearest expiration; without `{expiration}` the table cannot
    /// stand in for a specific expiration.
    pub html_url_template: String,
    pub table_locator: TableLocator,
    pub predicates: Vec<MatchPredicate>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            browser: BrowserSettings::default(),
            timing: CaptureTiming::default(),
            api_url_template: DEFAULT_API_URL.to_string(),
            html_url_template: DEFAULT_HTML_URL.to_string(),
            table_locator: TableLocator::default(),
            predicates: vec![
                MatchPredicate::required("options", "/proxies/core-api/v1/options/get"),
                MatchPredicate::optional(
                    "expirations",
                    "/proxies/core-api/v1/options-expirations/get",
                ),
            ],
        }
    }
}

/// `~/.chainscrape/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".chainscrape").join("config.json"))
}

impl ScrapeConfig {
    /// Load defaults, the config file, and environment overrides.
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(p) => Self::from_file(&p)?,
                None => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    /// Apply `CHAINSCRAPE_*` overrides. Unparseable values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let flag = |key: &str| {
            lookup(key).map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        };
        let num = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(p) = lookup("CHAINSCRAPE_CHROME_PATH").filter(|p| !p.is_empty()) {
            self.browser.chrome_path = Some(PathBuf::from(p));
        }
        if let Some(v) = flag("CHAINSCRAPE_HEADLESS") {
            self.browser.headless = v;
        }
        if let Some(v) = flag("CHAINSCRAPE_NO_SANDBOX") {
            self.browser.no_sandbox = v;
        }
        if let Some(v) = num("CHAINSCRAPE_POLL_INTERVAL_MS") {
            self.timing.poll_interval_ms = v;
        }
        if let Some(v) = num("CHAINSCRAPE_MAX_POLLS") {
            self.timing.max_polls = u32::try_from(v).unwrap_or(u32::MAX);
        }
        if let Some(v) = num("CHAINSCRAPE_GRACE_MS") {
            self.timing.grace_ms = v;
        }
        if let Some(v) = num("CHAINSCRAPE_NAV_TIMEOUT_MS") {
            self.timing.navigation_timeout_ms = v;
        }
        if let Some(v) = lookup("CHAINSCRAPE_API_URL").filter(|v| !v.is_empty()) {
            self.api_url_template = v;
        }
        if let Some(v) = lookup("CHAINSCRAPE_HTML_URL").filter(|v| !v.is_empty()) {
            self.html_url_template = v;
        }
    }

    pub fn api_url(&self, symbol: &str, expiration: &str) -> Result<String, ScrapeError> {
        render_url(&self.api_url_template, symbol, expiration)
    }

    pub fn html_url(&self, symbol: &str, expiration: &str) -> Result<String, ScrapeError> {
        render_url(&self.html_url_template, symbol, expiration)
    }

    /// Whether the HTML page is addressed by expiration.
    pub fn html_selects_expiration(&self) -> bool {
        self.html_url_template.contains("{expiration}")
    }
}

/// Substitute `{symbol}` / `{expiration}` and check the result is a URL.
pub fn render_url(template: &str, symbol: &str, expiration: &str) -> Result<String, ScrapeError> {
    let rendered = template
        .replace("{symbol}", symbol)
        .replace("{expiration}", expiration);
    url::Url::parse(&rendered)
        .map_err(|e| ScrapeError::NavigationFailure(format!("invalid target url {rendered}: {e}")))?;
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ScrapeConfig::default();
        assert_eq!(config.timing.ceiling(), Duration::from_secs(25));
        assert_eq!(config.timing.grace(), Duration::from_secs(2));
        assert!(config.browser.headless);
        assert_eq!(config.predicates.iter().filter(|p| p.required).count(), 1);
    }

    #[test]
    fn test_render_url_weekly_suffix() {
        let config = ScrapeConfig::default();
        let url = config.api_url("$SPX", "2026-01-10-w").unwrap();
        assert_eq!(
            url,
            "https://www.barchart.com/stocks/quotes/$SPX/options?expiration=2026-01-10-w&view=sbs"
        );
    }

    #[test]
    fn test_ceiling_saturates() {
        let timing = CaptureTiming {
            poll_interval_ms: u64::MAX,
            max_polls: u32::MAX,
            ..CaptureTiming::default()
        };
        assert_eq!(timing.ceiling(), Duration::MAX);
    }

    #[test]
    fn test_default_html_page_ignores_expiration() {
        let mut config = ScrapeConfig::default();
        assert!(!config.html_selects_expiration());
        config.html_url_template =
            "https://ca.finance.yahoo.com/quote/{symbol}/options/?date={expiration}".into();
        assert!(config.html_selects_expiration());
    }

    #[test]
    fn test_render_url_rejects_garbage() {
        let err = render_url("not a url {symbol}", "AAPL", "x").unwrap_err();
        assert!(matches!(err, ScrapeError::NavigationFailure(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CHAINSCRAPE_HEADLESS", "false"),
            ("CHAINSCRAPE_MAX_POLLS", "5"),
            ("CHAINSCRAPE_GRACE_MS", "bogus"),
            ("CHAINSCRAPE_CHROME_PATH", "/opt/chrome"),
        ]
        .into_iter()
        .collect();
        let mut config = ScrapeConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert!(!config.browser.headless);
        assert_eq!(config.timing.max_polls, 5);
        assert_eq!(config.timing.grace_ms, 2_000);
        assert_eq!(config.browser.chrome_path, Some(PathBuf::from("/opt/chrome")));
    }

    #[test]
    fn test_partial_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"timing": {"max_polls": 3}, "browser": {"headless": false}}"#)
            .unwrap();

        let config = ScrapeConfig::from_file(&path).unwrap();
        assert_eq!(config.timing.max_polls, 3);
        assert_eq!(config.timing.poll_interval_ms, 1_000);
        assert!(!config.browser.headless);
        assert_eq!(config.api_url_template, DEFAULT_API_URL);
    }

    #[test]
    fn test_missing_explicit_file_errors() {
        assert!(ScrapeConfig::load(Some(Path::new("/nonexistent/chainscrape.json"))).is_err());
    }
}
