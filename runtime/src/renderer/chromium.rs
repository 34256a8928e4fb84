//! Chromium-based sessions using chromiumoxide.

use super::{
    NavigationOutcome, ObservedResponse, RenderContext, ResponseBody, ResponseStream,
    SessionFactory,
};
use crate::config::BrowserSettings;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventResponseReceived, GetResponseBodyParams, RequestId,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Find the Chromium binary path.
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    // 1. Configured path
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.to_path_buf());
        }
    }

    // 2. CHAINSCRAPE_CHROME_PATH env
    if let Ok(p) = std::env::var("CHAINSCRAPE_CHROME_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 3. ~/.chainscrape/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".chainscrape/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".chainscrape/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
            ]
        } else {
            vec![
                home.join(".chainscrape/chromium/chrome-linux64/chrome"),
                home.join(".chainscrape/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 4. System PATH
    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 5. Common install locations
    let common = if cfg!(target_os = "macos") {
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome")
    } else {
        PathBuf::from("/usr/bin/google-chrome")
    };
    if common.exists() {
        return Some(common);
    }

    None
}

/// Browser flags for a settings profile.
pub fn launch_args(settings: &BrowserSettings) -> Vec<String> {
    let mut args = Vec::new();
    if settings.headless {
        args.push("--headless=new".to_string());
    }
    if settings.no_sandbox {
        args.push("--no-sandbox".to_string());
    }
    args.extend(
        [
            "--disable-dev-shm-usage",
            "--disable-gpu",
            "--disable-software-rasterizer",
            "--disable-extensions",
            "--disable-background-networking",
            "--disable-features=dbus",
            "--disable-blink-features=AutomationControlled",
        ]
        .map(String::from),
    );
    args.push(format!("--user-agent={}", settings.user_agent));
    args.extend(settings.extra_args.iter().cloned());
    args
}

/// Launches one Chromium process per session.
pub struct ChromiumFactory {
    settings: BrowserSettings,
}

impl ChromiumFactory {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl SessionFactory for ChromiumFactory {
    async fn open(&self) -> Result<Box<dyn RenderContext>> {
        let chrome_path = find_chromium(self.settings.chrome_path.as_deref())
            .context("Chromium not found. Set CHAINSCRAPE_CHROME_PATH or install google-chrome.")?;
        debug!(path = %chrome_path.display(), "launching Chromium");

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(self.settings.window_width, self.settings.window_height)
            .args(launch_args(&self.settings));
        if !self.settings.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Spawn the handler task
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(e).context("failed to create new page");
            }
        };

        Ok(Box::new(ChromiumContext {
            browser,
            page,
            handler,
        }))
    }
}

/// One Chromium process with a single tab.
pub struct ChromiumContext {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn listen_responses(&mut self) -> Result<ResponseStream> {
        let events = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .context("failed to attach response listener")?;
        self.page
            .execute(EnableParams::default())
            .await
            .context("failed to enable network events")?;

        Ok(events
            .map(|event| ObservedResponse {
                request_id: event.request_id.inner().clone(),
                url: event.response.url.clone(),
            })
            .boxed())
    }

    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<NavigationOutcome> {
        let start = Instant::now();
        let result = tokio::time::timeout(timeout, self.page.goto(url)).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .unwrap_or_else(|| url.to_string());
                Ok(NavigationOutcome::Loaded {
                    final_url,
                    load_time_ms: elapsed_ms,
                })
            }
            // chromiumoxide's own request timeout: the page is still loading
            Ok(Err(CdpError::Timeout)) | Err(_) => Ok(NavigationOutcome::StillLoading {
                waited_ms: elapsed_ms,
            }),
            Ok(Err(e)) => bail!("navigation failed: {e}"),
        }
    }

    async fn response_body(&self, request_id: &str) -> Result<ResponseBody> {
        let resp = self
            .page
            .execute(GetResponseBodyParams::new(RequestId::new(request_id)))
            .await
            .context("failed to retrieve response body")?;

        Ok(ResponseBody {
            body: resp.result.body.clone(),
            base64_encoded: resp.result.base64_encoded,
        })
    }

    async fn get_html(&self) -> Result<String> {
        let result = self
            .page
            .evaluate("document.documentElement.outerHTML")
            .await
            .context("failed to get HTML")?;

        let html: String = result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert HTML result: {e:?}"))?;

        Ok(html)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut this = *self;
        let _ = this.page.close().await;
        let closed = this.browser.close().await;
        let _ = this.browser.wait().await;
        this.handler.abort();
        info!("Chromium session closed");
        closed.map(|_| ()).context("failed to close browser")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_args_headless_container_profile() {
        let args = launch_args(&BrowserSettings::default());
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert!(args.iter().any(|a| a.starts_with("--user-agent=Mozilla/5.0")));
    }

    #[test]
    fn test_launch_args_headed() {
        let settings = BrowserSettings {
            headless: false,
            no_sandbox: false,
            extra_args: vec!["--lang=en-US".into()],
            ..BrowserSettings::default()
        };
        let args = launch_args(&settings);
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
        assert!(!args.contains(&"--no-sandbox".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--lang=en-US"));
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_observes_responses() {
        let factory = ChromiumFactory::new(BrowserSettings::default());
        let mut ctx = factory.open().await.expect("failed to open session");
        let mut responses = ctx.listen_responses().await.expect("listener failed");

        let outcome = ctx
            .navigate("https://example.com/", Duration::from_secs(20))
            .await
            .expect("navigation failed");
        assert!(matches!(outcome, NavigationOutcome::Loaded { .. }));

        let first = responses.next().await.expect("no response observed");
        assert!(first.url.starts_with("https://example.com"));
        let body = ctx.response_body(&first.request_id).await.expect("body");
        assert!(!body.body.is_empty());

        ctx.close().await.expect("close failed");
    }
}
