//! Scoped browser sessions.
//!
//! A [`BrowserSession`] owns one freshly launched browser context for the
//! duration of one scrape. It is released explicitly on normal exit; if the
//! owning future is dropped first (cancellation, deadline, panic unwinding),
//! `Drop` hands the context to the runtime to be closed.

use crate::error::ScrapeError;
use crate::renderer::{RenderContext, SessionFactory};
use tracing::{debug, warn};
use uuid::Uuid;

pub struct BrowserSession {
    /// Present until `release` or `drop`.
    context: Option<Box<dyn RenderContext>>,
    id: Uuid,
}

impl BrowserSession {
    /// Open a new isolated session.
    pub async fn open(factory: &dyn SessionFactory) -> Result<Self, ScrapeError> {
        let context = factory
            .open()
            .await
            .map_err(|e| ScrapeError::BrowserUnavailable(format!("{e:#}")))?;
        let id = Uuid::new_v4();
        debug!(session = %id, "browser session opened");
        Ok(Self {
            context: Some(context),
            id,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn context(&self) -> &dyn RenderContext {
        self.context
            .as_deref()
            .expect("session context is present until release")
    }

    pub fn context_mut(&mut self) -> &mut dyn RenderContext {
        self.context
            .as_deref_mut()
            .expect("session context is present until release")
    }

    /// Close the browser. Close errors are logged, not returned: the scrape
    /// outcome is already decided by the time the session is released.
    pub async fn release(mut self) {
        if let Some(context) = self.context.take() {
            match context.close().await {
                Ok(()) => debug!(session = %self.id, "browser session released"),
                Err(e) => warn!(session = %self.id, "failed to close browser session: {e:#}"),
            }
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(session = %id, "scrape abandoned, closing browser session in background");
                handle.spawn(async move {
                    if let Err(e) = context.close().await {
                        warn!(session = %id, "failed to close abandoned session: {e:#}");
                    }
                });
            }
            Err(_) => warn!(session = %id, "no runtime to close abandoned browser session"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::scripted::{ScriptedFactory, ScriptedSite};
    use std::time::Duration;

    #[tokio::test]
    async fn test_release_closes_context() {
        let factory = ScriptedFactory::new(ScriptedSite::default());
        let session = BrowserSession::open(&factory).await.unwrap();
        assert_eq!(factory.live(), 1);
        session.release().await;
        assert_eq!(factory.live(), 0);
    }

    #[tokio::test]
    async fn test_drop_closes_context_in_background() {
        let factory = ScriptedFactory::new(ScriptedSite::default());
        let session = BrowserSession::open(&factory).await.unwrap();
        drop(session);
        for _ in 0..50 {
            if factory.live() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(factory.live(), 0);
    }

    #[tokio::test]
    async fn test_launch_failure_is_browser_unavailable() {
        let factory = ScriptedFactory::unavailable("Chromium not found");
        let err = BrowserSession::open(&factory).await.err().unwrap();
        assert!(matches!(err, ScrapeError::BrowserUnavailable(ref m) if m.contains("Chromium")));
    }
}
