//! In-memory sessions that replay a scripted site.
//!
//! Used to exercise capture and session handling without a browser. Like a
//! real tab, responses are only delivered to listeners attached before
//! navigation starts.

use super::{
    NavigationOutcome, ObservedResponse, RenderContext, ResponseBody, ResponseStream,
    SessionFactory,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// What the scripted site does when navigated to.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSite {
    /// Responses fired after navigation starts, each after its delay
    /// (measured from the previous response).
    pub responses: Vec<(Duration, ObservedResponse)>,
    pub bodies: HashMap<String, ResponseBody>,
    pub html: Option<String>,
    pub navigation_error: Option<String>,
    pub load_time: Duration,
}

impl ScriptedSite {
    /// Add a response whose body is served as plain text.
    pub fn respond(mut self, after: Duration, url: &str, body: &str) -> Self {
        let request_id = format!("req-{}", self.responses.len() + 1);
        self.bodies.insert(
            request_id.clone(),
            ResponseBody {
                body: body.to_string(),
                base64_encoded: false,
            },
        );
        self.responses.push((
            after,
            ObservedResponse {
                request_id,
                url: url.to_string(),
            },
        ));
        self
    }

    /// Add a response with an explicit transport body.
    pub fn respond_raw(mut self, after: Duration, url: &str, body: ResponseBody) -> Self {
        let request_id = format!("req-{}", self.responses.len() + 1);
        self.bodies.insert(request_id.clone(), body);
        self.responses.push((
            after,
            ObservedResponse {
                request_id,
                url: url.to_string(),
            },
        ));
        self
    }

    pub fn with_html(mut self, html: &str) -> Self {
        self.html = Some(html.to_string());
        self
    }

    pub fn failing_navigation(mut self, error: &str) -> Self {
        self.navigation_error = Some(error.to_string());
        self
    }

    pub fn loading_for(mut self, load_time: Duration) -> Self {
        self.load_time = load_time;
        self
    }
}

/// Session factory over a [`ScriptedSite`] that counts opened and closed
/// sessions.
#[derive(Clone)]
pub struct ScriptedFactory {
    site: ScriptedSite,
    launch_error: Option<String>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl ScriptedFactory {
    pub fn new(site: ScriptedSite) -> Self {
        Self {
            site,
            launch_error: None,
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A factory whose browser never starts.
    pub fn unavailable(error: &str) -> Self {
        Self {
            launch_error: Some(error.to_string()),
            ..Self::new(ScriptedSite::default())
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sessions opened but not yet closed.
    pub fn live(&self) -> usize {
        self.opened() - self.closed()
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn open(&self) -> Result<Box<dyn RenderContext>> {
        if let Some(e) = &self.launch_error {
            return Err(anyhow!("{e}"));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        let (events, _) = broadcast::channel(64);
        Ok(Box::new(ScriptedContext {
            site: self.site.clone(),
            events,
            closed: Arc::clone(&self.closed),
        }))
    }
}

/// A scripted tab.
pub struct ScriptedContext {
    site: ScriptedSite,
    events: broadcast::Sender<ObservedResponse>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderContext for ScriptedContext {
    async fn listen_responses(&mut self) -> Result<ResponseStream> {
        let rx = self.events.subscribe();
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(resp) => return Some((resp, rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(stream))
    }

    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<NavigationOutcome> {
        if let Some(e) = &self.site.navigation_error {
            return Err(anyhow!("{e}"));
        }

        let tx = self.events.clone();
        let responses = self.site.responses.clone();
        tokio::spawn(async move {
            for (delay, resp) in responses {
                tokio::time::sleep(delay).await;
                let _ = tx.send(resp);
            }
        });

        if self.site.load_time > timeout {
            tokio::time::sleep(timeout).await;
            return Ok(NavigationOutcome::StillLoading {
                waited_ms: timeout.as_millis() as u64,
            });
        }
        tokio::time::sleep(self.site.load_time).await;
        Ok(NavigationOutcome::Loaded {
            final_url: url.to_string(),
            load_time_ms: self.site.load_time.as_millis() as u64,
        })
    }

    async fn response_body(&self, request_id: &str) -> Result<ResponseBody> {
        self.site
            .bodies
            .get(request_id)
            .cloned()
            .ok_or_else(|| anyhow!("No resource with given identifier found: {request_id}"))
    }

    async fn get_html(&self) -> Result<String> {
        self.site
            .html
            .clone()
            .ok_or_else(|| anyhow!("page has no document"))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
