//! Browser abstraction for network capture.
//!
//! Defines the `SessionFactory` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide). A context is one
//! isolated browser session with a single tab; it is opened for exactly one
//! scrape and closed afterwards.

pub mod chromium;
pub mod scripted;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A network response observed by the tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedResponse {
    /// Transport-level request identifier, used to fetch the body later.
    pub request_id: String,
    pub url: String,
}

/// Stream of responses seen by a tab, in arrival order.
pub type ResponseStream = BoxStream<'static, ObservedResponse>;

/// A response body as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseBody {
    pub body: String,
    /// The transport delivered `body` base64-encoded.
    pub base64_encoded: bool,
}

/// How a bounded navigation ended. Running out of time is not a failure:
/// the page may hang on subresources long after the data has arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    Loaded { final_url: String, load_time_ms: u64 },
    StillLoading { waited_ms: u64 },
}

/// Opens fresh, isolated browser sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Launch a new session. Nothing is shared with previously opened ones.
    async fn open(&self) -> Result<Box<dyn RenderContext>>;
}

/// A single browser session (one tab).
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Attach a response listener. Only responses arriving after this call
    /// are delivered, so it must precede [`RenderContext::navigate`].
    async fn listen_responses(&mut self) -> Result<ResponseStream>;
    /// Navigate, waiting at most `timeout` for the load to complete.
    /// Errors only when the page could not be reached at all.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<NavigationOutcome>;
    /// Retrieve the body of a previously observed response.
    async fn response_body(&self, request_id: &str) -> Result<ResponseBody>;
    /// Get the full page HTML.
    async fn get_html(&self) -> Result<String>;
    /// Close the session and release the browser.
    async fn close(self: Box<Self>) -> Result<()>;
}
