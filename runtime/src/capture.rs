// Copyright 2026 Chainscrape Contributors
// SPDX-License-Identifier: Apache-2.0

//! Network capture: navigate a tab and grab the data API response it makes.
//!
//! One run attaches exactly one response listener (before navigating), waits
//! for the required predicates to match in interval-sized slices so the wait
//! can be interrupted at every tick, then pauses for a grace period so a
//! still-streaming body can complete. Bodies are fetched by request id and
//! decoded here. Runs are single-shot: nothing in this module retries.

use crate::config::CaptureTiming;
use crate::error::ScrapeError;
use crate::renderer::{NavigationOutcome, RenderContext, ResponseBody, ResponseStream};
use base64::Engine;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Identifies a response of interest by a substring of its URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPredicate {
    pub name: String,
    pub url_fragment: String,
    /// The run fails with a capture timeout unless every required
    /// predicate matches.
    #[serde(default)]
    pub required: bool,
}

impl MatchPredicate {
    pub fn required(name: &str, url_fragment: &str) -> Self {
        Self {
            name: name.to_string(),
            url_fragment: url_fragment.to_string(),
            required: true,
        }
    }

    pub fn optional(name: &str, url_fragment: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, url_fragment)
        }
    }

    pub fn matches(&self, url: &str) -> bool {
        url.contains(&self.url_fragment)
    }
}

/// Name of the predicate whose body is the primary payload: the first
/// required one, or the first one if none is marked required.
pub fn primary_predicate(predicates: &[MatchPredicate]) -> Option<&MatchPredicate> {
    predicates
        .iter()
        .find(|p| p.required)
        .or_else(|| predicates.first())
}

/// A response that matched a predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedExchange {
    pub request_id: String,
    pub url: String,
}

/// Predicate name → first exchange seen matching it.
pub type Captures = HashMap<String, CapturedExchange>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    Plain,
    Base64,
}

/// A decoded response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedBody {
    pub encoding: BodyEncoding,
    pub text: String,
}

/// Aborts the listener task when the run ends, however it ends.
struct ListenerGuard(JoinHandle<()>);

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn listen(
    mut stream: ResponseStream,
    predicates: Vec<MatchPredicate>,
    seen: watch::Sender<Captures>,
) {
    while let Some(resp) = stream.next().await {
        seen.send_if_modified(|captures| {
            let Some(p) = predicates
                .iter()
                .find(|p| p.matches(&resp.url) && !captures.contains_key(&p.name))
            else {
                return false;
            };
            info!(predicate = %p.name, url = %truncate(&resp.url, 100), "matched response");
            captures.insert(
                p.name.clone(),
                CapturedExchange {
                    request_id: resp.request_id.clone(),
                    url: resp.url.clone(),
                },
            );
            true
        });
    }
    debug!("response stream ended");
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Navigate `ctx` to `url` and wait for the predicates to match.
///
/// Returns every predicate matched by the end of the grace period. Fails
/// with [`ScrapeError::CaptureTimeout`] if a required predicate never
/// matched within `timing.max_polls` ticks, and with
/// [`ScrapeError::NavigationFailure`] if the page could not be reached.
pub async fn capture(
    ctx: &mut dyn RenderContext,
    url: &str,
    predicates: &[MatchPredicate],
    timing: &CaptureTiming,
) -> Result<Captures, ScrapeError> {
    let required: Vec<String> = if predicates.iter().any(|p| p.required) {
        predicates.iter().filter(|p| p.required).map(|p| p.name.clone()).collect()
    } else {
        primary_predicate(predicates).map(|p| p.name.clone()).into_iter().collect()
    };
    let all_required = |captures: &Captures| {
        !required.is_empty() && required.iter().all(|name| captures.contains_key(name))
    };

    // Listener first: the data response can fire before navigation returns.
    let stream = ctx.listen_responses().await.map_err(|e| {
        ScrapeError::NavigationFailure(format!("could not attach response listener: {e:#}"))
    })?;
    let (tx, mut rx) = watch::channel(Captures::new());
    let _listener = ListenerGuard(tokio::spawn(listen(stream, predicates.to_vec(), tx)));

    info!(url, "navigating");
    match ctx.navigate(url, timing.navigation_timeout()).await {
        Ok(NavigationOutcome::Loaded { load_time_ms, .. }) => {
            debug!(load_time_ms, "page loaded");
        }
        Ok(NavigationOutcome::StillLoading { waited_ms }) => {
            warn!(waited_ms, "page still loading, continuing to wait for data");
        }
        Err(e) => return Err(ScrapeError::NavigationFailure(format!("{e:#}"))),
    }

    for tick in 1..=timing.max_polls {
        match tokio::time::timeout(timing.poll_interval(), rx.wait_for(|c| all_required(c))).await
        {
            Ok(Ok(_)) => break,
            Ok(Err(_)) => {
                return Err(ScrapeError::NavigationFailure(
                    "browser closed the response stream".into(),
                ))
            }
            Err(_) if tick % 5 == 0 => {
                info!(tick, max = timing.max_polls, "waiting for data response");
            }
            Err(_) => {}
        }
    }

    if !all_required(&rx.borrow()) {
        return Err(ScrapeError::CaptureTimeout {
            predicate: required.join(","),
            waited_ms: timing.ceiling().as_millis() as u64,
        });
    }

    tokio::time::sleep(timing.grace()).await;
    let captures = rx.borrow().clone();
    Ok(captures)
}

/// Decode a transport body. Base64 bodies must decode to valid UTF-8.
pub fn decode_body(raw: ResponseBody) -> Result<CapturedBody, ScrapeError> {
    if !raw.base64_encoded {
        return Ok(CapturedBody {
            encoding: BodyEncoding::Plain,
            text: raw.body,
        });
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(raw.body.trim())
        .map_err(|e| ScrapeError::BodyDecodeFailure(format!("invalid base64: {e}")))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| ScrapeError::BodyDecodeFailure(format!("body is not UTF-8: {e}")))?;
    Ok(CapturedBody {
        encoding: BodyEncoding::Base64,
        text,
    })
}

/// Retrieve and decode the body of a captured exchange.
pub async fn fetch_body(
    ctx: &dyn RenderContext,
    exchange: &CapturedExchange,
) -> Result<CapturedBody, ScrapeError> {
    debug!(request_id = %exchange.request_id, "retrieving response body");
    let raw = ctx
        .response_body(&exchange.request_id)
        .await
        .map_err(|e| ScrapeError::BodyDecodeFailure(format!("{e:#}")))?;
    decode_body(raw)
}
