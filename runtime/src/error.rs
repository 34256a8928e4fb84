// Copyright 2026 Chainscrape Contributors
// SPDX-License-Identifier: Apache-2.0

//! Failure taxonomy for a scrape.
//!
//! [`ScrapeError`] is the detailed, internal reason a scrape stopped. Every
//! variant maps onto exactly one public [`FailureKind`], which is what callers
//! branch on to choose between retrying, asking the user to verify the
//! symbol/expiration, or reporting a bug.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The three failure kinds that cross the runtime boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No data was located for the requested instrument/expiration.
    NotFound,
    /// The page could not be reached or a time budget was exceeded.
    UpstreamTimeout,
    /// Data was located but could not be decoded or parsed.
    ProcessingError,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::NotFound => "not_found",
            FailureKind::UpstreamTimeout => "upstream_timeout",
            FailureKind::ProcessingError => "processing_error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every distinct reason a scrape can fail.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ScrapeError {
    #[error("navigation failed: {0}")]
    NavigationFailure(String),

    #[error("no response matching '{predicate}' within {waited_ms}ms")]
    CaptureTimeout { predicate: String, waited_ms: u64 },

    #[error("response body could not be decoded: {0}")]
    BodyDecodeFailure(String),

    #[error("payload is not a recognized options chain: {0}")]
    PayloadParseFailure(String),

    #[error("{0}")]
    StructuralMismatch(String),

    #[error("browser unavailable: {0}")]
    BrowserUnavailable(String),

    #[error("payload contained no strikes")]
    EmptyChain,

    #[error("scrape exceeded its {0}ms deadline")]
    DeadlineExceeded(u64),
}

impl ScrapeError {
    /// The public failure kind this error is reported as.
    pub fn kind(&self) -> FailureKind {
        match self {
            ScrapeError::CaptureTimeout { .. }
            | ScrapeError::StructuralMismatch(_)
            | ScrapeError::EmptyChain => FailureKind::NotFound,
            ScrapeError::NavigationFailure(_)
            | ScrapeError::BrowserUnavailable(_)
            | ScrapeError::DeadlineExceeded(_) => FailureKind::UpstreamTimeout,
            ScrapeError::BodyDecodeFailure(_) | ScrapeError::PayloadParseFailure(_) => {
                FailureKind::ProcessingError
            }
        }
    }
}

impl From<serde_json::Error> for ScrapeError {
    fn from(err: serde_json::Error) -> Self {
        ScrapeError::PayloadParseFailure(err.to_string())
    }
}

/// A failed scrape, carrying the instrument and expiration it was for.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeFailure {
    pub kind: FailureKind,
    pub symbol: String,
    pub expiration: String,
    pub error: ScrapeError,
}

impl ScrapeFailure {
    pub fn new(symbol: &str, expiration: &str, error: ScrapeError) -> Self {
        Self {
            kind: error.kind(),
            symbol: symbol.to_string(),
            expiration: expiration.to_string(),
            error,
        }
    }

    /// User-facing message. Always names the symbol and expiration.
    pub fn message(&self) -> String {
        let (symbol, date) = (&self.symbol, &self.expiration);
        match self.kind {
            FailureKind::NotFound => format!(
                "Options data not found for {symbol} on {date}. \
                 Please verify the symbol and expiration date are valid. ({})",
                self.error
            ),
            FailureKind::UpstreamTimeout => {
                format!("Upstream unavailable for {symbol} on {date}: {}", self.error)
            }
            FailureKind::ProcessingError => {
                format!("Failed to process options data for {symbol} on {date}: {}", self.error)
            }
        }
    }
}

impl fmt::Display for ScrapeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for ScrapeFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_error_maps_to_one_kind() {
        let cases = [
            (ScrapeError::NavigationFailure("dns".into()), FailureKind::UpstreamTimeout),
            (
                ScrapeError::CaptureTimeout { predicate: "options".into(), waited_ms: 25_000 },
                FailureKind::NotFound,
            ),
            (ScrapeError::BodyDecodeFailure("bad".into()), FailureKind::ProcessingError),
            (ScrapeError::PayloadParseFailure("bad".into()), FailureKind::ProcessingError),
            (ScrapeError::StructuralMismatch("no table found".into()), FailureKind::NotFound),
            (ScrapeError::BrowserUnavailable("missing".into()), FailureKind::UpstreamTimeout),
            (ScrapeError::EmptyChain, FailureKind::NotFound),
            (ScrapeError::DeadlineExceeded(10), FailureKind::UpstreamTimeout),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{err}");
        }
    }

    #[test]
    fn test_failure_message_names_symbol_and_date() {
        let failure = ScrapeFailure::new(
            "AAPL",
            "2026-01-17",
            ScrapeError::CaptureTimeout { predicate: "options".into(), waited_ms: 25_000 },
        );
        assert_eq!(failure.kind, FailureKind::NotFound);
        assert!(failure.message().contains("for AAPL on 2026-01-17"));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::UpstreamTimeout).unwrap();
        assert_eq!(json, "\"upstream_timeout\"");
    }
}
