// Copyright 2026 Chainscrape Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP API for chainscrape.
//!
//! Every options request runs one scrape with a fresh browser session.
//! Failures map to a status code by kind: not found is 404, upstream
//! trouble is 504, anything else is 500.

use crate::error::{FailureKind, ScrapeFailure};
use crate::export::{csv_filename, to_csv_string, ChainEnvelope};
use crate::scrape::{retry_scrape, RetryPolicy, ScrapeRequest, ScrapeResult, Scraper, Strategy};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// State shared by all handlers.
pub struct ApiState {
    pub scraper: Scraper,
    pub strategy: Strategy,
    pub retry: RetryPolicy,
}

impl ApiState {
    pub fn new(scraper: Scraper) -> Self {
        Self {
            scraper,
            strategy: Strategy::default(),
            retry: RetryPolicy::single(),
        }
    }
}

/// Build the axum Router with all endpoints.
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health))
        .route("/options", get(options_json))
        .route("/options/csv", get(options_csv))
        .layer(cors)
        .with_state(state)
}

/// Serve the API on `0.0.0.0:port` until the process is stopped.
pub async fn start(port: u16, state: Arc<ApiState>) -> anyhow::Result<()> {
    let app = router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("HTTP API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct OptionsParams {
    symbol: String,
    date: String,
}

fn status_for(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::NotFound => StatusCode::NOT_FOUND,
        FailureKind::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
        FailureKind::ProcessingError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure_response(failure: &ScrapeFailure) -> Response {
    let body = json!({
        "success": false,
        "kind": failure.kind,
        "detail": failure.message(),
    });
    (status_for(failure.kind), Json(body)).into_response()
}

async fn run_scrape(state: &ApiState, params: &OptionsParams) -> (ScrapeRequest, ScrapeResult) {
    let req = ScrapeRequest::normalized(&params.symbol, &params.date, state.strategy);
    let result = retry_scrape(&state.scraper, &req, &state.retry).await;
    (req, result)
}

// ── Handlers ────────────────────────────────────────────────────

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "chainscrape options API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "/options": "GET - JSON options data (params: symbol, date)",
            "/options/csv": "GET - CSV download (params: symbol, date)",
            "/health": "GET - Health check"
        },
        "example": "/options?symbol=AAPL&date=2026-01-17"
    }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn options_json(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<OptionsParams>,
) -> Response {
    match run_scrape(&state, &params).await {
        (req, Ok(chain)) => {
            Json(ChainEnvelope::new(&req.symbol, &req.expiration, &chain)).into_response()
        }
        (_, Err(failure)) => failure_response(&failure),
    }
}

async fn options_csv(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<OptionsParams>,
) -> Response {
    match run_scrape(&state, &params).await {
        (req, Ok(chain)) => {
            let disposition = format!(
                "attachment; filename={}",
                csv_filename(&req.symbol, &req.expiration)
            );
            (
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                to_csv_string(&chain),
            )
                .into_response()
        }
        (_, Err(failure)) => failure_response(&failure),
    }
}
