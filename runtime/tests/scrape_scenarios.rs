//! End-to-end scrapes against scripted browser sessions.

use chainscrape_runtime::config::{CaptureTiming, ScrapeConfig};
use chainscrape_runtime::error::{FailureKind, ScrapeError};
use chainscrape_runtime::renderer::scripted::{ScriptedFactory, ScriptedSite};
use chainscrape_runtime::renderer::ResponseBody;
use chainscrape_runtime::scrape::{retry_scrape, RetryPolicy, ScrapeRequest, Scraper, Strategy};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

const OPTIONS_URL: &str =
    "https://www.barchart.com/proxies/core-api/v1/options/get?symbol=AAPL&expirationDate=2026-01-17";
const EXPIRATIONS_URL: &str =
    "https://www.barchart.com/proxies/core-api/v1/options-expirations/get?symbol=AAPL";

const SCENARIO_ONE: &str = r#"{"Call":[{"strikePrice":"150","lastPrice":"5.20","volume":"100","openInterest":"50","volatility":0.25}],"Put":[{"strikePrice":"150","lastPrice":"4.80","volume":"80","openInterest":"60","volatility":0.30}]}"#;

const STRADDLE_PAGE: &str = r#"<html><body><section data-testid="options-straddle-table"><table>
    <thead><tr><th>Last Price</th><th>Change</th><th>Bid</th><th>Ask</th><th>Volume</th>
               <th>Strike</th>
               <th>Last Price</th><th>Change</th><th>Bid</th><th>Ask</th><th>Volume</th></tr></thead>
    <tbody><tr><td>5.20</td><td>+0.10</td><td>5.10</td><td>5.30</td><td>100</td>
               <td>150.00</td>
               <td>4.80</td><td>-0.05</td><td>4.70</td><td>4.90</td><td>80</td></tr></tbody>
</table></section></body></html>"#;

fn fast_config() -> ScrapeConfig {
    ScrapeConfig {
        timing: CaptureTiming {
            poll_interval_ms: 10,
            max_polls: 5,
            grace_ms: 5,
            navigation_timeout_ms: 1_000,
            html_settle_ms: 0,
        },
        ..ScrapeConfig::default()
    }
}

fn scraper(factory: &ScriptedFactory) -> Scraper {
    Scraper::new(fast_config(), Arc::new(factory.clone()))
}

/// HTML page addressed by expiration, so the table may stand in for it.
fn dated_html_scraper(factory: &ScriptedFactory) -> Scraper {
    let config = ScrapeConfig {
        html_url_template: "https://ca.finance.yahoo.com/quote/{symbol}/options/?straddle=true&date={expiration}"
            .into(),
        ..fast_config()
    };
    Scraper::new(config, Arc::new(factory.clone()))
}

fn request(strategy: Strategy) -> ScrapeRequest {
    ScrapeRequest::normalized("aapl", "2026-01-17", strategy)
}

#[tokio::test]
async fn test_captured_payload_becomes_side_by_side_row() {
    let site = ScriptedSite::default()
        .respond(Duration::from_millis(5), EXPIRATIONS_URL, r#"{"data":[]}"#)
        .respond(Duration::from_millis(5), OPTIONS_URL, SCENARIO_ONE);
    let factory = ScriptedFactory::new(site);

    let chain = assert_ok!(scraper(&factory).scrape(&request(Strategy::Api)).await);

    assert_eq!(chain.len(), 1);
    let row = &chain.rows[0];
    assert_eq!(row.strike, "150.00");
    assert_eq!(chain.cell(row, "Call Latest"), Some("5.20"));
    assert_eq!(chain.cell(row, "Call Volume"), Some("100"));
    assert_eq!(chain.cell(row, "Call OI"), Some("50"));
    assert_eq!(chain.cell(row, "Call IV"), Some("25.00%"));
    assert_eq!(chain.cell(row, "Put Latest"), Some("4.80"));
    assert_eq!(chain.cell(row, "Put OI"), Some("60"));
    assert_eq!(chain.cell(row, "Put IV"), Some("30.00%"));
    assert_eq!(factory.opened(), 1);
    assert_eq!(factory.live(), 0);
}

#[tokio::test]
async fn test_base64_body_is_decoded() {
    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD.encode(SCENARIO_ONE);
    let site = ScriptedSite::default().respond_raw(
        Duration::ZERO,
        OPTIONS_URL,
        ResponseBody {
            body: encoded,
            base64_encoded: true,
        },
    );
    let factory = ScriptedFactory::new(site);

    let chain = assert_ok!(scraper(&factory).scrape(&request(Strategy::Api)).await);
    assert_eq!(chain.rows[0].strike, "150.00");
}

#[tokio::test]
async fn test_unmatched_capture_is_not_found_for_symbol_and_date() {
    let site = ScriptedSite::default().respond(Duration::ZERO, EXPIRATIONS_URL, "{}");
    let factory = ScriptedFactory::new(site);

    let failure = assert_err!(scraper(&factory).scrape(&request(Strategy::Api)).await);

    assert_eq!(failure.kind, FailureKind::NotFound);
    assert!(matches!(failure.error, ScrapeError::CaptureTimeout { .. }));
    assert!(failure.message().contains("for AAPL on 2026-01-17"));
    assert_eq!(factory.live(), 0);
}

#[tokio::test]
async fn test_html_section_without_table_is_structural_mismatch() {
    let site = ScriptedSite::default().with_html(
        "<html><body><section data-testid=\"options-straddle-table\">\
         <div>Loading…</div></section></body></html>",
    );
    let factory = ScriptedFactory::new(site);

    let failure = assert_err!(scraper(&factory).scrape(&request(Strategy::Html)).await);

    assert_eq!(failure.kind, FailureKind::NotFound);
    assert_eq!(
        failure.error,
        ScrapeError::StructuralMismatch("no table found".into())
    );
    assert_eq!(factory.live(), 0);
}

#[tokio::test]
async fn test_one_sided_strikes_keep_blank_opposite_side() {
    let payload = r#"{"data":[
        {"strikePrice":"105","optionType":"Call","lastPrice":"1.10","volume":"3","openInterest":"7"},
        {"strikePrice":"100","optionType":"Put","lastPrice":"0.90","volume":"4","openInterest":"8"}
    ]}"#;
    let site = ScriptedSite::default().respond(Duration::ZERO, OPTIONS_URL, payload);
    let factory = ScriptedFactory::new(site);

    let chain = assert_ok!(scraper(&factory).scrape(&request(Strategy::Api)).await);

    let strikes: Vec<&str> = chain.rows.iter().map(|r| r.strike.as_str()).collect();
    assert_eq!(strikes, ["100.00", "105.00"]);
    assert!(chain.rows[0].call.iter().all(String::is_empty));
    assert_eq!(chain.cell(&chain.rows[0], "Put Latest"), Some("0.90"));
    assert!(chain.rows[1].put.iter().all(String::is_empty));
    assert_eq!(chain.cell(&chain.rows[1], "Call Latest"), Some("1.10"));
}

#[tokio::test]
async fn test_fallback_reuses_session_for_html() {
    let site = ScriptedSite::default().with_html(STRADDLE_PAGE);
    let factory = ScriptedFactory::new(site);

    let chain = assert_ok!(dated_html_scraper(&factory).scrape(&request(Strategy::ApiThenHtml)).await);

    assert_eq!(chain.columns[5], "Strike");
    assert_eq!(chain.cell(&chain.rows[0], "Call Last Price"), Some("5.20"));
    assert_eq!(chain.cell(&chain.rows[0], "Put Volume"), Some("80"));
    assert_eq!(factory.opened(), 1);
    assert_eq!(factory.live(), 0);
}

#[tokio::test]
async fn test_fallback_refused_when_page_ignores_expiration() {
    let site = ScriptedSite::default().with_html(STRADDLE_PAGE);
    let factory = ScriptedFactory::new(site);

    let failure = assert_err!(scraper(&factory).scrape(&request(Strategy::ApiThenHtml)).await);

    assert_eq!(failure.kind, FailureKind::NotFound);
    assert!(matches!(failure.error, ScrapeError::StructuralMismatch(_)));
    assert!(failure.message().contains("for AAPL on 2026-01-17"));
    assert!(failure.error.to_string().contains("does not select an expiration"));
    assert_eq!(factory.opened(), 1);
    assert_eq!(factory.live(), 0);
}

#[tokio::test]
async fn test_fallback_skipped_for_upstream_failure() {
    let site = ScriptedSite::default()
        .with_html(STRADDLE_PAGE)
        .failing_navigation("net::ERR_NAME_NOT_RESOLVED");
    let factory = ScriptedFactory::new(site);

    let failure = assert_err!(scraper(&factory).scrape(&request(Strategy::ApiThenHtml)).await);
    assert_eq!(failure.kind, FailureKind::UpstreamTimeout);
    assert!(matches!(failure.error, ScrapeError::NavigationFailure(_)));
}

#[tokio::test]
async fn test_unparseable_payload_is_processing_error() {
    let site = ScriptedSite::default().respond(Duration::ZERO, OPTIONS_URL, "Access denied");
    let factory = ScriptedFactory::new(site);

    let failure = assert_err!(scraper(&factory).scrape(&request(Strategy::Api)).await);
    assert_eq!(failure.kind, FailureKind::ProcessingError);
    assert!(matches!(failure.error, ScrapeError::PayloadParseFailure(_)));
    assert_eq!(factory.live(), 0);
}

#[tokio::test]
async fn test_empty_payload_is_not_found() {
    let site = ScriptedSite::default().respond(Duration::ZERO, OPTIONS_URL, r#"{"data":{}}"#);
    let factory = ScriptedFactory::new(site);

    let failure = assert_err!(scraper(&factory).scrape(&request(Strategy::Api)).await);
    assert_eq!(failure.kind, FailureKind::NotFound);
    assert_eq!(failure.error, ScrapeError::EmptyChain);
}

#[tokio::test]
async fn test_missing_browser_is_upstream_failure() {
    let factory = ScriptedFactory::unavailable("Chromium not found");

    let failure = assert_err!(scraper(&factory).scrape(&request(Strategy::Api)).await);
    assert_eq!(failure.kind, FailureKind::UpstreamTimeout);
    assert!(matches!(failure.error, ScrapeError::BrowserUnavailable(_)));
}

#[tokio::test]
async fn test_deadline_releases_session() {
    let site = ScriptedSite::default().loading_for(Duration::from_secs(30));
    let factory = ScriptedFactory::new(site);

    let failure = assert_err!(
        scraper(&factory)
            .scrape_with_deadline(&request(Strategy::Api), Duration::from_millis(20))
            .await
    );
    assert_eq!(failure.error, ScrapeError::DeadlineExceeded(20));
    assert_eq!(failure.kind, FailureKind::UpstreamTimeout);

    for _ in 0..50 {
        if factory.live() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(factory.opened(), 1);
    assert_eq!(factory.live(), 0);
}

#[tokio::test]
async fn test_retry_opens_fresh_session_per_attempt() {
    let site = ScriptedSite::default().failing_navigation("net::ERR_CONNECTION_RESET");
    let factory = ScriptedFactory::new(site);
    let policy = RetryPolicy {
        attempts: 3,
        base_delay: Duration::from_millis(1),
    };

    let failure = assert_err!(retry_scrape(&scraper(&factory), &request(Strategy::Api), &policy).await);
    assert_eq!(failure.kind, FailureKind::UpstreamTimeout);
    assert_eq!(factory.opened(), 3);
    assert_eq!(factory.live(), 0);
}

#[tokio::test]
async fn test_concurrent_scrapes_use_separate_sessions() {
    let site = ScriptedSite::default().respond(Duration::from_millis(5), OPTIONS_URL, SCENARIO_ONE);
    let factory = ScriptedFactory::new(site);
    let scraper = scraper(&factory);

    let req = request(Strategy::Api);
    let (a, b) = tokio::join!(scraper.scrape(&req), scraper.scrape(&req));
    assert_ok!(a);
    assert_ok!(b);
    assert_eq!(factory.opened(), 2);
    assert_eq!(factory.live(), 0);
}
