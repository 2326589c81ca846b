//! Integration tests for `HttpRenderService`.
//!
//! Each test stands up a `wiremock` server playing either the target site
//! (direct static fetches) or the rendering service.

use rust_decimal::Decimal;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pricewatch_extractor::fetch::RENDER_COST_HEADER;
use pricewatch_extractor::{Capability, FetchConfig, FetchError, HttpRenderService, PageFetcher, RenderServiceEndpoint};

const PAGE: &str = "<html><body><span class=\"price\">$1,849.00</span></body></html>";

fn config(max_retries: u32) -> FetchConfig {
    FetchConfig {
        timeout_secs: 5,
        user_agent: "pricewatch-test/0.1".to_string(),
        max_retries,
        backoff_base_ms: 1,
    }
}

fn direct(max_retries: u32) -> HttpRenderService {
    HttpRenderService::new(&config(max_retries), None).expect("client")
}

fn via_service(server: &MockServer) -> HttpRenderService {
    HttpRenderService::new(
        &config(0),
        Some(RenderServiceEndpoint {
            base_url: server.uri(),
            api_key: "test-key".to_string(),
        }),
    )
    .expect("client")
}

// ---------------------------------------------------------------------------
// Direct fetches (no rendering service configured)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn static_fetch_goes_direct_and_costs_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products/model-x"))
        .and(header("user-agent", "pricewatch-test/0.1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let page = direct(0)
        .fetch(&format!("{}/products/model-x", server.uri()), Capability::Static, Decimal::ONE)
        .await
        .expect("page");
    assert_eq!(page.html, PAGE);
    assert_eq!(page.cost, Decimal::ZERO);
}

#[tokio::test]
async fn forbidden_is_a_blocked_client_error_and_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let err = direct(3)
        .fetch(&format!("{}/p", server.uri()), Capability::Static, Decimal::ONE)
        .await
        .expect_err("403");
    assert!(matches!(err, FetchError::Client { status: 403, .. }), "got {err:?}");
    assert!(err.is_blocked());
}

#[tokio::test]
async fn server_errors_are_retried_then_classified_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = direct(2)
        .fetch(&format!("{}/p", server.uri()), Capability::Static, Decimal::ONE)
        .await
        .expect_err("503");
    assert!(matches!(err, FetchError::Upstream { status: 503, .. }), "got {err:?}");
    assert!(!err.is_blocked());
}

#[tokio::test]
async fn script_capabilities_need_a_rendering_service() {
    let fetcher = direct(0);
    assert!(fetcher.supports(Capability::Static));
    assert!(!fetcher.supports(Capability::ScriptAntiBot));

    let err = fetcher
        .fetch("https://shop.example/p", Capability::Script, Decimal::ONE)
        .await
        .expect_err("unavailable");
    assert!(matches!(err, FetchError::Unavailable { .. }));
}

#[tokio::test]
async fn non_http_urls_are_refused_up_front() {
    let err = direct(0)
        .fetch("file:///etc/passwd", Capability::Static, Decimal::ONE)
        .await
        .expect_err("invalid");
    assert!(matches!(err, FetchError::InvalidUrl { .. }));
}

// ---------------------------------------------------------------------------
// Rendering service
// ---------------------------------------------------------------------------

#[tokio::test]
async fn anti_bot_fetch_sends_capability_flags_and_reads_cost_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(query_param("api_key", "test-key"))
        .and(query_param("url", "https://shop.example/p"))
        .and(query_param("render_js", "true"))
        .and(query_param("premium_proxy", "true"))
        .and(query_param("max_cost", "0.05"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(RENDER_COST_HEADER, "0.025")
                .set_body_string(PAGE),
        )
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = via_service(&server);
    assert!(fetcher.supports(Capability::ScriptAntiBot));
    let page = fetcher
        .fetch("https://shop.example/p", Capability::ScriptAntiBot, Decimal::new(5, 2))
        .await
        .expect("page");
    assert_eq!(page.html, PAGE);
    assert_eq!(page.cost, Decimal::new(25, 3));
}

#[tokio::test]
async fn static_capability_through_the_service_disables_rendering() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("render_js", "false"))
        .and(query_param("premium_proxy", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let page = via_service(&server)
        .fetch("https://shop.example/p", Capability::Static, Decimal::ONE)
        .await
        .expect("page");
    assert_eq!(page.cost, Decimal::ZERO, "missing cost header reads as zero");
}

#[tokio::test]
async fn too_many_requests_is_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = via_service(&server)
        .fetch("https://shop.example/p", Capability::Script, Decimal::ONE)
        .await
        .expect_err("429");
    assert!(matches!(err, FetchError::Upstream { status: 429, .. }));
}
