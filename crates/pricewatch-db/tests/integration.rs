//! Offline tests for pricewatch-db pool configuration and row types.
//! These tests do not require a live database connection.

use chrono::Utc;
use pricewatch_core::{AppConfig, Environment, Tier};
use pricewatch_db::{
    AuditRow, BatchRunCounts, BatchRunRow, DbError, LearnedSelectorRow, PoolConfig,
};
use rust_decimal::Decimal;
use std::path::PathBuf;
use uuid::Uuid;

fn test_app_config() -> AppConfig {
    AppConfig {
        database_url: Some("postgres://example".to_string()),
        env: Environment::Test,
        log_level: "info".to_string(),
        site_rules_path: PathBuf::from("./config/site_rules.yaml"),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        request_timeout_secs: 30,
        user_agent: "ua".to_string(),
        max_retries: 2,
        retry_backoff_base_ms: 500,
        render_service_url: None,
        render_service_key: None,
        render_max_cost_usd: Decimal::new(5, 2),
        render_pool_size: 2,
        render_lease_timeout_secs: 30,
        navigation_timeout_secs: 30,
        settle_timeout_ms: 3000,
        tier_timeout_secs: 90,
        workers: 4,
        batch_deadline_secs: 1800,
        block_on_variant_alert: false,
        openai_api_key: None,
        llm_base_url: "https://api.openai.com/v1".to_string(),
        llm_partial_model: "gpt-4o-mini".to_string(),
        llm_full_model: "gpt-4o".to_string(),
        budget_daily_usd: Decimal::new(500, 2),
        budget_ai_partial_usd: Decimal::new(100, 2),
        budget_ai_full_usd: Decimal::new(300, 2),
        budget_render_premium_usd: Decimal::new(100, 2),
    }
}

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let pool_config = PoolConfig::from_app_config(&test_app_config());
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[tokio::test]
async fn connect_without_database_url_is_reported() {
    let mut config = test_app_config();
    config.database_url = None;

    let err = pricewatch_db::connect_pool_from_config(&config)
        .await
        .expect_err("no URL should fail before connecting");
    assert!(matches!(err, DbError::MissingDatabaseUrl));
}

fn learned_row(item_key: &str, source_tier: &str) -> LearnedSelectorRow {
    LearnedSelectorRow {
        id: 1,
        domain: "shop.example".to_string(),
        item_key: item_key.to_string(),
        locator: ".price-now".to_string(),
        source_tier: source_tier.to_string(),
        confidence: 0.9,
        last_success_at: Utc::now(),
        last_price: Decimal::new(18_400, 2),
        updated_at: Utc::now(),
    }
}

#[test]
fn empty_item_key_maps_to_domain_level_selector() {
    let learned = learned_row("", "static_css_selectors")
        .into_learned()
        .expect("known tier");

    assert!(learned.item_key.is_none());
    assert_eq!(learned.source_tier, Tier::CssSelectors);
    assert_eq!(learned.last_price, Decimal::new(18_400, 2));
}

#[test]
fn item_scoped_selector_keeps_its_key() {
    let learned = learned_row("sku-1", "dynamic_render")
        .into_learned()
        .expect("known tier");

    assert_eq!(learned.item_key.as_deref(), Some("sku-1"));
    assert_eq!(learned.source_tier, Tier::DynamicRender);
}

#[test]
fn unknown_source_tier_is_a_decode_error() {
    let err = learned_row("", "carrier_pigeon")
        .into_learned()
        .expect_err("unknown tier must not decode");

    assert!(matches!(
        err,
        DbError::Decode {
            field: "learned_selectors.source_tier",
            ..
        }
    ));
}

/// Compile-time smoke test: confirm that [`BatchRunRow`] has all expected
/// fields with the correct types. No database required.
#[test]
fn batch_run_row_has_expected_fields() {
    let row = BatchRunRow {
        id: 1_i64,
        public_id: Uuid::new_v4(),
        status: "queued".to_string(),
        total: 3_i32,
        succeeded: 0,
        needs_review: 0,
        failed: 0,
        error_message: None,
        started_at: None,
        completed_at: None,
        created_at: Utc::now(),
    };

    assert_eq!(row.status, "queued");
    assert_eq!(row.total, 3);
    assert!(row.started_at.is_none());
    assert_eq!(BatchRunCounts::default().total, 0);
}

#[test]
fn audit_row_has_expected_fields() {
    let row = AuditRow {
        id: 9,
        item_id: "sku-1".to_string(),
        url: "https://shop.example/p/1".to_string(),
        status: "failed".to_string(),
        tier: None,
        method: None,
        locator: None,
        price: None,
        raw_price: None,
        currency: None,
        confidence: 0.0,
        review_reason: None,
        error_kind: Some("NO_PRICE_FOUND".to_string()),
        variant_resolution: None,
        cost: Decimal::ZERO,
        attempts: serde_json::json!([]),
        checked_at: Utc::now(),
    };

    assert_eq!(row.error_kind.as_deref(), Some("NO_PRICE_FOUND"));
    assert!(row.attempts.as_array().is_some_and(Vec::is_empty));
}
