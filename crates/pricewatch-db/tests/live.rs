//! Live integration tests for pricewatch-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. They need `DATABASE_URL` and are ignored by default;
//! run them with `cargo test -p pricewatch-db -- --ignored`.

use chrono::{NaiveDate, TimeZone, Utc};
use pricewatch_core::{
    Alert, AlertKind, CostCategory, CostEntry, ErrorKind, ExtractionRequest, ExtractionResult,
    LearnedSelector, Severity, SiteRule, Tier,
};
use pricewatch_db::{
    complete_batch_run, create_batch_run, daily_spend_by_category, fail_batch_run,
    get_batch_run, get_learned_selector, get_site_rule_override, insert_alert,
    insert_audit_result, insert_cost_entry, list_alerts_for_batch, list_recent_audit,
    start_batch_run, sum_cost_for_day, upsert_learned_selector, upsert_site_rule_override,
    BatchRunCounts, DbError,
};
use rust_decimal::Decimal;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn learned(item_key: Option<&str>, locator: &str, price: Decimal) -> LearnedSelector {
    LearnedSelector {
        domain: "shop.example".to_string(),
        item_key: item_key.map(str::to_string),
        locator: locator.to_string(),
        source_tier: Tier::CssSelectors,
        confidence: 0.9,
        last_success_at: Utc::now(),
        last_price: price,
    }
}

fn cost(category: CostCategory, cents: i64, day: NaiveDate) -> CostEntry {
    CostEntry {
        category,
        amount: Decimal::new(cents, 2),
        day,
        item_id: Some("sku-1".to_string()),
        note: None,
        recorded_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Learned selectors
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn learned_selector_upsert_overwrites_instead_of_merging(pool: sqlx::PgPool) {
    let first_id = upsert_learned_selector(&pool, &learned(Some("sku-1"), ".old", Decimal::new(1840, 1)))
        .await
        .expect("first upsert failed");
    let second_id =
        upsert_learned_selector(&pool, &learned(Some("sku-1"), ".new", Decimal::new(1999, 1)))
            .await
            .expect("second upsert failed");
    assert_eq!(first_id, second_id, "same (domain, item_key) is one row");

    let row = get_learned_selector(&pool, "shop.example", Some("sku-1"))
        .await
        .expect("get failed")
        .expect("row should exist");
    assert_eq!(row.locator, ".new");
    assert_eq!(row.last_price, Decimal::new(1999, 1));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn domain_level_and_item_level_selectors_are_separate(pool: sqlx::PgPool) {
    upsert_learned_selector(&pool, &learned(None, ".domain", Decimal::ONE_HUNDRED))
        .await
        .expect("domain upsert failed");
    upsert_learned_selector(&pool, &learned(Some("sku-1"), ".item", Decimal::ONE_HUNDRED))
        .await
        .expect("item upsert failed");

    let domain = get_learned_selector(&pool, "shop.example", None)
        .await
        .expect("get failed")
        .expect("domain row");
    assert_eq!(domain.locator, ".domain");
    assert!(domain.into_learned().expect("decodes").item_key.is_none());

    let missing = get_learned_selector(&pool, "shop.example", Some("sku-2"))
        .await
        .expect("get failed");
    assert!(missing.is_none());
}

// ---------------------------------------------------------------------------
// Site rule overrides
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn site_rule_override_round_trips_through_jsonb(pool: sqlx::PgPool) {
    let rule: SiteRule = serde_yaml::from_str(
        "domain: Shop.Example\nprice_selectors: ['.price-now']\nrequires_render: true\n",
    )
    .expect("valid rule yaml");

    upsert_site_rule_override(&pool, &rule)
        .await
        .expect("upsert failed");

    let stored = get_site_rule_override(&pool, "shop.example")
        .await
        .expect("get failed")
        .expect("override should exist");
    assert_eq!(stored.price_selectors, vec![".price-now".to_string()]);
    assert!(stored.requires_render);

    let absent = get_site_rule_override(&pool, "other.example")
        .await
        .expect("get failed");
    assert!(absent.is_none());
}

// ---------------------------------------------------------------------------
// Cost ledger
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn cost_sums_are_per_category_and_day(pool: sqlx::PgPool) {
    let today = NaiveDate::from_ymd_opt(2026, 5, 1).expect("valid date");
    let yesterday = NaiveDate::from_ymd_opt(2026, 4, 30).expect("valid date");

    for entry in [
        cost(CostCategory::AiPartial, 10, today),
        cost(CostCategory::AiPartial, 15, today),
        cost(CostCategory::AiFull, 40, today),
        cost(CostCategory::AiPartial, 99, yesterday),
    ] {
        insert_cost_entry(&pool, &entry).await.expect("insert failed");
    }

    let partial = sum_cost_for_day(&pool, CostCategory::AiPartial, today)
        .await
        .expect("sum failed");
    assert_eq!(partial, Decimal::new(25, 2));

    let render = sum_cost_for_day(&pool, CostCategory::RenderPremium, today)
        .await
        .expect("sum failed");
    assert_eq!(render, Decimal::ZERO);

    let by_category = daily_spend_by_category(&pool, today)
        .await
        .expect("breakdown failed");
    assert_eq!(
        by_category,
        vec![
            (CostCategory::AiFull, Decimal::new(40, 2)),
            (CostCategory::AiPartial, Decimal::new(25, 2)),
        ]
    );
}

// ---------------------------------------------------------------------------
// Audit and alerts
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn audit_rows_list_newest_first(pool: sqlx::PgPool) {
    let req = ExtractionRequest::new("sku-1", "https://shop.example/p/1", "Widget");
    let mut older = ExtractionResult::failed(&req, ErrorKind::NoPriceFound, Vec::new());
    older.checked_at = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).single().expect("valid");
    let mut newer = ExtractionResult::failed(&req, ErrorKind::Cancelled, Vec::new());
    newer.checked_at = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).single().expect("valid");

    insert_audit_result(&pool, &older).await.expect("insert failed");
    insert_audit_result(&pool, &newer).await.expect("insert failed");

    let rows = list_recent_audit(&pool, "sku-1", 10).await.expect("list failed");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].error_kind.as_deref(), Some("CANCELLED"));
    assert_eq!(rows[1].error_kind.as_deref(), Some("NO_PRICE_FOUND"));
    assert_eq!(rows[0].status, "failed");
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn alerts_are_listed_per_batch(pool: sqlx::PgPool) {
    let batch_id = Uuid::new_v4();
    let alert = Alert {
        kind: AlertKind::VariantPriceCollapse,
        severity: Severity::High,
        subject: "Widget".to_string(),
        message: "4 sizes share one price".to_string(),
        details: serde_json::json!({ "price": "19.99" }),
        batch_id: Some(batch_id),
        created_at: Utc::now(),
    };
    insert_alert(&pool, &alert).await.expect("insert failed");

    let other = Alert {
        batch_id: None,
        ..alert.clone()
    };
    insert_alert(&pool, &other).await.expect("insert failed");

    let rows = list_alerts_for_batch(&pool, batch_id).await.expect("list failed");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].kind, "variant_price_collapse");
    assert_eq!(rows[0].severity, "high");
}

// ---------------------------------------------------------------------------
// Batch runs
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn batch_run_lifecycle_queued_to_blocked(pool: sqlx::PgPool) {
    let public_id = Uuid::new_v4();
    let run = create_batch_run(&pool, public_id, 4)
        .await
        .expect("create failed");
    assert_eq!(run.status, "queued");
    assert!(run.started_at.is_none());

    start_batch_run(&pool, public_id).await.expect("start failed");
    complete_batch_run(
        &pool,
        public_id,
        "blocked",
        BatchRunCounts {
            total: 4,
            succeeded: 3,
            needs_review: 1,
            failed: 0,
        },
    )
    .await
    .expect("complete failed");

    let fetched = get_batch_run(&pool, public_id).await.expect("get failed");
    assert_eq!(fetched.status, "blocked");
    assert_eq!(fetched.succeeded, 3);
    assert_eq!(fetched.needs_review, 1);
    assert!(fetched.completed_at.is_some());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn batch_run_cannot_complete_directly_from_queued(pool: sqlx::PgPool) {
    let public_id = Uuid::new_v4();
    create_batch_run(&pool, public_id, 1).await.expect("create failed");

    let err = complete_batch_run(&pool, public_id, "succeeded", BatchRunCounts::default())
        .await
        .expect_err("completing a queued run should fail");
    assert!(matches!(
        err,
        DbError::InvalidBatchRunTransition {
            expected_status: "running",
            ..
        }
    ));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires DATABASE_URL"]
async fn failed_batch_run_keeps_message_and_rejects_replay(pool: sqlx::PgPool) {
    let public_id = Uuid::new_v4();
    create_batch_run(&pool, public_id, 2).await.expect("create failed");
    fail_batch_run(&pool, public_id, "requests file unreadable")
        .await
        .expect("fail failed");

    let fetched = get_batch_run(&pool, public_id).await.expect("get failed");
    assert_eq!(fetched.status, "failed");
    assert_eq!(fetched.error_message.as_deref(), Some("requests file unreadable"));

    let err = start_batch_run(&pool, public_id)
        .await
        .expect_err("a failed run cannot restart");
    assert!(matches!(err, DbError::InvalidBatchRunTransition { .. }));

    let missing = get_batch_run(&pool, Uuid::new_v4()).await;
    assert!(matches!(missing, Err(DbError::NotFound)));
}
