use std::path::PathBuf;

use pricewatch_core::{AppConfig, Environment};

use super::*;

pub(crate) fn test_app_config() -> AppConfig {
    AppConfig {
        database_url: None,
        env: Environment::Test,
        log_level: "info".to_string(),
        site_rules_path: PathBuf::from("./config/site_rules.yaml"),
        db_max_connections: 10,
        db_min_connections: 1,
        db_acquire_timeout_secs: 10,
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
fn parses_check_with_required_flags() {
    let cli = Cli::try_parse_from([
        "pricewatch",
        "check",
        "--url",
        "https://brewgear.example/p/grinder",
        "--name",
        "Model X 60W",
    ])
    .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Commands::Check {
            ref url,
            item_id: None,
            previous_price: None,
            debug: false,
            no_db: false,
            ..
        } if url == "https://brewgear.example/p/grinder"
    ));
}

#[test]
fn parses_check_previous_price_as_decimal() {
    let cli = Cli::try_parse_from([
        "pricewatch",
        "check",
        "--url",
        "https://a.example/p",
        "--name",
        "Widget",
        "--previous-price",
        "184.00",
        "--currency",
        "USD",
        "--debug",
        "--no-db",
    ])
    .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Commands::Check {
            previous_price: Some(p),
            debug: true,
            no_db: true,
            ..
        } if p == Decimal::new(18_400, 2)
    ));
}

#[test]
fn currency_requires_previous_price() {
    let result = Cli::try_parse_from([
        "pricewatch",
        "check",
        "--url",
        "https://a.example/p",
        "--name",
        "Widget",
        "--currency",
        "USD",
    ]);
    assert!(result.is_err());
}

#[test]
fn check_requires_url() {
    let result = Cli::try_parse_from(["pricewatch", "check", "--name", "Widget"]);
    assert!(result.is_err());
}

#[test]
fn parses_batch_with_overrides() {
    let cli = Cli::try_parse_from([
        "pricewatch",
        "batch",
        "--items",
        "items.yaml",
        "--workers",
        "8",
        "--deadline-secs",
        "600",
    ])
    .expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Commands::Batch {
            workers: Some(8),
            deadline_secs: Some(600),
            no_db: false,
            ..
        }
    ));
}

#[test]
fn zero_workers_is_rejected() {
    let result = Cli::try_parse_from(["pricewatch", "batch", "--items", "i.yaml", "--workers", "0"]);
    assert!(result.is_err());
}

#[test]
fn parses_budget_and_migrate() {
    let budget = Cli::try_parse_from(["pricewatch", "budget"]).expect("expected valid cli args");
    assert!(matches!(budget.command, Commands::Budget));

    let migrate = Cli::try_parse_from(["pricewatch", "migrate"]).expect("expected valid cli args");
    assert!(matches!(migrate.command, Commands::Migrate));
}

#[test]
fn subcommand_is_required() {
    assert!(Cli::try_parse_from(["pricewatch"]).is_err());
}
