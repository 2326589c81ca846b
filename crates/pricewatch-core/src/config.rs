use std::path::PathBuf;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from the process environment only.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Parsing and validation, decoupled from the real environment so tests can
/// drive it with a `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let optional = |var: &str| -> Option<String> {
        lookup(var).ok().filter(|v| !v.trim().is_empty())
    };

    let or_default = |var: &str, default: &str| -> String {
        optional(var).unwrap_or_else(|| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_positive_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let value = or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))?;
        if value == 0 {
            return Err(invalid(var, "must be at least 1".to_string()));
        }
        Ok(value)
    };

    let parse_usd = |var: &str, default: &str| -> Result<Decimal, ConfigError> {
        let value = Decimal::from_str(&or_default(var, default))
            .map_err(|e| invalid(var, e.to_string()))?;
        if value < Decimal::ZERO {
            return Err(invalid(var, "must not be negative".to_string()));
        }
        Ok(value)
    };

    let parse_bool = |var: &str, default: bool| -> Result<bool, ConfigError> {
        match optional(var).map(|v| v.to_lowercase()).as_deref() {
            None => Ok(default),
            Some("1" | "true" | "yes" | "on") => Ok(true),
            Some("0" | "false" | "no" | "off") => Ok(false),
            Some(other) => Err(invalid(var, format!("expected a boolean, got '{other}'"))),
        }
    };

    let env = parse_environment(&or_default("PRICEWATCH_ENV", "development"))?;
    let log_level = or_default("PRICEWATCH_LOG_LEVEL", "info");
    let site_rules_path = PathBuf::from(or_default(
        "PRICEWATCH_SITE_RULES_PATH",
        "./config/site_rules.yaml",
    ));

    let db_max_connections = parse_u32("PRICEWATCH_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("PRICEWATCH_DB_MIN_CONNECTIONS", "1")?;
    if db_min_connections > db_max_connections {
        return Err(invalid(
            "PRICEWATCH_DB_MIN_CONNECTIONS",
            format!("{db_min_connections} exceeds max connections {db_max_connections}"),
        ));
    }

    let render_service_url = optional("PRICEWATCH_RENDER_SERVICE_URL");
    let render_service_key = optional("PRICEWATCH_RENDER_SERVICE_KEY");
    if render_service_url.is_some() && render_service_key.is_none() {
        return Err(ConfigError::MissingEnvVar(
            "PRICEWATCH_RENDER_SERVICE_KEY".to_string(),
        ));
    }

    Ok(AppConfig {
        database_url: optional("DATABASE_URL"),
        env,
        log_level,
        site_rules_path,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs: parse_u64("PRICEWATCH_DB_ACQUIRE_TIMEOUT_SECS", "10")?,
        request_timeout_secs: parse_u64("PRICEWATCH_REQUEST_TIMEOUT_SECS", "30")?,
        user_agent: or_default("PRICEWATCH_USER_AGENT", "pricewatch/0.1 (price-monitor)"),
        max_retries: parse_u32("PRICEWATCH_MAX_RETRIES", "2")?,
        retry_backoff_base_ms: parse_u64("PRICEWATCH_RETRY_BACKOFF_BASE_MS", "500")?,
        render_service_url,
        render_service_key,
        render_max_cost_usd: parse_usd("PRICEWATCH_RENDER_MAX_COST_USD", "0.05")?,
        render_pool_size: parse_positive_usize("PRICEWATCH_RENDER_POOL_SIZE", "2")?,
        render_lease_timeout_secs: parse_u64("PRICEWATCH_RENDER_LEASE_TIMEOUT_SECS", "30")?,
        navigation_timeout_secs: parse_u64("PRICEWATCH_NAVIGATION_TIMEOUT_SECS", "30")?,
        settle_timeout_ms: parse_u64("PRICEWATCH_SETTLE_TIMEOUT_MS", "3000")?,
        tier_timeout_secs: parse_u64("PRICEWATCH_TIER_TIMEOUT_SECS", "90")?,
        workers: parse_positive_usize("PRICEWATCH_WORKERS", "4")?,
        batch_deadline_secs: parse_u64("PRICEWATCH_BATCH_DEADLINE_SECS", "1800")?,
        block_on_variant_alert: parse_bool("PRICEWATCH_BLOCK_ON_VARIANT_ALERT", false)?,
        openai_api_key: optional("OPENAI_API_KEY"),
        llm_base_url: or_default("PRICEWATCH_LLM_BASE_URL", "https://api.openai.com/v1"),
        llm_partial_model: or_default("PRICEWATCH_LLM_PARTIAL_MODEL", "gpt-4o-mini"),
        llm_full_model: or_default("PRICEWATCH_LLM_FULL_MODEL", "gpt-4o"),
        budget_daily_usd: parse_usd("PRICEWATCH_BUDGET_DAILY_USD", "5.00")?,
        budget_ai_partial_usd: parse_usd("PRICEWATCH_BUDGET_AI_PARTIAL_USD", "1.00")?,
        budget_ai_full_usd: parse_usd("PRICEWATCH_BUDGET_AI_FULL_USD", "3.00")?,
        budget_render_premium_usd: parse_usd("PRICEWATCH_BUDGET_RENDER_PREMIUM_USD", "1.00")?,
    })
}

fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "PRICEWATCH_ENV".to_string(),
            reason: format!("expected development, test, or production, got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
