//! Database operations for `site_rule_overrides`.
//!
//! A row holds a whole [`SiteRule`] as JSONB and replaces the YAML rule for
//! its domain.

use pricewatch_core::{normalize_domain, SiteRule};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::DbError;

/// Returns the stored override for `domain`, validated.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::Decode`] if the
/// stored JSON is not a valid rule.
pub async fn get_site_rule_override(
    pool: &PgPool,
    domain: &str,
) -> Result<Option<SiteRule>, DbError> {
    let row = sqlx::query_scalar::<_, serde_json::Value>(
        "SELECT rule FROM site_rule_overrides WHERE domain = $1",
    )
    .bind(normalize_domain(domain))
    .fetch_optional(pool)
    .await?;

    let Some(value) = row else {
        return Ok(None);
    };
    let rule: SiteRule = serde_json::from_value(value).map_err(|e| DbError::Decode {
        field: "site_rule_overrides.rule",
        reason: e.to_string(),
    })?;
    rule.validate().map_err(|e| DbError::Decode {
        field: "site_rule_overrides.rule",
        reason: e.to_string(),
    })?;
    Ok(Some(rule))
}

/// Stores `rule` as the override for its domain, replacing any previous one.
///
/// # Errors
///
/// Returns [`DbError::Decode`] if the rule fails validation, or
/// [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_site_rule_override(pool: &PgPool, rule: &SiteRule) -> Result<(), DbError> {
    rule.validate().map_err(|e| DbError::Decode {
        field: "site_rule_overrides.rule",
        reason: e.to_string(),
    })?;

    sqlx::query(
        "INSERT INTO site_rule_overrides (domain, rule) \
         VALUES ($1, $2) \
         ON CONFLICT (domain) DO UPDATE SET \
             rule       = EXCLUDED.rule, \
             updated_at = NOW()",
    )
    .bind(normalize_domain(&rule.domain))
    .bind(Json(rule))
    .execute(pool)
    .await?;

    Ok(())
}
