//! Database operations for `learned_selectors`.

use chrono::{DateTime, Utc};
use pricewatch_core::{LearnedSelector, Tier};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

/// Stored in place of a missing item key; `UNIQUE (domain, item_key)` would
/// otherwise let domain-level rows duplicate.
const DOMAIN_LEVEL: &str = "";

/// A row from the `learned_selectors` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LearnedSelectorRow {
    pub id: i64,
    pub domain: String,
    /// Empty for the domain-level entry.
    pub item_key: String,
    pub locator: String,
    pub source_tier: String,
    pub confidence: f64,
    pub last_success_at: DateTime<Utc>,
    pub last_price: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl LearnedSelectorRow {
    /// Converts to the shared model type.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Decode`] if `source_tier` names no known tier.
    pub fn into_learned(self) -> Result<LearnedSelector, DbError> {
        let source_tier = self
            .source_tier
            .parse::<Tier>()
            .map_err(|reason| DbError::Decode {
                field: "learned_selectors.source_tier",
                reason,
            })?;
        Ok(LearnedSelector {
            domain: self.domain,
            item_key: (self.item_key != DOMAIN_LEVEL).then_some(self.item_key),
            locator: self.locator,
            source_tier,
            confidence: self.confidence,
            last_success_at: self.last_success_at,
            last_price: self.last_price,
        })
    }
}

/// Returns the entry for `domain` and `item_key`; `None` reads the
/// domain-level entry.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_learned_selector(
    pool: &PgPool,
    domain: &str,
    item_key: Option<&str>,
) -> Result<Option<LearnedSelectorRow>, DbError> {
    let row = sqlx::query_as::<_, LearnedSelectorRow>(
        "SELECT id, domain, item_key, locator, source_tier, confidence, \
                last_success_at, last_price, updated_at \
         FROM learned_selectors \
         WHERE domain = $1 AND item_key = $2",
    )
    .bind(domain)
    .bind(item_key.unwrap_or(DOMAIN_LEVEL))
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Upserts an entry. Conflicts on `(domain, item_key)` overwrite every
/// column; entries are never merged.
///
/// Returns the internal `id` of the upserted row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_learned_selector(
    pool: &PgPool,
    selector: &LearnedSelector,
) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO learned_selectors \
             (domain, item_key, locator, source_tier, confidence, last_success_at, last_price) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (domain, item_key) DO UPDATE SET \
             locator         = EXCLUDED.locator, \
             source_tier     = EXCLUDED.source_tier, \
             confidence      = EXCLUDED.confidence, \
             last_success_at = EXCLUDED.last_success_at, \
             last_price      = EXCLUDED.last_price, \
             updated_at      = NOW() \
         RETURNING id",
    )
    .bind(&selector.domain)
    .bind(selector.item_key.as_deref().unwrap_or(DOMAIN_LEVEL))
    .bind(&selector.locator)
    .bind(selector.source_tier.as_str())
    .bind(selector.confidence)
    .bind(selector.last_success_at)
    .bind(selector.last_price)
    .fetch_one(pool)
    .await?;

    Ok(id)
}
