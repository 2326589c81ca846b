//! Database operations for `extraction_audit`.

use chrono::{DateTime, Utc};
use pricewatch_core::ExtractionResult;
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `extraction_audit` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditRow {
    pub id: i64,
    pub item_id: String,
    pub url: String,
    pub status: String,
    pub tier: Option<String>,
    pub method: Option<String>,
    pub locator: Option<String>,
    pub price: Option<Decimal>,
    pub raw_price: Option<Decimal>,
    pub currency: Option<String>,
    pub confidence: f64,
    pub review_reason: Option<String>,
    pub error_kind: Option<String>,
    pub variant_resolution: Option<String>,
    pub cost: Decimal,
    /// The tier-attempt list as serialized JSON.
    pub attempts: serde_json::Value,
    pub checked_at: DateTime<Utc>,
}

/// Records one extraction result. Returns the row `id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_audit_result(pool: &PgPool, result: &ExtractionResult) -> Result<i64, DbError> {
    let variant_resolution = result
        .variant_resolution
        .and_then(|v| serde_json::to_value(v).ok())
        .and_then(|v| v.as_str().map(str::to_string));

    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO extraction_audit \
             (item_id, url, status, tier, method, locator, price, raw_price, currency, \
              confidence, review_reason, error_kind, variant_resolution, cost, attempts, checked_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, \
                 $10, $11, $12, $13, $14, $15, $16) \
         RETURNING id",
    )
    .bind(&result.item_id)
    .bind(&result.url)
    .bind(result.status.as_str())
    .bind(result.tier.map(|t| t.as_str()))
    .bind(&result.method)
    .bind(&result.locator)
    .bind(result.price)
    .bind(result.raw_price)
    .bind(&result.currency)
    .bind(result.confidence)
    .bind(&result.review_reason)
    .bind(result.error.map(|e| e.as_str()))
    .bind(variant_resolution)
    .bind(result.cost)
    .bind(Json(&result.attempts))
    .bind(result.checked_at)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Most recent audit rows for an item, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_recent_audit(
    pool: &PgPool,
    item_id: &str,
    limit: i64,
) -> Result<Vec<AuditRow>, DbError> {
    let rows = sqlx::query_as::<_, AuditRow>(
        "SELECT id, item_id, url, status, tier, method, locator, price, raw_price, currency, \
                confidence, review_reason, error_kind, variant_resolution, cost, attempts, checked_at \
         FROM extraction_audit \
         WHERE item_id = $1 \
         ORDER BY checked_at DESC, id DESC \
         LIMIT $2",
    )
    .bind(item_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
