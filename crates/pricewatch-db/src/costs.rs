//! Database operations for the `cost_entries` ledger.

use chrono::NaiveDate;
use pricewatch_core::{CostCategory, CostEntry};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

/// Appends one ledger line. Returns its `id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_cost_entry(pool: &PgPool, entry: &CostEntry) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO cost_entries (category, amount, day, item_id, note, recorded_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING id",
    )
    .bind(entry.category.as_str())
    .bind(entry.amount)
    .bind(entry.day)
    .bind(&entry.item_id)
    .bind(&entry.note)
    .bind(entry.recorded_at)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Total spend for `category` on the UTC `day`; zero when nothing was spent.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn sum_cost_for_day(
    pool: &PgPool,
    category: CostCategory,
    day: NaiveDate,
) -> Result<Decimal, DbError> {
    let total = sqlx::query_scalar::<_, Decimal>(
        "SELECT COALESCE(SUM(amount), 0) FROM cost_entries WHERE category = $1 AND day = $2",
    )
    .bind(category.as_str())
    .bind(day)
    .fetch_one(pool)
    .await?;

    Ok(total)
}

/// Spend per category on `day`, only for categories with entries.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::Decode`] if a
/// row carries an unknown category.
pub async fn daily_spend_by_category(
    pool: &PgPool,
    day: NaiveDate,
) -> Result<Vec<(CostCategory, Decimal)>, DbError> {
    let rows = sqlx::query_as::<_, (String, Decimal)>(
        "SELECT category, SUM(amount) FROM cost_entries \
         WHERE day = $1 GROUP BY category ORDER BY category",
    )
    .bind(day)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(category, total)| {
            let category = category.parse::<CostCategory>().map_err(|reason| DbError::Decode {
                field: "cost_entries.category",
                reason,
            })?;
            Ok((category, total))
        })
        .collect()
}
