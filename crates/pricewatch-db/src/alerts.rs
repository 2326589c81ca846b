//! Database operations for `alerts`.

use chrono::{DateTime, Utc};
use pricewatch_core::Alert;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `alerts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AlertRow {
    pub id: i64,
    pub kind: String,
    pub severity: String,
    pub subject: String,
    pub message: String,
    pub details: serde_json::Value,
    pub batch_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_alert(pool: &PgPool, alert: &Alert) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO alerts (kind, severity, subject, message, details, batch_id, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) \
         RETURNING id",
    )
    .bind(alert.kind.as_str())
    .bind(alert.severity.as_str())
    .bind(&alert.subject)
    .bind(&alert.message)
    .bind(&alert.details)
    .bind(alert.batch_id)
    .bind(alert.created_at)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Alerts raised during one batch, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_alerts_for_batch(pool: &PgPool, batch_id: Uuid) -> Result<Vec<AlertRow>, DbError> {
    let rows = sqlx::query_as::<_, AlertRow>(
        "SELECT id, kind, severity, subject, message, details, batch_id, created_at \
         FROM alerts WHERE batch_id = $1 ORDER BY created_at, id",
    )
    .bind(batch_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
