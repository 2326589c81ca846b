//! Database operations for `batch_runs`.
//!
//! A run moves `queued -> running -> {succeeded | failed | blocked}`. Every
//! transition is guarded on the current status so a replayed update fails
//! instead of rewriting history.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const TERMINAL_STATUSES: [&str; 3] = ["succeeded", "failed", "blocked"];

/// A row from the `batch_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BatchRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub status: String,
    pub total: i32,
    pub succeeded: i32,
    pub needs_review: i32,
    pub failed: i32,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Final tallies written when a run completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchRunCounts {
    pub total: i32,
    pub succeeded: i32,
    pub needs_review: i32,
    pub failed: i32,
}

/// Creates a run in `queued` status under the caller's `public_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails, including a duplicate
/// `public_id`.
pub async fn create_batch_run(
    pool: &PgPool,
    public_id: Uuid,
    total: i32,
) -> Result<BatchRunRow, DbError> {
    let row = sqlx::query_as::<_, BatchRunRow>(
        "INSERT INTO batch_runs (public_id, status, total) \
         VALUES ($1, 'queued', $2) \
         RETURNING id, public_id, status, total, succeeded, needs_review, failed, \
                   error_message, started_at, completed_at, created_at",
    )
    .bind(public_id)
    .bind(total)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Marks a queued run as `running` and sets `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidBatchRunTransition`] if the run is not queued,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn start_batch_run(pool: &PgPool, public_id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE batch_runs \
         SET status = 'running', started_at = NOW() \
         WHERE public_id = $1 AND status = 'queued'",
    )
    .bind(public_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidBatchRunTransition {
            public_id,
            expected_status: "queued",
        });
    }

    Ok(())
}

/// Moves a running run to a terminal `status` and records the tallies.
///
/// # Errors
///
/// Returns [`DbError::InvalidBatchRunStatus`] if `status` is not terminal,
/// [`DbError::InvalidBatchRunTransition`] if the run is not running, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn complete_batch_run(
    pool: &PgPool,
    public_id: Uuid,
    status: &str,
    counts: BatchRunCounts,
) -> Result<(), DbError> {
    if !TERMINAL_STATUSES.contains(&status) {
        return Err(DbError::InvalidBatchRunStatus(status.to_string()));
    }

    let result = sqlx::query(
        "UPDATE batch_runs \
         SET status = $1, completed_at = NOW(), \
             total = $2, succeeded = $3, needs_review = $4, failed = $5 \
         WHERE public_id = $6 AND status = 'running'",
    )
    .bind(status)
    .bind(counts.total)
    .bind(counts.succeeded)
    .bind(counts.needs_review)
    .bind(counts.failed)
    .bind(public_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidBatchRunTransition {
            public_id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a run `failed` with an error message. Queued runs may fail too,
/// e.g. when the request file cannot be read.
///
/// # Errors
///
/// Returns [`DbError::InvalidBatchRunTransition`] if the run already
/// finished, or [`DbError::Sqlx`] if the update fails.
pub async fn fail_batch_run(
    pool: &PgPool,
    public_id: Uuid,
    error_message: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE batch_runs \
         SET status = 'failed', completed_at = NOW(), error_message = $1 \
         WHERE public_id = $2 AND status IN ('queued', 'running')",
    )
    .bind(error_message)
    .bind(public_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidBatchRunTransition {
            public_id,
            expected_status: "queued or running",
        });
    }

    Ok(())
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no run has this `public_id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_batch_run(pool: &PgPool, public_id: Uuid) -> Result<BatchRunRow, DbError> {
    let row = sqlx::query_as::<_, BatchRunRow>(
        "SELECT id, public_id, status, total, succeeded, needs_review, failed, \
                error_message, started_at, completed_at, created_at \
         FROM batch_runs \
         WHERE public_id = $1",
    )
    .bind(public_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_finished_states_are_terminal() {
        assert!(TERMINAL_STATUSES.contains(&"blocked"));
        assert!(!TERMINAL_STATUSES.contains(&"running"));
        assert!(!TERMINAL_STATUSES.contains(&"queued"));
    }
}
