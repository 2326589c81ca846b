//! `pricewatch batch`: an items file through the batch runner.
//!
//! With Postgres the run is tracked in `batch_runs`; a failure before the
//! batch finishes marks the run failed on a best-effort basis.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pricewatch_core::AppConfig;
use pricewatch_extractor::{BatchConfig, BatchReport, BatchRunner, BatchState};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{items, wiring};

#[derive(Debug)]
pub(crate) struct BatchOptions {
    pub items_path: PathBuf,
    pub workers: Option<usize>,
    pub deadline_secs: Option<u64>,
    pub no_db: bool,
}

pub(crate) fn batch_config(config: &AppConfig, options: &BatchOptions) -> BatchConfig {
    let mut batch = BatchConfig::from_app_config(config);
    if let Some(workers) = options.workers {
        batch.workers = workers.max(1);
    }
    if let Some(secs) = options.deadline_secs {
        batch.deadline = (secs > 0).then(|| Duration::from_secs(secs));
    }
    batch
}

fn saturating_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

pub(crate) fn run_counts(report: &BatchReport) -> pricewatch_db::BatchRunCounts {
    pricewatch_db::BatchRunCounts {
        total: saturating_i32(report.counts.total),
        succeeded: saturating_i32(report.counts.succeeded),
        needs_review: saturating_i32(report.counts.needs_review),
        failed: saturating_i32(report.counts.failed),
    }
}

/// Marks the run failed, logging instead of propagating if the update itself
/// fails.
async fn fail_run_best_effort(pool: &PgPool, public_id: Uuid, message: &str) {
    if let Err(e) = pricewatch_db::fail_batch_run(pool, public_id, message).await {
        tracing::error!(batch_id = %public_id, error = %e, "failed to mark batch run as failed");
    }
}

pub(crate) async fn run_batch_command(
    config: &AppConfig,
    options: BatchOptions,
) -> anyhow::Result<()> {
    let requests = items::load_items(&options.items_path)?;
    if requests.is_empty() {
        println!("items file is empty; nothing to do");
        return Ok(());
    }

    let store = wiring::open_store(config, options.no_db).await?;
    let extractor = Arc::new(wiring::build_extractor(config, store.store).await?);
    let batch_config = batch_config(config, &options);

    tracing::info!(
        items = requests.len(),
        workers = batch_config.workers,
        deadline_secs = batch_config.deadline.map(|d| d.as_secs()),
        "starting batch"
    );

    let total = saturating_i32(requests.len());
    let handle = BatchRunner::new(Arc::clone(&extractor), batch_config).submit(requests);
    let batch_id = handle.batch_id();

    if let Some(pool) = &store.pool {
        pricewatch_db::create_batch_run(pool, batch_id, total).await?;
        if let Err(e) = pricewatch_db::start_batch_run(pool, batch_id).await {
            fail_run_best_effort(pool, batch_id, &format!("{e:#}")).await;
            return Err(e.into());
        }
    }

    let joined = handle.join().await;
    extractor.shutdown().await;
    let report = match joined {
        Ok(report) => report,
        Err(e) => {
            if let Some(pool) = &store.pool {
                fail_run_best_effort(pool, batch_id, &format!("batch task aborted: {e}")).await;
            }
            return Err(anyhow::anyhow!("batch {batch_id} aborted: {e}"));
        }
    };

    if let Some(pool) = &store.pool {
        pricewatch_db::complete_batch_run(pool, batch_id, report.state.as_str(), run_counts(&report))
            .await?;
    }

    println!("{}", serde_json::to_string_pretty(&report)?);

    match report.state {
        BatchState::Failed => anyhow::bail!("batch {batch_id}: every item failed"),
        BatchState::Blocked => {
            anyhow::bail!("batch {batch_id} blocked by {} variant alert(s)", report.alerts.len())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(workers: Option<usize>, deadline_secs: Option<u64>) -> BatchOptions {
        BatchOptions {
            items_path: PathBuf::from("items.yaml"),
            workers,
            deadline_secs,
            no_db: true,
        }
    }

    #[test]
    fn flags_override_configured_workers_and_deadline() {
        let config = crate::tests::test_app_config();

        let defaults = batch_config(&config, &options(None, None));
        assert_eq!(defaults.workers, 4);
        assert_eq!(defaults.deadline, Some(Duration::from_secs(1800)));

        let overridden = batch_config(&config, &options(Some(8), Some(0)));
        assert_eq!(overridden.workers, 8);
        assert!(overridden.deadline.is_none());
    }

    #[test]
    fn report_counts_convert_for_the_run_table() {
        let report = BatchReport {
            batch_id: Uuid::new_v4(),
            state: BatchState::Succeeded,
            counts: pricewatch_extractor::batch::BatchCounts {
                total: 3,
                completed: 3,
                succeeded: 2,
                needs_review: 1,
                failed: 0,
            },
            results: Vec::new(),
            alerts: Vec::new(),
            elapsed_ms: 12,
        };

        let counts = run_counts(&report);
        assert_eq!(counts.total, 3);
        assert_eq!(counts.succeeded, 2);
        assert_eq!(counts.needs_review, 1);
        assert_eq!(counts.failed, 0);
    }
}
