//! Many requests through one [`Extractor`] with bounded concurrency.
//!
//! Workers pull from the request list through `buffer_unordered`; one item
//! never aborts the batch. Every priced result feeds the
//! [`VariantPriceVerifier`], and collapse alerts are persisted as they fire.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use pricewatch_core::{Alert, AppConfig, ExtractionRequest, ExtractionResult, ExtractionStatus};
use serde::{Deserialize, Serialize};
use tokio::task::{JoinError, JoinHandle};
use uuid::Uuid;

use crate::orchestrator::Extractor;
use crate::verifier::{VariantObservation, VariantPriceVerifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub workers: usize,
    /// Overall budget for the batch; requests still escalating when it
    /// passes stop at their next tier boundary.
    pub deadline: Option<Duration>,
    pub block_on_variant_alert: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            deadline: None,
            block_on_variant_alert: false,
        }
    }
}

impl BatchConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            workers: config.workers,
            deadline: (config.batch_deadline_secs > 0)
                .then(|| Duration::from_secs(config.batch_deadline_secs)),
            block_on_variant_alert: config.block_on_variant_alert,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Queued,
    Running,
    Succeeded,
    Failed,
    /// Finished, but a variant collapse alert holds back the commit.
    Blocked,
}

impl BatchState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BatchState::Queued => "queued",
            BatchState::Running => "running",
            BatchState::Succeeded => "succeeded",
            BatchState::Failed => "failed",
            BatchState::Blocked => "blocked",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchState::Succeeded | BatchState::Failed | BatchState::Blocked)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounts {
    pub total: usize,
    pub completed: usize,
    /// `Verified` or `AutoCorrected`.
    pub succeeded: usize,
    pub needs_review: usize,
    pub failed: usize,
}

impl BatchCounts {
    fn record(&mut self, status: ExtractionStatus) {
        self.completed += 1;
        match status {
            ExtractionStatus::Verified | ExtractionStatus::AutoCorrected => self.succeeded += 1,
            ExtractionStatus::NeedsReview => self.needs_review += 1,
            ExtractionStatus::Failed => self.failed += 1,
        }
    }
}

/// Live view of a running batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStatus {
    pub batch_id: Uuid,
    pub state: BatchState,
    pub counts: BatchCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub state: BatchState,
    pub counts: BatchCounts,
    /// In request order.
    pub results: Vec<ExtractionResult>,
    pub alerts: Vec<Alert>,
    pub elapsed_ms: u64,
}

/// Runs `requests` to completion and returns the aggregate report.
///
/// `status`, when given, is kept current as results arrive.
pub async fn run_batch(
    extractor: &Extractor,
    requests: Vec<ExtractionRequest>,
    config: &BatchConfig,
    batch_id: Uuid,
    status: Option<&RwLock<BatchStatus>>,
) -> BatchReport {
    let started = Instant::now();
    let deadline = config.deadline.map(|d| started + d);
    let mut counts = BatchCounts {
        total: requests.len(),
        ..BatchCounts::default()
    };
    update(status, BatchState::Running, counts);
    tracing::info!(%batch_id, total = counts.total, workers = config.workers, "batch started");

    let mut verifier = VariantPriceVerifier::new(batch_id);
    let mut alerts = Vec::new();
    let mut indexed: Vec<(usize, ExtractionResult)> = Vec::with_capacity(requests.len());

    let names: Vec<String> = requests.iter().map(|r| r.item_name.clone()).collect();
    let mut results = stream::iter(requests.into_iter().enumerate())
        .map(|(index, request)| async move {
            (index, extractor.extract_with_deadline(&request, deadline).await)
        })
        .buffer_unordered(config.workers.max(1));

    while let Some((index, result)) = results.next().await {
        counts.record(result.status);
        update(status, BatchState::Running, counts);

        if let Some(price) = result.price {
            let observation = VariantObservation::from_item(&names[index], price, batch_id);
            if let Some(alert) = verifier.observe(observation) {
                if let Err(e) = extractor.store().record_alert(&alert).await {
                    tracing::warn!(%batch_id, error = %e, "failed to persist variant alert");
                }
                alerts.push(alert);
            }
        }
        indexed.push((index, result));
    }
    drop(results);

    indexed.sort_by_key(|(index, _)| *index);
    let state = if counts.total > 0 && counts.failed == counts.total {
        BatchState::Failed
    } else if config.block_on_variant_alert && !alerts.is_empty() {
        BatchState::Blocked
    } else {
        BatchState::Succeeded
    };
    update(status, state, counts);

    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    tracing::info!(
        %batch_id,
        state = state.as_str(),
        succeeded = counts.succeeded,
        needs_review = counts.needs_review,
        failed = counts.failed,
        alerts = alerts.len(),
        elapsed_ms,
        "batch finished"
    );

    BatchReport {
        batch_id,
        state,
        counts,
        results: indexed.into_iter().map(|(_, r)| r).collect(),
        alerts,
        elapsed_ms,
    }
}

fn update(status: Option<&RwLock<BatchStatus>>, state: BatchState, counts: BatchCounts) {
    if let Some(status) = status {
        let mut guard = status.write().unwrap_or_else(PoisonError::into_inner);
        guard.state = state;
        guard.counts = counts;
    }
}

/// Submits batches onto background tasks.
#[derive(Clone)]
pub struct BatchRunner {
    extractor: Arc<Extractor>,
    config: BatchConfig,
}

impl BatchRunner {
    #[must_use]
    pub fn new(extractor: Arc<Extractor>, config: BatchConfig) -> Self {
        Self { extractor, config }
    }

    /// Spawns the batch and returns immediately.
    #[must_use]
    pub fn submit(&self, requests: Vec<ExtractionRequest>) -> BatchHandle {
        let batch_id = Uuid::new_v4();
        let status = Arc::new(RwLock::new(BatchStatus {
            batch_id,
            state: BatchState::Queued,
            counts: BatchCounts {
                total: requests.len(),
                ..BatchCounts::default()
            },
        }));

        let extractor = Arc::clone(&self.extractor);
        let config = self.config;
        let live = Arc::clone(&status);
        let task = tokio::spawn(async move {
            run_batch(&extractor, requests, &config, batch_id, Some(&live)).await
        });

        BatchHandle {
            batch_id,
            status,
            task,
        }
    }
}

pub struct BatchHandle {
    batch_id: Uuid,
    status: Arc<RwLock<BatchStatus>>,
    task: JoinHandle<BatchReport>,
}

impl BatchHandle {
    #[must_use]
    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    #[must_use]
    pub fn status(&self) -> BatchStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Waits for the batch to finish.
    ///
    /// # Errors
    ///
    /// Returns the [`JoinError`] if the batch task panicked or was aborted.
    pub async fn join(self) -> Result<BatchReport, JoinError> {
        self.task.await
    }
}
