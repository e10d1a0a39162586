//! Batch execution and the run ledger
//!
//! The orchestrator opens a run, crawls every selected target with bounded
//! concurrency, records successful counts, and always closes the run:
//! - Per-target failures (including panics) are tallied, never propagated
//! - An infrastructure error escapes the batch loop and marks the run failed
//!   with the counts reached so far

use crate::crawler::executor::{CrawlExecutor, CrawlOutcome, FailureReason};
use crate::crawler::recorder::{lock_storage, SharedStorage, SnapshotRecorder};
use crate::storage::{RunOutcome, RunRecord, RunStatus, Storage, StorageResult, Target};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Running totals for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTally {
    pub success: u64,
    pub failure: u64,
}

impl RunTally {
    pub fn finished(&self) -> u64 {
        self.success + self.failure
    }
}

/// Aborts a spawned crawl unit if the batch is abandoned before it finishes
struct UnitHandle(JoinHandle<CrawlOutcome>);

impl Drop for UnitHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs one batch of targets and keeps its run record
pub struct RunOrchestrator<S> {
    executor: Arc<CrawlExecutor>,
    storage: SharedStorage<S>,
    recorder: SnapshotRecorder<S>,
    max_concurrency: usize,
    progress_every: usize,
}

impl<S: Storage + 'static> RunOrchestrator<S> {
    pub fn new(
        executor: Arc<CrawlExecutor>,
        storage: SharedStorage<S>,
        max_concurrency: usize,
        progress_every: usize,
    ) -> Self {
        let recorder = SnapshotRecorder::new(Arc::clone(&storage));
        Self {
            executor,
            storage,
            recorder,
            max_concurrency: max_concurrency.max(1),
            progress_every: progress_every.max(1),
        }
    }

    /// Crawls `targets` for `date` and returns the finalized run
    ///
    /// Only fails if the run cannot be opened or closed.
    pub async fn run(&self, targets: Vec<Target>, date: NaiveDate) -> StorageResult<RunRecord> {
        let total = targets.len() as u64;
        let run_id = lock_storage(&self.storage)?.create_run(total)?;
        tracing::info!(
            run_id,
            %date,
            total,
            max_concurrency = self.max_concurrency,
            "Starting batch run"
        );

        let mut tally = RunTally::default();
        let result = self.execute(run_id, targets, date, &mut tally).await;

        let outcome = match &result {
            Ok(()) => RunOutcome {
                status: RunStatus::Completed,
                success_count: tally.success,
                failure_count: tally.failure,
                error_message: None,
            },
            Err(e) => {
                tracing::error!(run_id, error = %e, "Batch run aborted");
                RunOutcome {
                    status: RunStatus::Failed,
                    success_count: tally.success,
                    failure_count: tally.failure,
                    error_message: Some(e.to_string()),
                }
            }
        };

        let record = lock_storage(&self.storage)?.finish_run(run_id, &outcome)?;

        let limiter = self.executor.limiter().stats();
        tracing::info!(
            run_id,
            status = record.status.to_db_string(),
            success = record.success_count,
            failure = record.failure_count,
            limiter_in_window = limiter.in_window,
            limiter_max = limiter.max_requests,
            "Batch run finished"
        );

        Ok(record)
    }

    async fn execute(
        &self,
        run_id: i64,
        targets: Vec<Target>,
        date: NaiveDate,
        tally: &mut RunTally,
    ) -> StorageResult<()> {
        let total = targets.len();

        let mut units = stream::iter(targets.into_iter().map(|target| {
            let executor = Arc::clone(&self.executor);
            async move {
                let unit_target = target.clone();
                let mut handle = UnitHandle(tokio::spawn(async move {
                    executor.crawl(&unit_target).await
                }));

                let outcome = match (&mut handle.0).await {
                    Ok(outcome) => outcome,
                    Err(e) => CrawlOutcome::Failure {
                        reason: FailureReason::Panicked(e.to_string()),
                        attempts: 0,
                    },
                };
                (target, outcome)
            }
        }))
        .buffer_unordered(self.max_concurrency);

        while let Some((target, outcome)) = units.next().await {
            match outcome {
                CrawlOutcome::Success { count, .. } => {
                    self.recorder.record(target.id, date, count)?;
                    tally.success += 1;
                }
                CrawlOutcome::Failure { reason, attempts } => {
                    if matches!(reason, FailureReason::Panicked(_)) {
                        tracing::error!(
                            run_id,
                            external_id = %target.external_id,
                            %reason,
                            "Crawl unit crashed"
                        );
                    } else {
                        tracing::debug!(
                            run_id,
                            external_id = %target.external_id,
                            attempts,
                            %reason,
                            "Target failed"
                        );
                    }
                    tally.failure += 1;
                }
            }

            if tally.finished() % self.progress_every as u64 == 0 {
                tracing::info!(
                    run_id,
                    "Progress: {}/{} targets, {} ok, {} failed",
                    tally.finished(),
                    total,
                    tally.success,
                    tally.failure
                );
            }
        }

        Ok(())
    }
}
