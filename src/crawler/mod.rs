//! Crawler module for daily subscriber-count collection
//!
//! This module contains the crawl orchestration layer, including:
//! - Page fetching and optional rendering
//! - Count and metadata extraction
//! - Single-target execution with throttling and retries
//! - Batch partitioning across the day or a multi-day cycle
//! - Bounded-concurrency batch runs and the run ledger

mod executor;
mod fetcher;
mod orchestrator;
mod parser;
mod partition;
mod recorder;

pub use executor::{CrawlExecutor, CrawlOutcome, CrawlSource, FailureReason};
pub use fetcher::{
    build_http_client, CommandRenderer, FetchError, FetchedPage, HttpFetcher, PageFetcher,
    PageRenderer,
};
pub use orchestrator::{RunOrchestrator, RunTally};
pub use parser::{parse_metadata, CountExtractor, MarkerCountExtractor};
pub use partition::{
    cycle_day, cycle_slot, time_slice_range, PartitionError, PartitionSelector,
    PartitionStrategy,
};
pub use recorder::{lock_storage, SharedStorage, SnapshotRecorder};

use crate::config::Config;
use crate::ranking::{self, RankSummary};
use crate::storage::{NewTarget, RunRecord, SqliteStorage, Storage, Target};
use crate::throttle::{AdmissionController, IdentityRotator, PacingPolicy, RetryPolicy};
use crate::Result;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Outcome of a metadata refresh pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub attempted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Entry point tying configuration, storage, and the crawl pipeline together
pub struct CrawlService<S = SqliteStorage> {
    config: Arc<Config>,
    storage: SharedStorage<S>,
    executor: Arc<CrawlExecutor>,
}

impl CrawlService<SqliteStorage> {
    /// Opens the configured database and builds the HTTP pipeline
    pub fn from_config(config: Config) -> Result<Self> {
        let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
        let fetcher = Arc::new(HttpFetcher::from_config(&config.source)?);
        let renderer: Option<Arc<dyn PageRenderer>> = match &config.render {
            Some(render) => Some(Arc::new(CommandRenderer::from_config(render))),
            None => None,
        };

        Self::new(config, storage, fetcher, renderer)
    }
}

impl<S: Storage + 'static> CrawlService<S> {
    /// Builds the service and upserts the configured seed targets
    pub fn new(
        config: Config,
        storage: S,
        fetcher: Arc<dyn PageFetcher>,
        renderer: Option<Arc<dyn PageRenderer>>,
    ) -> Result<Self> {
        let extractor = MarkerCountExtractor::from_config(&config.source).map_err(|e| {
            crate::ConfigError::Validation(format!("Invalid count-marker pattern: {}", e))
        })?;

        let executor = CrawlExecutor::new(
            config.source.clone(),
            fetcher,
            renderer,
            Arc::new(extractor),
            AdmissionController::from_config(&config.limiter),
            PacingPolicy::from_config(&config.pacing),
            IdentityRotator::from_config(&config.identity),
            RetryPolicy::from_config(&config.retry),
        );

        let service = Self {
            config: Arc::new(config),
            storage: Arc::new(Mutex::new(storage)),
            executor: Arc::new(executor),
        };

        let seeded = service.seed_targets()?;
        if seeded > 0 {
            tracing::info!("Seeded {} targets from configuration", seeded);
        }

        Ok(service)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &SharedStorage<S> {
        &self.storage
    }

    pub fn executor(&self) -> &Arc<CrawlExecutor> {
        &self.executor
    }

    /// The configured partition strategy
    pub fn strategy(&self) -> PartitionStrategy {
        PartitionStrategy::from_config(&self.config.batch)
    }

    /// Selector for the configured strategy
    pub fn selector(&self, date: NaiveDate, window: usize) -> PartitionSelector {
        PartitionSelector::new(date, window, self.strategy())
    }

    /// Upserts every `[[target]]` entry by external id
    pub fn seed_targets(&self) -> Result<usize> {
        let mut storage = lock_storage(&self.storage)?;
        for entry in &self.config.targets {
            storage.upsert_target(&NewTarget {
                external_id: entry.external_id.clone(),
                name: entry.name.clone(),
                category: entry.category.clone(),
            })?;
        }
        Ok(self.config.targets.len())
    }

    /// Loads the full target population in stable order
    pub fn load_targets(&self) -> Result<Vec<Target>> {
        Ok(lock_storage(&self.storage)?.load_targets()?)
    }

    /// Crawls the batch chosen by `selector` and returns its finalized run
    pub async fn run_cycle(
        &self,
        selector: PartitionSelector,
        max_concurrency: usize,
    ) -> Result<RunRecord> {
        let population = self.load_targets()?;
        let batch = selector.select(&population)?;

        tracing::info!(
            date = %selector.date,
            window = selector.window,
            selected = batch.len(),
            population = population.len(),
            "Selected batch"
        );

        let orchestrator = RunOrchestrator::new(
            Arc::clone(&self.executor),
            Arc::clone(&self.storage),
            max_concurrency,
            self.config.batch.progress_every,
        );

        Ok(orchestrator.run(batch, selector.date).await?)
    }

    /// Computes and stores global and per-category ranks for `date`
    pub fn compute_ranks(&self, date: NaiveDate) -> Result<RankSummary> {
        let mut storage = lock_storage(&self.storage)?;
        Ok(ranking::compute_and_store(&mut *storage, date)?)
    }

    /// Re-reads title, feed, cover, and description from target pages
    ///
    /// Uses the same admission control, pacing, identities, and retries as
    /// count crawling. Pages are fetched with the configured concurrency.
    pub async fn refresh_metadata(&self, limit: Option<usize>) -> Result<RefreshSummary> {
        let mut targets = self.load_targets()?;
        if let Some(limit) = limit {
            targets.truncate(limit);
        }

        let mut summary = RefreshSummary {
            attempted: targets.len(),
            ..Default::default()
        };

        let executor = &self.executor;
        let mut pages = stream::iter(targets.into_iter().map(|target| async move {
            let body = executor.fetch_body(&target).await;
            (target, body)
        }))
        .buffer_unordered(self.config.batch.max_concurrency.max(1));

        while let Some((target, body)) = pages.next().await {
            let metadata = match body {
                Ok(body) => parse_metadata(&body),
                Err(reason) => {
                    tracing::warn!(
                        external_id = %target.external_id,
                        %reason,
                        "Metadata fetch failed"
                    );
                    summary.failed += 1;
                    continue;
                }
            };

            if metadata.is_empty() {
                tracing::debug!(external_id = %target.external_id, "No metadata on page");
                summary.unchanged += 1;
                continue;
            }

            if lock_storage(&self.storage)?.update_target_metadata(target.id, &metadata)? {
                summary.updated += 1;
            } else {
                summary.unchanged += 1;
            }
        }

        tracing::info!(
            attempted = summary.attempted,
            updated = summary.updated,
            failed = summary.failed,
            "Metadata refresh finished"
        );

        Ok(summary)
    }
}
