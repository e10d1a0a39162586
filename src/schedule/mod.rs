//! Cron-driven triggering of crawl and rank jobs
//!
//! The job list is derived once from configuration. Time-sliced batching
//! spreads one crawl job per window evenly over the day; cycle batching runs
//! a single daily crawl. Both also register a daily rank job.

use crate::config::{BatchStrategy, Config};
use crate::crawler::CrawlService;
use crate::storage::Storage;
use crate::Result;
use chrono::{Days, NaiveDate};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};

const MINUTES_PER_DAY: usize = 24 * 60;

/// What a scheduled trigger runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// One time-sliced window of today's population
    CrawlWindow { window: usize },
    /// Today's slot of the multi-day cycle
    CrawlCycle,
    /// Ranks for `today - rank-day-offset`
    ComputeRanks,
}

/// A cron trigger paired with its job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledJob {
    /// Six-field cron expression (seconds first)
    pub trigger: String,
    pub kind: JobKind,
}

/// Owns the job list and, once started, the running cron scheduler
pub struct Scheduler {
    jobs: Vec<ScheduledJob>,
    max_concurrency: usize,
    rank_day_offset: u32,
    running: Option<JobScheduler>,
}

impl Scheduler {
    pub fn from_config(config: &Config) -> Self {
        let mut jobs = match config.batch.strategy {
            BatchStrategy::TimeSliced => (0..config.batch.partitions)
                .map(|window| ScheduledJob {
                    trigger: window_trigger(window, config.batch.partitions),
                    kind: JobKind::CrawlWindow { window },
                })
                .collect(),
            BatchStrategy::Cycle => vec![ScheduledJob {
                trigger: config.schedule.cycle_cron.clone(),
                kind: JobKind::CrawlCycle,
            }],
        };

        jobs.push(ScheduledJob {
            trigger: config.schedule.rank_cron.clone(),
            kind: JobKind::ComputeRanks,
        });

        Self {
            jobs,
            max_concurrency: config.batch.max_concurrency,
            rank_day_offset: config.schedule.rank_day_offset,
            running: None,
        }
    }

    pub fn jobs(&self) -> &[ScheduledJob] {
        &self.jobs
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Registers every job against `service` and starts the cron scheduler
    ///
    /// Job failures are logged; they never stop the scheduler.
    pub async fn start<S>(&mut self, service: Arc<CrawlService<S>>) -> Result<()>
    where
        S: Storage + 'static,
    {
        let scheduler = JobScheduler::new().await?;

        for scheduled in &self.jobs {
            let service = Arc::clone(&service);
            let kind = scheduled.kind;
            let max_concurrency = self.max_concurrency;
            let rank_day_offset = self.rank_day_offset;

            let job = Job::new_async(scheduled.trigger.as_str(), move |_uuid, _lock| {
                let service = Arc::clone(&service);
                Box::pin(async move {
                    run_job(&service, kind, max_concurrency, rank_day_offset).await;
                })
            })?;

            scheduler.add(job).await?;
            tracing::debug!(trigger = %scheduled.trigger, ?kind, "Registered job");
        }

        scheduler.start().await?;
        tracing::info!(jobs = self.jobs.len(), "Scheduler started");

        self.running = Some(scheduler);
        Ok(())
    }

    /// Stops the cron scheduler; a no-op if it was never started
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(mut scheduler) = self.running.take() {
            scheduler.shutdown().await?;
            tracing::info!("Scheduler stopped");
        }
        Ok(())
    }
}

/// Cron trigger for window `window` of `partitions`, at minute `window * 1440 / partitions`
pub fn window_trigger(window: usize, partitions: usize) -> String {
    let minute = window * MINUTES_PER_DAY / partitions.max(1);
    format!("0 {} {} * * *", minute % 60, minute / 60)
}

/// The date a rank job started on `today` should rank
pub fn rank_date(today: NaiveDate, offset: u32) -> NaiveDate {
    today
        .checked_sub_days(Days::new(u64::from(offset)))
        .unwrap_or(today)
}

async fn run_job<S: Storage + 'static>(
    service: &CrawlService<S>,
    kind: JobKind,
    max_concurrency: usize,
    rank_day_offset: u32,
) {
    let today = crate::today();

    match kind {
        JobKind::CrawlWindow { window } => {
            tracing::info!(window, "scheduler: starting crawl window");
            match service
                .run_cycle(service.selector(today, window), max_concurrency)
                .await
            {
                Ok(run) => tracing::info!(
                    run_id = run.id,
                    status = run.status.to_db_string(),
                    "scheduler: crawl window finished"
                ),
                Err(e) => tracing::error!(window, error = %e, "scheduler: crawl window failed"),
            }
        }
        JobKind::CrawlCycle => {
            tracing::info!("scheduler: starting cycle crawl");
            match service
                .run_cycle(service.selector(today, 0), max_concurrency)
                .await
            {
                Ok(run) => tracing::info!(
                    run_id = run.id,
                    status = run.status.to_db_string(),
                    "scheduler: cycle crawl finished"
                ),
                Err(e) => tracing::error!(error = %e, "scheduler: cycle crawl failed"),
            }
        }
        JobKind::ComputeRanks => {
            let date = rank_date(today, rank_day_offset);
            if let Err(e) = service.compute_ranks(date) {
                tracing::error!(%date, error = %e, "scheduler: rank computation failed");
            }
        }
    }
}
