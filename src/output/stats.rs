//! Statistics from the tracker database
//!
//! This module provides functionality for extracting and displaying
//! tracker statistics from the storage layer.

use crate::storage::{RunRecord, Storage};
use crate::PodrankError;
use chrono::NaiveDate;

/// How many recent runs the statistics include
pub const RECENT_RUNS: usize = 10;

/// Tracker statistics summary
#[derive(Debug, Clone)]
pub struct TrackerStatistics {
    /// Total number of tracked targets
    pub total_targets: u64,

    /// Most recent date with at least one snapshot
    pub latest_snapshot_date: Option<NaiveDate>,

    /// Snapshots recorded on the latest date
    pub latest_snapshot_count: u64,

    /// Most recent runs, newest first
    pub recent_runs: Vec<RunRecord>,
}

impl TrackerStatistics {
    /// Share of the population with a snapshot on the latest date
    pub fn latest_coverage(&self) -> f64 {
        if self.total_targets == 0 {
            0.0
        } else {
            (self.latest_snapshot_count as f64 / self.total_targets as f64) * 100.0
        }
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(TrackerStatistics)` - Successfully loaded statistics
/// * `Err(PodrankError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<TrackerStatistics, PodrankError> {
    let total_targets = storage.count_targets()?;
    let latest_snapshot_date = storage.latest_snapshot_date()?;

    let latest_snapshot_count = match latest_snapshot_date {
        Some(date) => storage.count_snapshots(date)?,
        None => 0,
    };

    let recent_runs = storage.recent_runs(RECENT_RUNS)?;

    Ok(TrackerStatistics {
        total_targets,
        latest_snapshot_date,
        latest_snapshot_count,
        recent_runs,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &TrackerStatistics) {
    println!("=== Tracker Statistics ===\n");

    println!("Overview:");
    println!("  Tracked targets: {}", stats.total_targets);
    match stats.latest_snapshot_date {
        Some(date) => println!(
            "  Latest snapshot date: {} ({} snapshots, {:.1}% coverage)",
            date,
            stats.latest_snapshot_count,
            stats.latest_coverage()
        ),
        None => println!("  Latest snapshot date: none"),
    }
    println!();

    if stats.recent_runs.is_empty() {
        println!("No runs recorded yet");
        return;
    }

    println!("Recent Runs ({}):", stats.recent_runs.len());
    for run in &stats.recent_runs {
        println!(
            "  #{} {} [{}] {}/{} succeeded, {} failed",
            run.id,
            run.started_at,
            run.status.to_db_string(),
            run.success_count,
            run.total_targets,
            run.failure_count
        );
        if let Some(message) = &run.error_message {
            println!("      error: {}", message);
        }
    }
}
