//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{
    NewTarget, RankAssignment, RankInput, RunOutcome, RunRecord, RunStatus, SnapshotRecord,
    Target, TargetMetadata,
};
use chrono::NaiveDate;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Run {run_id} is already {status:?}")]
    InvalidRunTransition { run_id: i64, status: RunStatus },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Writes take `&mut self`; callers that share a backend across tasks wrap
/// it in a mutex and never hold the guard across an await point.
pub trait Storage: Send {
    // ===== Targets =====

    /// Inserts a target or updates its name and category by external id
    ///
    /// # Returns
    ///
    /// The internal id of the target
    fn upsert_target(&mut self, target: &NewTarget) -> StorageResult<i64>;

    /// Gets a target by internal id
    fn get_target(&self, target_id: i64) -> StorageResult<Target>;

    /// Gets a target by its external identifier
    fn get_target_by_external_id(&self, external_id: &str) -> StorageResult<Option<Target>>;

    /// Loads every target ordered by internal id
    ///
    /// The ordering is stable across calls, which the partitioner relies on.
    fn load_targets(&self) -> StorageResult<Vec<Target>>;

    /// Merges refreshed metadata into a target
    ///
    /// Fields that are `None` in `metadata` are left untouched.
    ///
    /// # Returns
    ///
    /// `true` if any stored field changed
    fn update_target_metadata(
        &mut self,
        target_id: i64,
        metadata: &TargetMetadata,
    ) -> StorageResult<bool>;

    /// Counts tracked targets
    fn count_targets(&self) -> StorageResult<u64>;

    // ===== Snapshots =====

    /// Records the count for (target, date)
    ///
    /// Overwrites the count and clears both ranks if a snapshot already exists.
    fn upsert_snapshot(
        &mut self,
        target_id: i64,
        date: NaiveDate,
        subscriber_count: u64,
    ) -> StorageResult<SnapshotRecord>;

    /// Gets the snapshot for (target, date), if any
    fn get_snapshot(&self, target_id: i64, date: NaiveDate)
        -> StorageResult<Option<SnapshotRecord>>;

    /// Loads a date's snapshots with their target's category
    ///
    /// Ordered by target external id so ties rank deterministically.
    fn load_rank_inputs(&self, date: NaiveDate) -> StorageResult<Vec<RankInput>>;

    /// Replaces all ranks for a date in one transaction
    fn apply_ranks(&mut self, date: NaiveDate, ranks: &[RankAssignment]) -> StorageResult<()>;

    /// Counts snapshots recorded for a date
    fn count_snapshots(&self, date: NaiveDate) -> StorageResult<u64>;

    /// Most recent date with at least one snapshot
    fn latest_snapshot_date(&self) -> StorageResult<Option<NaiveDate>>;

    // ===== Run Ledger =====

    /// Creates a running run for a batch of `total_targets`
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, total_targets: u64) -> StorageResult<i64>;

    /// Moves a running run to its terminal status
    ///
    /// Fails with [`StorageError::InvalidRunTransition`] if the run already ended.
    fn finish_run(&mut self, run_id: i64, outcome: &RunOutcome) -> StorageResult<RunRecord>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent runs, newest first
    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>>;
}
