//! Storage module for persisting tracker data
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Target registry and metadata
//! - Idempotent daily snapshots and their ranks
//! - Run ledger

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::PodrankError;
use chrono::NaiveDate;

use std::path::Path;

/// Date format used for snapshot dates in the database
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(PodrankError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, PodrankError> {
    SqliteStorage::new(path)
}

/// A tracked target
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub id: i64,
    pub external_id: String,
    pub name: String,
    pub category: Option<String>,
    pub metadata: TargetMetadata,
    pub created_at: String,
    pub updated_at: String,
}

/// Descriptive fields refreshed from the target's page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetMetadata {
    pub title: Option<String>,
    pub feed_url: Option<String>,
    pub cover_url: Option<String>,
    pub description: Option<String>,
}

impl TargetMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.feed_url.is_none()
            && self.cover_url.is_none()
            && self.description.is_none()
    }
}

/// A target to insert or update by external id
#[derive(Debug, Clone)]
pub struct NewTarget {
    pub external_id: String,
    pub name: String,
    pub category: Option<String>,
}

/// One dated observation of a target's count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub id: i64,
    pub target_id: i64,
    pub snapshot_date: NaiveDate,
    pub subscriber_count: u64,
    pub global_rank: Option<u32>,
    pub category_rank: Option<u32>,
    pub created_at: String,
}

/// A snapshot joined with its target, as needed for ranking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankInput {
    pub snapshot_id: i64,
    pub external_id: String,
    pub category: Option<String>,
    pub subscriber_count: u64,
}

/// Ranks to persist for one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankAssignment {
    pub snapshot_id: i64,
    pub global_rank: u32,
    pub category_rank: Option<u32>,
}

/// Represents a batch crawl run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: RunStatus,
    pub total_targets: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub error_message: Option<String>,
}

/// Final tallies written when a run ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub success_count: u64,
    pub failure_count: u64,
    pub error_message: Option<String>,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}
