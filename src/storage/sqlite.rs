//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    NewTarget, RankAssignment, RankInput, RunOutcome, RunRecord, RunStatus, SnapshotRecord,
    Target, TargetMetadata, DATE_FORMAT,
};
use crate::PodrankError;
use chrono::{NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const TARGET_COLUMNS: &str = "id, external_id, name, category, title, feed_url, cover_url,
     description, created_at, updated_at";

const SNAPSHOT_COLUMNS: &str =
    "id, target_id, snapshot_date, subscriber_count, global_rank, category_rank, created_at";

const RUN_COLUMNS: &str = "id, started_at, completed_at, status, total_targets, success_count,
     failure_count, error_message";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(PodrankError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, PodrankError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self, PodrankError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn date_to_db(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn date_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn count_to_db(count: u64) -> StorageResult<i64> {
    i64::try_from(count).map_err(|_| {
        StorageError::ConstraintViolation(format!("count {} does not fit in SQLite", count))
    })
}

fn target_from_row(row: &Row<'_>) -> rusqlite::Result<Target> {
    Ok(Target {
        id: row.get(0)?,
        external_id: row.get(1)?,
        name: row.get(2)?,
        category: row.get(3)?,
        metadata: TargetMetadata {
            title: row.get(4)?,
            feed_url: row.get(5)?,
            cover_url: row.get(6)?,
            description: row.get(7)?,
        },
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<SnapshotRecord> {
    Ok(SnapshotRecord {
        id: row.get(0)?,
        target_id: row.get(1)?,
        snapshot_date: date_from_row(row, 2)?,
        subscriber_count: row.get::<_, i64>(3)? as u64,
        global_rank: row.get(4)?,
        category_rank: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        completed_at: row.get(2)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(3)?).unwrap_or(RunStatus::Failed),
        total_targets: row.get::<_, i64>(4)? as u64,
        success_count: row.get::<_, i64>(5)? as u64,
        failure_count: row.get::<_, i64>(6)? as u64,
        error_message: row.get(7)?,
    })
}

/// Keeps the stored value unless a refreshed one is present
fn merge_field(stored: &Option<String>, refreshed: &Option<String>) -> Option<String> {
    refreshed.clone().or_else(|| stored.clone())
}

impl Storage for SqliteStorage {
    // ===== Targets =====

    fn upsert_target(&mut self, target: &NewTarget) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO targets (external_id, name, category, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(external_id) DO UPDATE SET
                 name = excluded.name,
                 category = excluded.category,
                 updated_at = excluded.updated_at",
            params![target.external_id, target.name, target.category, now],
        )?;

        let id = self.conn.query_row(
            "SELECT id FROM targets WHERE external_id = ?1",
            params![target.external_id],
            |row| row.get(0),
        )?;

        Ok(id)
    }

    fn get_target(&self, target_id: i64) -> StorageResult<Target> {
        let sql = format!("SELECT {} FROM targets WHERE id = ?1", TARGET_COLUMNS);
        self.conn
            .query_row(&sql, params![target_id], target_from_row)
            .optional()?
            .ok_or_else(|| StorageError::TargetNotFound(format!("Target ID {}", target_id)))
    }

    fn get_target_by_external_id(&self, external_id: &str) -> StorageResult<Option<Target>> {
        let sql = format!("SELECT {} FROM targets WHERE external_id = ?1", TARGET_COLUMNS);
        let target = self
            .conn
            .query_row(&sql, params![external_id], target_from_row)
            .optional()?;
        Ok(target)
    }

    fn load_targets(&self) -> StorageResult<Vec<Target>> {
        let sql = format!("SELECT {} FROM targets ORDER BY id", TARGET_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let targets = stmt
            .query_map([], target_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(targets)
    }

    fn update_target_metadata(
        &mut self,
        target_id: i64,
        metadata: &TargetMetadata,
    ) -> StorageResult<bool> {
        let stored = self.get_target(target_id)?.metadata;
        let merged = TargetMetadata {
            title: merge_field(&stored.title, &metadata.title),
            feed_url: merge_field(&stored.feed_url, &metadata.feed_url),
            cover_url: merge_field(&stored.cover_url, &metadata.cover_url),
            description: merge_field(&stored.description, &metadata.description),
        };

        if merged == stored {
            return Ok(false);
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE targets
             SET title = ?1, feed_url = ?2, cover_url = ?3, description = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                merged.title,
                merged.feed_url,
                merged.cover_url,
                merged.description,
                now,
                target_id
            ],
        )?;

        Ok(true)
    }

    fn count_targets(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM targets", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Snapshots =====

    fn upsert_snapshot(
        &mut self,
        target_id: i64,
        date: NaiveDate,
        subscriber_count: u64,
    ) -> StorageResult<SnapshotRecord> {
        let now = Utc::now().to_rfc3339();
        let date_str = date_to_db(date);

        self.conn.execute(
            "INSERT INTO snapshots (target_id, snapshot_date, subscriber_count, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(target_id, snapshot_date) DO UPDATE SET
                 subscriber_count = excluded.subscriber_count,
                 global_rank = NULL,
                 category_rank = NULL",
            params![target_id, date_str, count_to_db(subscriber_count)?, now],
        )?;

        self.get_snapshot(target_id, date)?.ok_or_else(|| {
            StorageError::Database(format!(
                "snapshot for target {} on {} vanished after upsert",
                target_id, date_str
            ))
        })
    }

    fn get_snapshot(
        &self,
        target_id: i64,
        date: NaiveDate,
    ) -> StorageResult<Option<SnapshotRecord>> {
        let sql = format!(
            "SELECT {} FROM snapshots WHERE target_id = ?1 AND snapshot_date = ?2",
            SNAPSHOT_COLUMNS
        );
        let snapshot = self
            .conn
            .query_row(&sql, params![target_id, date_to_db(date)], snapshot_from_row)
            .optional()?;
        Ok(snapshot)
    }

    fn load_rank_inputs(&self, date: NaiveDate) -> StorageResult<Vec<RankInput>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, t.external_id, t.category, s.subscriber_count
             FROM snapshots s
             JOIN targets t ON t.id = s.target_id
             WHERE s.snapshot_date = ?1
             ORDER BY t.external_id",
        )?;

        let inputs = stmt
            .query_map(params![date_to_db(date)], |row| {
                Ok(RankInput {
                    snapshot_id: row.get(0)?,
                    external_id: row.get(1)?,
                    category: row.get(2)?,
                    subscriber_count: row.get::<_, i64>(3)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(inputs)
    }

    fn apply_ranks(&mut self, date: NaiveDate, ranks: &[RankAssignment]) -> StorageResult<()> {
        let date_str = date_to_db(date);
        let tx = self.conn.transaction()?;

        tx.execute(
            "UPDATE snapshots SET global_rank = NULL, category_rank = NULL
             WHERE snapshot_date = ?1",
            params![date_str],
        )?;

        {
            let mut stmt = tx.prepare(
                "UPDATE snapshots SET global_rank = ?1, category_rank = ?2
                 WHERE id = ?3 AND snapshot_date = ?4",
            )?;

            for rank in ranks {
                let updated = stmt.execute(params![
                    rank.global_rank,
                    rank.category_rank,
                    rank.snapshot_id,
                    date_str
                ])?;

                if updated == 0 {
                    // Dropping the transaction rolls back every rank written so far.
                    return Err(StorageError::ConstraintViolation(format!(
                        "snapshot {} is not dated {}",
                        rank.snapshot_id, date_str
                    )));
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn count_snapshots(&self, date: NaiveDate) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM snapshots WHERE snapshot_date = ?1",
            params![date_to_db(date)],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn latest_snapshot_date(&self) -> StorageResult<Option<NaiveDate>> {
        let latest: Option<String> =
            self.conn
                .query_row("SELECT MAX(snapshot_date) FROM snapshots", [], |row| {
                    row.get(0)
                })?;

        latest
            .map(|raw| {
                NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| {
                    StorageError::Database(format!("bad snapshot date '{}': {}", raw, e))
                })
            })
            .transpose()
    }

    // ===== Run Ledger =====

    fn create_run(&mut self, total_targets: u64) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, status, total_targets) VALUES (?1, ?2, ?3)",
            params![
                now,
                RunStatus::Running.to_db_string(),
                count_to_db(total_targets)?
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(&mut self, run_id: i64, outcome: &RunOutcome) -> StorageResult<RunRecord> {
        if !outcome.status.is_terminal() {
            return Err(StorageError::InvalidRunTransition {
                run_id,
                status: RunStatus::Running,
            });
        }

        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs
             SET status = ?1, completed_at = ?2, success_count = ?3, failure_count = ?4,
                 error_message = ?5
             WHERE id = ?6 AND status = ?7",
            params![
                outcome.status.to_db_string(),
                now,
                count_to_db(outcome.success_count)?,
                count_to_db(outcome.failure_count)?,
                outcome.error_message,
                run_id,
                RunStatus::Running.to_db_string()
            ],
        )?;

        if updated == 0 {
            let existing = self.get_run(run_id)?;
            return Err(StorageError::InvalidRunTransition {
                run_id,
                status: existing.status,
            });
        }

        self.get_run(run_id)
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let sql = format!("SELECT {} FROM runs ORDER BY id DESC LIMIT ?1", RUN_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let runs = stmt
            .query_map(params![limit as i64], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }
}
