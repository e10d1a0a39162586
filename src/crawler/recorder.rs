//! Idempotent snapshot recording

use crate::storage::{SnapshotRecord, Storage, StorageError, StorageResult};
use chrono::NaiveDate;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage shared between the orchestrator, the service, and scheduled jobs
pub type SharedStorage<S> = Arc<Mutex<S>>;

/// Locks shared storage, surfacing poisoning as a storage error
pub fn lock_storage<S>(storage: &SharedStorage<S>) -> StorageResult<MutexGuard<'_, S>> {
    storage.lock().map_err(|_| StorageError::LockPoisoned)
}

/// Writes one snapshot per (target, date)
pub struct SnapshotRecorder<S> {
    storage: SharedStorage<S>,
}

impl<S> Clone for SnapshotRecorder<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<S: Storage> SnapshotRecorder<S> {
    pub fn new(storage: SharedStorage<S>) -> Self {
        Self { storage }
    }

    /// Records `count` for (target, date)
    ///
    /// A second call for the same pair overwrites the count and clears the
    /// date's ranks for that target.
    pub fn record(
        &self,
        target_id: i64,
        date: NaiveDate,
        count: u64,
    ) -> StorageResult<SnapshotRecord> {
        let snapshot = lock_storage(&self.storage)?.upsert_snapshot(target_id, date, count)?;
        tracing::trace!(target_id, %date, count, "Recorded snapshot");
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{NewTarget, SqliteStorage};

    #[test]
    fn test_record_twice_keeps_one_row() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let target_id = storage
            .upsert_target(&NewTarget {
                external_id: "abc".to_string(),
                name: "ABC".to_string(),
                category: None,
            })
            .unwrap();

        let shared = Arc::new(Mutex::new(storage));
        let recorder = SnapshotRecorder::new(Arc::clone(&shared));
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        let first = recorder.record(target_id, day, 1_000).unwrap();
        let second = recorder.record(target_id, day, 1_250).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.subscriber_count, 1_250);
        assert_eq!(second.global_rank, None);
        assert_eq!(shared.lock().unwrap().count_snapshots(day).unwrap(), 1);
    }

    #[test]
    fn test_record_unknown_target_fails() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        let recorder = SnapshotRecorder::new(Arc::new(Mutex::new(storage)));
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        assert!(recorder.record(999, day, 1_000).is_err());
    }
}
