//! Batch partitioning of the target population
//!
//! Two strategies spread the population over time:
//! - Time-sliced: `N` contiguous, order-stable windows per day
//! - Cycle: each target is assigned a fixed day within a `cycle_length`-day cycle
//!   by hashing its external identifier
//!
//! Selection is a pure function of the ordered target list, the date, the
//! window index, and the strategy.

use crate::config::{BatchConfig, BatchStrategy};
use crate::storage::Target;
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors raised when a selection cannot be made
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartitionError {
    #[error("Window {window} is out of range for {partitions} partitions")]
    WindowOutOfRange { window: usize, partitions: usize },

    #[error("Partition count must be at least 1")]
    NoPartitions,

    #[error("Cycle length must be at least 1")]
    EmptyCycle,
}

/// How the population is split
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStrategy {
    TimeSliced {
        partitions: usize,
    },
    Cycle {
        cycle_length: u32,
        batch_size: Option<usize>,
    },
}

impl PartitionStrategy {
    pub fn from_config(config: &BatchConfig) -> Self {
        match config.strategy {
            BatchStrategy::TimeSliced => Self::TimeSliced {
                partitions: config.partitions,
            },
            BatchStrategy::Cycle => Self::Cycle {
                cycle_length: config.cycle_length,
                batch_size: config.batch_size,
            },
        }
    }

    /// Number of windows per day this strategy schedules
    pub fn windows_per_day(&self) -> usize {
        match self {
            Self::TimeSliced { partitions } => *partitions,
            Self::Cycle { .. } => 1,
        }
    }
}

/// Which batch to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionSelector {
    pub date: NaiveDate,
    /// Window index within the day; ignored by the cycle strategy
    pub window: usize,
    pub strategy: PartitionStrategy,
}

impl PartitionSelector {
    pub fn new(date: NaiveDate, window: usize, strategy: PartitionStrategy) -> Self {
        Self {
            date,
            window,
            strategy,
        }
    }

    /// Selects this batch's targets from the full ordered population
    pub fn select(&self, targets: &[Target]) -> Result<Vec<Target>, PartitionError> {
        match self.strategy {
            PartitionStrategy::TimeSliced { partitions } => {
                let range = time_slice_range(targets.len(), partitions, self.window)?;
                Ok(targets[range].to_vec())
            }
            PartitionStrategy::Cycle {
                cycle_length,
                batch_size,
            } => {
                let day = cycle_day(self.date, cycle_length)?;
                let selected = targets
                    .iter()
                    .filter(|t| cycle_slot(&t.external_id, cycle_length) == day)
                    .take(batch_size.unwrap_or(usize::MAX))
                    .cloned()
                    .collect();
                Ok(selected)
            }
        }
    }
}

/// Index range of window `window` when `total` items are split into `partitions`
///
/// Uses `size = ceil(total / partitions)`; trailing windows may be empty.
pub fn time_slice_range(
    total: usize,
    partitions: usize,
    window: usize,
) -> Result<std::ops::Range<usize>, PartitionError> {
    if partitions == 0 {
        return Err(PartitionError::NoPartitions);
    }
    if window >= partitions {
        return Err(PartitionError::WindowOutOfRange { window, partitions });
    }

    let size = total.div_ceil(partitions);
    let start = (window * size).min(total);
    let end = (start + size).min(total);
    Ok(start..end)
}

/// Day of the cycle that `date` falls on
pub fn cycle_day(date: NaiveDate, cycle_length: u32) -> Result<u32, PartitionError> {
    if cycle_length == 0 {
        return Err(PartitionError::EmptyCycle);
    }
    let days = date
        .signed_duration_since(NaiveDate::default())
        .num_days();
    Ok(days.rem_euclid(i64::from(cycle_length)) as u32)
}

/// Cycle day a target is crawled on, stable across processes and restarts
pub fn cycle_slot(external_id: &str, cycle_length: u32) -> u32 {
    let digest = Sha256::digest(external_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) % u64::from(cycle_length.max(1))) as u32
}
