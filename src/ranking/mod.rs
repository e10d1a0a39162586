//! Daily rank computation
//!
//! Runs once per date, after that date's batches have landed. Ranks for a
//! date are replaced as a whole: either every snapshot gets its new ranks
//! or the previous ranks stay in place.

mod calculator;

pub use calculator::{compute_rankings, count_categories};

use crate::storage::{Storage, StorageResult};
use chrono::NaiveDate;

/// What a rank computation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankSummary {
    pub date: NaiveDate,
    /// Snapshots that received a global rank
    pub ranked: usize,
    /// Categories that received category ranks
    pub categories: usize,
}

/// Loads a date's snapshots, ranks them, and stores the ranks atomically
///
/// A date with no snapshots is a no-op. Running twice yields the same ranks.
pub fn compute_and_store<S: Storage + ?Sized>(
    storage: &mut S,
    date: NaiveDate,
) -> StorageResult<RankSummary> {
    let inputs = storage.load_rank_inputs(date)?;

    if inputs.is_empty() {
        tracing::info!(%date, "No snapshots to rank");
        return Ok(RankSummary {
            date,
            ranked: 0,
            categories: 0,
        });
    }

    let assignments = compute_rankings(&inputs);
    storage.apply_ranks(date, &assignments)?;

    let summary = RankSummary {
        date,
        ranked: assignments.len(),
        categories: count_categories(&inputs),
    };

    tracing::info!(
        %date,
        ranked = summary.ranked,
        categories = summary.categories,
        "Ranks computed"
    );

    Ok(summary)
}
