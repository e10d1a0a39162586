//! Pure rank assignment
//!
//! Global ranks order every snapshot of a date by count, highest first.
//! Category ranks apply the same order within each category; snapshots
//! whose target has no category get no category rank. Equal counts keep
//! their input order, so ranks are always a dense `1..=K` sequence.

use crate::storage::{RankAssignment, RankInput};
use std::collections::HashMap;

/// Assigns global and per-category ranks
///
/// The output is in global rank order.
pub fn compute_rankings(inputs: &[RankInput]) -> Vec<RankAssignment> {
    let mut ordered: Vec<&RankInput> = inputs.iter().collect();
    // Vec::sort_by is stable: ties stay in input order.
    ordered.sort_by(|a, b| b.subscriber_count.cmp(&a.subscriber_count));

    let mut next_in_category: HashMap<&str, u32> = HashMap::new();

    ordered
        .into_iter()
        .enumerate()
        .map(|(index, input)| {
            let category_rank = input.category.as_deref().map(|category| {
                let next = next_in_category.entry(category).or_insert(0);
                *next += 1;
                *next
            });

            RankAssignment {
                snapshot_id: input.snapshot_id,
                global_rank: index as u32 + 1,
                category_rank,
            }
        })
        .collect()
}

/// Number of distinct categories among the inputs
pub fn count_categories(inputs: &[RankInput]) -> usize {
    let mut seen: Vec<&str> = inputs.iter().filter_map(|i| i.category.as_deref()).collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(snapshot_id: i64, category: Option<&str>, count: u64) -> RankInput {
        RankInput {
            snapshot_id,
            external_id: format!("t{}", snapshot_id),
            category: category.map(str::to_string),
            subscriber_count: count,
        }
    }

    fn global_by_snapshot(ranks: &[RankAssignment]) -> HashMap<i64, u32> {
        ranks.iter().map(|r| (r.snapshot_id, r.global_rank)).collect()
    }

    #[test]
    fn test_ties_keep_input_order() {
        let inputs = vec![
            input(1, None, 500),
            input(2, None, 500),
            input(3, None, 300),
            input(4, None, 100),
        ];

        let ranks = global_by_snapshot(&compute_rankings(&inputs));
        assert_eq!(ranks[&1], 1);
        assert_eq!(ranks[&2], 2);
        assert_eq!(ranks[&3], 3);
        assert_eq!(ranks[&4], 4);
    }

    #[test]
    fn test_global_ranks_are_dense() {
        let inputs = vec![
            input(1, None, 10),
            input(2, None, 40),
            input(3, None, 20),
            input(4, None, 30),
        ];

        let ranks = compute_rankings(&inputs);
        let mut global: Vec<u32> = ranks.iter().map(|r| r.global_rank).collect();
        global.sort_unstable();
        assert_eq!(global, vec![1, 2, 3, 4]);
        assert_eq!(ranks[0].snapshot_id, 2);
    }

    #[test]
    fn test_category_ranks_are_isolated() {
        let inputs = vec![
            input(1, Some("news"), 900),
            input(2, Some("comedy"), 800),
            input(3, Some("news"), 700),
            input(4, None, 650),
            input(5, Some("comedy"), 600),
            input(6, Some("news"), 100),
        ];

        let ranks = compute_rankings(&inputs);
        let by_id: HashMap<i64, Option<u32>> = ranks
            .iter()
            .map(|r| (r.snapshot_id, r.category_rank))
            .collect();

        assert_eq!(by_id[&1], Some(1));
        assert_eq!(by_id[&3], Some(2));
        assert_eq!(by_id[&6], Some(3));
        assert_eq!(by_id[&2], Some(1));
        assert_eq!(by_id[&5], Some(2));
        assert_eq!(by_id[&4], None);

        // Removing one category does not disturb the other's ranks.
        let news_only: Vec<RankInput> = inputs
            .iter()
            .filter(|i| i.category.as_deref() == Some("news"))
            .cloned()
            .collect();
        let news_ranks: HashMap<i64, Option<u32>> = compute_rankings(&news_only)
            .iter()
            .map(|r| (r.snapshot_id, r.category_rank))
            .collect();
        for id in [1, 3, 6] {
            assert_eq!(news_ranks[&id], by_id[&id]);
        }
    }

    #[test]
    fn test_uncategorized_still_ranked_globally() {
        let inputs = vec![input(1, None, 5), input(2, Some("news"), 1)];
        let ranks = compute_rankings(&inputs);

        assert_eq!(ranks[0].snapshot_id, 1);
        assert_eq!(ranks[0].global_rank, 1);
        assert_eq!(ranks[0].category_rank, None);
        assert_eq!(ranks[1].category_rank, Some(1));
    }

    #[test]
    fn test_empty_input() {
        assert!(compute_rankings(&[]).is_empty());
        assert_eq!(count_categories(&[]), 0);
    }

    #[test]
    fn test_count_categories() {
        let inputs = vec![
            input(1, Some("news"), 1),
            input(2, Some("news"), 2),
            input(3, Some("comedy"), 3),
            input(4, None, 4),
        ];
        assert_eq!(count_categories(&inputs), 2);
    }
}
