//! Output module for reporting tracker state
//!
//! This module handles:
//! - Loading target, snapshot, and run statistics from storage
//! - Printing them for the `stats` command

pub mod stats;

pub use stats::{load_statistics, print_statistics, TrackerStatistics};
