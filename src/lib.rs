//! Podrank: a daily subscriber-count tracker
//!
//! This crate crawls a fixed population of targets once per day from a
//! rate-limit-sensitive source, records one snapshot per target per day,
//! and derives global and per-category rankings from each day's snapshots.

pub mod config;
pub mod crawler;
pub mod output;
pub mod ranking;
pub mod schedule;
pub mod storage;
pub mod throttle;

use thiserror::Error;

/// Main error type for Podrank operations
#[derive(Debug, Error)]
pub enum PodrankError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),

    #[error("Partition error: {0}")]
    Partition(#[from] crawler::PartitionError),

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),
}

/// Result type alias for Podrank operations
pub type Result<T> = std::result::Result<T, PodrankError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Parses a `YYYY-MM-DD` calendar date
pub fn parse_date(value: &str) -> Result<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| PodrankError::InvalidDate(value.to_string()))
}

/// Today's date in UTC
pub fn today() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive()
}

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlService, PartitionSelector, PartitionStrategy};
pub use ranking::RankSummary;
pub use schedule::Scheduler;
pub use throttle::{AdmissionController, IdentityRotator, PacingPolicy, RetryPolicy};
