//! Configuration module for Podrank
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use podrank::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("podrank.toml")).unwrap();
//! println!("Crawling in {} windows per day", config.batch.partitions);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BatchConfig, BatchStrategy, Config, IdentityConfig, LimiterConfig, OutputConfig,
    PacingConfig, RenderConfig, RetryConfig, RotationStrategy, ScheduleConfig, SourceConfig,
    TargetEntry,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
