use crate::config::types::{
    BatchConfig, Config, LimiterConfig, OutputConfig, PacingConfig, RenderConfig, RetryConfig,
    ScheduleConfig, SourceConfig, TargetEntry,
};
use crate::ConfigError;
use std::collections::HashSet;
use tokio_cron_scheduler::Job;
use url::Url;

const MAX_REQUESTS_PER_WINDOW: usize = 100_000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_source_config(&config.source)?;
    validate_limiter_config(&config.limiter)?;
    validate_pacing_config(&config.pacing)?;
    validate_retry_config(&config.retry)?;
    validate_batch_config(&config.batch)?;
    validate_schedule_config(&config.schedule)?;
    if let Some(render) = &config.render {
        validate_render_config(render)?;
    }
    validate_output_config(&config.output)?;
    validate_targets(&config.targets)?;
    Ok(())
}

/// Validates the page source configuration
fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    if !config.page_url.contains("{id}") {
        return Err(ConfigError::Validation(format!(
            "page-url must contain an {{id}} placeholder, got '{}'",
            config.page_url
        )));
    }

    let url = Url::parse(&config.page_url_for("example"))
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid page-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "page-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.count_marker.trim().is_empty() {
        return Err(ConfigError::Validation(
            "count-marker cannot be empty".to_string(),
        ));
    }

    if config.min_plausible_count >= config.max_plausible_count {
        return Err(ConfigError::Validation(format!(
            "min-plausible-count ({}) must be below max-plausible-count ({})",
            config.min_plausible_count, config.max_plausible_count
        )));
    }

    Ok(())
}

/// Validates admission control
fn validate_limiter_config(config: &LimiterConfig) -> Result<(), ConfigError> {
    if config.max_requests < 1 || config.max_requests > MAX_REQUESTS_PER_WINDOW {
        return Err(ConfigError::Validation(format!(
            "max-requests must be between 1 and {}, got {}",
            MAX_REQUESTS_PER_WINDOW, config.max_requests
        )));
    }

    if config.time_window_secs < 1 {
        return Err(ConfigError::Validation(
            "time-window-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates pacing bounds
fn validate_pacing_config(config: &PacingConfig) -> Result<(), ConfigError> {
    if config.min_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "pacing min-delay-ms ({}) exceeds max-delay-ms ({})",
            config.min_delay_ms, config.max_delay_ms
        )));
    }

    if config.base_delay_ms < config.min_delay_ms || config.base_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "pacing base-delay-ms must be between {} and {}, got {}",
            config.min_delay_ms, config.max_delay_ms, config.base_delay_ms
        )));
    }

    Ok(())
}

/// Validates retry policy
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.initial_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "retry initial-delay-ms ({}) exceeds max-delay-ms ({})",
            config.initial_delay_ms, config.max_delay_ms
        )));
    }

    if !config.backoff_factor.is_finite() || config.backoff_factor < 1.0 {
        return Err(ConfigError::Validation(format!(
            "backoff-factor must be >= 1.0, got {}",
            config.backoff_factor
        )));
    }

    Ok(())
}

/// Validates batch partitioning
fn validate_batch_config(config: &BatchConfig) -> Result<(), ConfigError> {
    if config.partitions < 1 || config.partitions > 1440 {
        return Err(ConfigError::Validation(format!(
            "partitions must be between 1 and 1440, got {}",
            config.partitions
        )));
    }

    if config.cycle_length < 1 {
        return Err(ConfigError::Validation(
            "cycle-length must be >= 1".to_string(),
        ));
    }

    if config.batch_size == Some(0) {
        return Err(ConfigError::Validation(
            "batch-size must be >= 1 when set".to_string(),
        ));
    }

    if config.max_concurrency < 1 || config.max_concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "max-concurrency must be between 1 and 100, got {}",
            config.max_concurrency
        )));
    }

    if config.progress_every < 1 {
        return Err(ConfigError::Validation(
            "progress-every must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates cron triggers
fn validate_schedule_config(config: &ScheduleConfig) -> Result<(), ConfigError> {
    validate_cron(&config.cycle_cron)?;
    validate_cron(&config.rank_cron)?;
    Ok(())
}

/// Checks that a cron expression has six fields and parses as a scheduler job
fn validate_cron(expr: &str) -> Result<(), ConfigError> {
    let fields = expr.split_whitespace().count();
    if fields != 6 {
        return Err(ConfigError::InvalidCron(format!(
            "'{}' has {} fields, expected 6 (sec min hour day month weekday)",
            expr, fields
        )));
    }

    Job::new_async(expr, |_uuid, _lock| Box::pin(async {}))
        .map_err(|e| ConfigError::InvalidCron(format!("'{}': {}", expr, e)))?;

    Ok(())
}

/// Validates the render command
fn validate_render_config(config: &RenderConfig) -> Result<(), ConfigError> {
    if config.command.trim().is_empty() {
        return Err(ConfigError::Validation(
            "render command cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "render timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates seeded targets
fn validate_targets(targets: &[TargetEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for entry in targets {
        if entry.external_id.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "target '{}' has an empty external-id",
                entry.name
            )));
        }

        if !seen.insert(entry.external_id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate target external-id '{}'",
                entry.external_id
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_cron() {
        assert!(validate_cron("0 30 0 * * *").is_ok());
        assert!(validate_cron("0 0 2 * * SUN").is_ok());

        assert!(validate_cron("").is_err());
        assert!(validate_cron("30 0 * * *").is_err());
        assert!(validate_cron("0 0 0 0 * * * *").is_err());
    }

    #[test]
    fn test_validate_cron_rejects_unparseable_fields() {
        assert!(matches!(
            validate_cron("x y z q r s"),
            Err(ConfigError::InvalidCron(_))
        ));
        assert!(matches!(
            validate_cron("0 61 25 * * *"),
            Err(ConfigError::InvalidCron(_))
        ));
    }

    #[test]
    fn test_validate_limiter_bounds() {
        let ok = LimiterConfig {
            max_requests: 10,
            time_window_secs: 60,
        };
        assert!(validate_limiter_config(&ok).is_ok());

        let huge = LimiterConfig {
            max_requests: usize::MAX,
            ..ok.clone()
        };
        assert!(matches!(
            validate_limiter_config(&huge),
            Err(ConfigError::Validation(_))
        ));

        let zero = LimiterConfig {
            max_requests: 0,
            ..ok
        };
        assert!(validate_limiter_config(&zero).is_err());
    }

    #[test]
    fn test_validate_pacing_bounds() {
        let ok = PacingConfig {
            min_delay_ms: 100,
            max_delay_ms: 300,
            base_delay_ms: 200,
        };
        assert!(validate_pacing_config(&ok).is_ok());

        let base_outside = PacingConfig {
            base_delay_ms: 400,
            ..ok.clone()
        };
        assert!(validate_pacing_config(&base_outside).is_err());

        let inverted = PacingConfig {
            min_delay_ms: 500,
            ..ok
        };
        assert!(validate_pacing_config(&inverted).is_err());
    }

    #[test]
    fn test_validate_source_requires_placeholder() {
        let mut source = SourceConfig {
            page_url: "https://podcasts.example.com/podcast/{id}".to_string(),
            request_timeout_secs: 30,
            count_marker: "已订阅".to_string(),
            min_plausible_count: 1_000,
            max_plausible_count: 100_000_000,
        };
        assert!(validate_source_config(&source).is_ok());

        source.page_url = "https://podcasts.example.com/podcast/".to_string();
        assert!(validate_source_config(&source).is_err());

        source.page_url = "ftp://podcasts.example.com/{id}".to_string();
        assert!(matches!(
            validate_source_config(&source),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_validate_duplicate_targets() {
        let targets = vec![
            TargetEntry {
                external_id: "a".to_string(),
                name: "A".to_string(),
                category: None,
            },
            TargetEntry {
                external_id: "a".to_string(),
                name: "A again".to_string(),
                category: None,
            },
        ];
        assert!(validate_targets(&targets).is_err());
        assert!(validate_targets(&targets[..1]).is_ok());
    }

    #[test]
    fn test_validate_retry_factor() {
        let mut retry = RetryConfig::default();
        assert!(validate_retry_config(&retry).is_ok());

        retry.backoff_factor = 0.5;
        assert!(validate_retry_config(&retry).is_err());

        retry.backoff_factor = 2.0;
        retry.max_attempts = 0;
        assert!(validate_retry_config(&retry).is_err());
    }
}
