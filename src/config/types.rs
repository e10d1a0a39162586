use serde::Deserialize;

/// Main configuration structure for Podrank
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub limiter: LimiterConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub render: Option<RenderConfig>,
    pub output: OutputConfig,
    #[serde(default, rename = "target")]
    pub targets: Vec<TargetEntry>,
}

/// Where and how target pages are fetched and read
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Page URL template; `{id}` is replaced by the target's external id
    #[serde(rename = "page-url")]
    pub page_url: String,

    /// Per-request HTTP timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Text that sits next to the subscriber count on the page
    #[serde(rename = "count-marker", default = "default_count_marker")]
    pub count_marker: String,

    /// Smallest count accepted as a real subscriber count
    #[serde(rename = "min-plausible-count", default = "default_min_plausible")]
    pub min_plausible_count: u64,

    /// Counts at or above this are rejected
    #[serde(rename = "max-plausible-count", default = "default_max_plausible")]
    pub max_plausible_count: u64,
}

impl SourceConfig {
    /// Builds the page URL for one target
    pub fn page_url_for(&self, external_id: &str) -> String {
        self.page_url.replace("{id}", external_id)
    }
}

/// Sliding-window admission control
#[derive(Debug, Clone, Deserialize)]
pub struct LimiterConfig {
    #[serde(rename = "max-requests")]
    pub max_requests: usize,

    #[serde(rename = "time-window-secs")]
    pub time_window_secs: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            time_window_secs: 60,
        }
    }
}

/// Randomized delay applied before every request (milliseconds)
#[derive(Debug, Clone, Deserialize)]
pub struct PacingConfig {
    #[serde(rename = "min-delay-ms")]
    pub min_delay_ms: u64,

    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    #[serde(rename = "base-delay-ms")]
    pub base_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 3_000,
            max_delay_ms: 5_000,
            base_delay_ms: 4_000,
        }
    }
}

/// Retry and backoff for a single target
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    #[serde(rename = "initial-delay-ms")]
    pub initial_delay_ms: u64,

    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    #[serde(rename = "backoff-factor")]
    pub backoff_factor: f64,

    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 2_000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

/// How client identities are picked per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RotationStrategy {
    #[default]
    Random,
    RoundRobin,
}

/// Client identity rotation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub strategy: RotationStrategy,

    /// Replaces the built-in profile pool when non-empty
    #[serde(rename = "user-agents", default)]
    pub user_agents: Vec<String>,
}

/// How the target population is split into batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BatchStrategy {
    #[default]
    TimeSliced,
    Cycle,
}

/// Batch partitioning and concurrency
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub strategy: BatchStrategy,

    /// Number of windows per day for the time-sliced strategy
    #[serde(default = "default_partitions")]
    pub partitions: usize,

    /// Days needed to cover the whole population with the cycle strategy
    #[serde(rename = "cycle-length", default = "default_cycle_length")]
    pub cycle_length: u32,

    /// Optional cap on targets crawled per cycle day
    #[serde(rename = "batch-size", default)]
    pub batch_size: Option<usize>,

    #[serde(rename = "max-concurrency", default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Log progress every N finished targets
    #[serde(rename = "progress-every", default = "default_progress_every")]
    pub progress_every: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            strategy: BatchStrategy::TimeSliced,
            partitions: default_partitions(),
            cycle_length: default_cycle_length(),
            batch_size: None,
            max_concurrency: default_max_concurrency(),
            progress_every: default_progress_every(),
        }
    }
}

/// Cron triggers for the daemon (six-field cron, seconds first)
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Trigger for the single daily batch of the cycle strategy
    #[serde(rename = "cycle-cron", default = "default_cycle_cron")]
    pub cycle_cron: String,

    /// Trigger for the daily rank computation
    #[serde(rename = "rank-cron", default = "default_rank_cron")]
    pub rank_cron: String,

    /// The rank job ranks `today - rank-day-offset`
    #[serde(rename = "rank-day-offset", default = "default_rank_day_offset")]
    pub rank_day_offset: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cycle_cron: default_cycle_cron(),
            rank_cron: default_rank_cron(),
            rank_day_offset: default_rank_day_offset(),
        }
    }
}

/// External headless-browser command used before static parsing
#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    /// Executable that prints the rendered DOM of the URL passed as its last argument
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(rename = "timeout-secs", default = "default_render_timeout")]
    pub timeout_secs: u64,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// A tracked target seeded from the config file
#[derive(Debug, Clone, Deserialize)]
pub struct TargetEntry {
    #[serde(rename = "external-id")]
    pub external_id: String,

    pub name: String,

    #[serde(default)]
    pub category: Option<String>,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_count_marker() -> String {
    "已订阅".to_string()
}

fn default_min_plausible() -> u64 {
    1_000
}

fn default_max_plausible() -> u64 {
    100_000_000
}

fn default_true() -> bool {
    true
}

fn default_partitions() -> usize {
    24
}

fn default_cycle_length() -> u32 {
    7
}

fn default_max_concurrency() -> usize {
    5
}

fn default_progress_every() -> usize {
    100
}

fn default_cycle_cron() -> String {
    "0 0 2 * * *".to_string()
}

fn default_rank_cron() -> String {
    "0 30 0 * * *".to_string()
}

fn default_rank_day_offset() -> u32 {
    1
}

fn default_render_timeout() -> u64 {
    30
}
