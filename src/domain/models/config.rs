use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main configuration structure for Polity
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Local graph peer configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Bounded read configuration
    #[serde(default)]
    pub reads: ReadConfig,

    /// Retry policy configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Identity resolution configuration
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Entity cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Local hint persistence
    #[serde(default)]
    pub hints: HintConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Local graph peer configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct StoreConfig {
    /// Seed snapshot loaded into the in-memory peer (YAML or JSON)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_path: Option<String>,

    /// Delay between streamed children, simulating replication arrival
    #[serde(default)]
    pub child_delivery_delay_ms: u64,
}

/// Bounded read configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReadConfig {
    /// Default convergence window for one collection read
    #[serde(default = "default_convergence_window_ms")]
    pub convergence_window_ms: u64,

    /// Per-collection overrides keyed by the collection's last path segment
    #[serde(default)]
    pub collection_windows_ms: HashMap<String, u64>,
}

const fn default_convergence_window_ms() -> u64 {
    500
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            convergence_window_ms: default_convergence_window_ms(),
            collection_windows_ms: HashMap::new(),
        }
    }
}

impl ReadConfig {
    pub fn window_for(&self, collection: &str) -> Duration {
        Duration::from_millis(
            self.collection_windows_ms
                .get(collection)
                .copied()
                .unwrap_or(self.convergence_window_ms),
        )
    }
}

/// Backoff schedule between retry attempts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffSchedule {
    /// initial * 2^n
    #[default]
    Exponential,
    /// initial * (n + 1)
    Linear,
    /// initial every time
    Fixed,
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// How delays grow between attempts
    #[serde(default)]
    pub schedule: BackoffSchedule,
}

const fn default_max_attempts() -> u32 {
    2
}

const fn default_initial_backoff_ms() -> u64 {
    250
}

const fn default_max_backoff_ms() -> u64 {
    2_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            schedule: BackoffSchedule::default(),
        }
    }
}

/// Identity resolution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IdentityConfig {
    /// Wait between a mapping repair write and its read-back
    #[serde(default = "default_repair_settle_ms")]
    pub repair_settle_ms: u64,

    /// Read the game's actors when neither mapping nor hint names an actor
    #[serde(default = "default_true")]
    pub scan_collection_on_miss: bool,
}

const fn default_repair_settle_ms() -> u64 {
    150
}

const fn default_true() -> bool {
    true
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            repair_settle_ms: default_repair_settle_ms(),
            scan_collection_on_miss: true,
        }
    }
}

/// Entity cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CacheConfig {
    /// Maximum number of cached entities
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

const fn default_max_capacity() -> u64 {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: default_max_capacity(),
        }
    }
}

/// Local hint persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HintConfig {
    /// JSON file holding one actor hint per game
    #[serde(default = "default_hint_path")]
    pub path: String,
}

fn default_hint_path() -> String {
    ".polity/hints.json".to_string()
}

impl Default for HintConfig {
    fn default() -> Self {
        Self {
            path: default_hint_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// Rotation for file logs: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
