// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Docket bot.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use docket_core::datastore::{ReadConcern, TransactionOptions, WriteConcern};
use serde::{Deserialize, Serialize};

/// Top-level Docket configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DocketConfig {
    /// Bot identity and logging.
    #[serde(default)]
    pub bot: BotConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Per-actor admission throttle.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Operation queue settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Datastore transaction guarantees.
    #[serde(default)]
    pub transaction: TransactionConfig,

    /// Retry policy for transactional operations.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Circuit breaker guarding the datastore.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Compensation (rollback) settings.
    #[serde(default)]
    pub rollback: RollbackConfig,

    /// Prometheus metrics settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

/// Bot identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    /// Display name used in logs.
    #[serde(default = "default_bot_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_bot_name() -> String {
    "docket".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("docket").join("docket.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("docket.db"))
        .display()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// Per-actor rate limiting.
///
/// An actor must wait `min_interval_ms` between accepted actions and may not
/// exceed `max_actions` within a rolling `window_secs` window.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    #[serde(default = "default_max_actions")]
    pub max_actions: u32,

    /// How often stale actor entries are swept.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl RateLimitConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            window_secs: default_window_secs(),
            max_actions: default_max_actions(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_min_interval_ms() -> u64 {
    1000
}

fn default_window_secs() -> u64 {
    60
}

fn default_max_actions() -> u32 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    300
}

/// Operation queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Deadline for each queued operation, measured from enqueue.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// Maximum number of pending operations before submissions are refused.
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

impl QueueConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: default_operation_timeout_ms(),
            max_pending: default_max_pending(),
        }
    }
}

fn default_operation_timeout_ms() -> u64 {
    30_000
}

fn default_max_pending() -> usize {
    1000
}

/// Datastore transaction configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransactionConfig {
    #[serde(default)]
    pub read_concern: ReadConcern,

    #[serde(default)]
    pub write_concern: WriteConcern,

    /// Upper bound on server-side commit time.
    #[serde(default = "default_max_commit_time_ms")]
    pub max_commit_time_ms: u64,

    /// Commit attempts for transient commit failures.
    #[serde(default = "default_commit_max_attempts")]
    pub commit_max_attempts: u32,

    /// Base delay between commit attempts, doubled per attempt.
    #[serde(default = "default_commit_base_delay_ms")]
    pub commit_base_delay_ms: u64,
}

impl TransactionConfig {
    pub fn options(&self) -> TransactionOptions {
        TransactionOptions {
            read_concern: self.read_concern,
            write_concern: self.write_concern,
            max_commit_time: Duration::from_millis(self.max_commit_time_ms),
        }
    }

    pub fn commit_base_delay(&self) -> Duration {
        Duration::from_millis(self.commit_base_delay_ms)
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            read_concern: ReadConcern::default(),
            write_concern: WriteConcern::default(),
            max_commit_time_ms: default_max_commit_time_ms(),
            commit_max_attempts: default_commit_max_attempts(),
            commit_base_delay_ms: default_commit_base_delay_ms(),
        }
    }
}

fn default_max_commit_time_ms() -> u64 {
    30_000
}

fn default_commit_max_attempts() -> u32 {
    3
}

fn default_commit_base_delay_ms() -> u64 {
    100
}

/// Retry policy for transactional operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Fraction of the delay used as +/- random jitter (0.0 - 1.0).
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Double the delay after every failed attempt.
    #[serde(default = "default_exponential_backoff")]
    pub exponential_backoff: bool,

    /// Hard timeout applied to every attempt.
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_max_attempts(),
            base_delay_ms: default_retry_base_delay_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
            jitter: default_jitter(),
            exponential_backoff: default_exponential_backoff(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
        }
    }
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    5_000
}

fn default_jitter() -> f64 {
    0.1
}

fn default_exponential_backoff() -> bool {
    true
}

fn default_attempt_timeout_ms() -> u64 {
    30_000
}

/// Circuit breaker guarding the datastore.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CircuitBreakerConfig {
    /// Failures within the window that open the breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_breaker_window_secs")]
    pub window_secs: u64,
}

impl CircuitBreakerConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            window_secs: default_breaker_window_secs(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_breaker_window_secs() -> u64 {
    60
}

/// Compensation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RollbackConfig {
    /// Base delay between compensation retries, doubled per attempt.
    #[serde(default = "default_rollback_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Number of rollback results retained for inspection.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Persist compensation outcomes so retried rollbacks skip applied actions.
    #[serde(default = "default_ledger_enabled")]
    pub ledger_enabled: bool,
}

impl RollbackConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_rollback_base_delay_ms(),
            history_capacity: default_history_capacity(),
            ledger_enabled: default_ledger_enabled(),
        }
    }
}

fn default_rollback_base_delay_ms() -> u64 {
    1_000
}

fn default_history_capacity() -> usize {
    500
}

fn default_ledger_enabled() -> bool {
    true
}

/// Prometheus metrics configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    /// Install the Prometheus recorder at startup.
    #[serde(default)]
    pub enabled: bool,
}
