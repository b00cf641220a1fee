// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-zero windows, ordered delay bounds, and jitter fractions.

use crate::diagnostic::ConfigError;
use crate::model::DocketConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &DocketConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.bot.log_level.as_str()) {
        fail(format!(
            "bot.log_level must be one of {}, got `{}`",
            LOG_LEVELS.join(", "),
            config.bot.log_level
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    // Rate limiting
    let rl = &config.rate_limit;
    if rl.window_secs == 0 {
        fail("rate_limit.window_secs must be greater than 0".to_string());
    }
    if rl.max_actions == 0 {
        fail("rate_limit.max_actions must be at least 1".to_string());
    }
    if rl.min_interval() >= rl.window() && rl.window_secs > 0 {
        fail(format!(
            "rate_limit.min_interval_ms ({}) must be shorter than rate_limit.window_secs ({}s)",
            rl.min_interval_ms, rl.window_secs
        ));
    }
    if rl.sweep_interval_secs == 0 {
        fail("rate_limit.sweep_interval_secs must be greater than 0".to_string());
    }

    // Queue
    if config.queue.operation_timeout_ms == 0 {
        fail("queue.operation_timeout_ms must be greater than 0".to_string());
    }
    if config.queue.max_pending == 0 {
        fail("queue.max_pending must be at least 1".to_string());
    }

    // Transactions
    if config.transaction.max_commit_time_ms == 0 {
        fail("transaction.max_commit_time_ms must be greater than 0".to_string());
    }
    if config.transaction.commit_max_attempts == 0 {
        fail("transaction.commit_max_attempts must be at least 1".to_string());
    }

    // Retry policy
    let retry = &config.retry;
    if retry.max_attempts == 0 {
        fail("retry.max_attempts must be at least 1".to_string());
    }
    if retry.base_delay_ms > retry.max_delay_ms {
        fail(format!(
            "retry.base_delay_ms ({}) must not exceed retry.max_delay_ms ({})",
            retry.base_delay_ms, retry.max_delay_ms
        ));
    }
    if !(0.0..=1.0).contains(&retry.jitter) {
        fail(format!(
            "retry.jitter must be between 0.0 and 1.0, got {}",
            retry.jitter
        ));
    }
    if retry.attempt_timeout_ms == 0 {
        fail("retry.attempt_timeout_ms must be greater than 0".to_string());
    }

    if config.circuit_breaker.failure_threshold == 0 {
        fail("circuit_breaker.failure_threshold must be at least 1".to_string());
    }
    if config.circuit_breaker.window_secs == 0 {
        fail("circuit_breaker.window_secs must be greater than 0".to_string());
    }

    if config.rollback.history_capacity == 0 {
        fail("rollback.history_capacity must be at least 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(config: &DocketConfig) -> Vec<String> {
        match validate_config(config) {
            Ok(()) => vec![],
            Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&DocketConfig::default()).is_ok());
    }

    #[test]
    fn zero_window_rejected() {
        let mut config = DocketConfig::default();
        config.rate_limit.window_secs = 0;
        let msgs = messages(&config);
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].contains("rate_limit.window_secs"));
    }

    #[test]
    fn min_interval_longer_than_window_rejected() {
        let mut config = DocketConfig::default();
        config.rate_limit.min_interval_ms = 120_000;
        let msgs = messages(&config);
        assert!(msgs.iter().any(|m| m.contains("min_interval_ms")));
    }

    #[test]
    fn jitter_out_of_range_rejected() {
        let mut config = DocketConfig::default();
        config.retry.jitter = 1.5;
        assert!(messages(&config).iter().any(|m| m.contains("retry.jitter")));
    }

    #[test]
    fn collects_every_error() {
        let mut config = DocketConfig::default();
        config.retry.max_attempts = 0;
        config.circuit_breaker.failure_threshold = 0;
        config.queue.max_pending = 0;
        config.bot.log_level = "loud".into();
        assert_eq!(messages(&config).len(), 4);
    }

    #[test]
    fn base_delay_above_max_rejected() {
        let mut config = DocketConfig::default();
        config.retry.base_delay_ms = 10_000;
        config.retry.max_delay_ms = 1_000;
        assert!(messages(&config).iter().any(|m| m.contains("retry.base_delay_ms")));
    }
}
