// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backoff schedule for retried transactional operations.

use std::time::Duration;

use rand::Rng;

use docket_config::model::RetryConfig;

/// Attempt budget and delay schedule built from `[retry]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay added or removed at random, `0.0..=1.0`.
    pub jitter: f64,
    pub exponential_backoff: bool,
    /// Hard limit on a single attempt.
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            jitter: config.jitter,
            exponential_backoff: config.exponential_backoff,
            attempt_timeout: config.attempt_timeout(),
        }
    }

    /// Delay before the attempt following failed attempt `attempt` (1-based).
    ///
    /// Starts from the larger of the base delay and the error's suggested
    /// delay, doubles per attempt when exponential, caps at `max_delay`
    /// and finally applies jitter.
    pub fn delay_for(&self, attempt: u32, suggested: Duration) -> Duration {
        let capped = self.backoff(attempt, suggested);
        if !self.jitter.is_finite() || self.jitter <= 0.0 {
            return capped;
        }
        let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        capped.mul_f64((1.0 + spread).max(0.0))
    }

    /// The delay before jitter is applied.
    pub fn backoff(&self, attempt: u32, suggested: Duration) -> Duration {
        let start = self.base_delay.max(suggested);
        let scaled = if self.exponential_backoff {
            let exp = attempt.saturating_sub(1).min(31);
            start.saturating_mul(1u32 << exp)
        } else {
            start
        };
        scaled.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: f64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            jitter,
            exponential_backoff: true,
            attempt_timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn doubles_and_caps() {
        let p = policy(0.0);
        assert_eq!(p.delay_for(1, Duration::ZERO), Duration::from_millis(100));
        assert_eq!(p.delay_for(2, Duration::ZERO), Duration::from_millis(200));
        assert_eq!(p.delay_for(3, Duration::ZERO), Duration::from_millis(400));
        assert_eq!(p.delay_for(5, Duration::ZERO), Duration::from_millis(1000));
        assert_eq!(p.delay_for(40, Duration::ZERO), Duration::from_millis(1000));
    }

    #[test]
    fn suggested_delay_wins_when_larger() {
        let p = policy(0.0);
        assert_eq!(
            p.delay_for(1, Duration::from_millis(250)),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn linear_when_not_exponential() {
        let mut p = policy(0.0);
        p.exponential_backoff = false;
        assert_eq!(p.delay_for(4, Duration::ZERO), Duration::from_millis(100));
    }

    #[test]
    fn jitter_stays_in_band() {
        let p = policy(0.1);
        for _ in 0..200 {
            let d = p.delay_for(2, Duration::ZERO);
            assert!(d >= Duration::from_millis(179) && d <= Duration::from_millis(221), "{d:?}");
        }
    }

    #[test]
    fn non_finite_jitter_is_ignored() {
        for jitter in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let p = policy(jitter);
            assert_eq!(p.delay_for(2, Duration::ZERO), Duration::from_millis(200));
        }
    }
}
