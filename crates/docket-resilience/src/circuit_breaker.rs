// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rolling-window circuit breaker for transactional operations.
//!
//! The breaker counts terminal failures. Once `failure_threshold` failures
//! accumulate within `window` of each other it opens and callers fail fast.
//! The count resets when `window` passes without a new failure, or on any
//! success.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use docket_config::model::CircuitBreakerConfig;
use docket_core::clock::{Clock, SystemClock};

#[derive(Debug, Default)]
struct BreakerState {
    failures: u32,
    last_failure: Option<Instant>,
}

/// Failure-counting breaker. Share it behind an `Arc`.
pub struct CircuitBreaker {
    threshold: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            threshold: config.failure_threshold,
            window: config.window(),
            clock,
            state: Mutex::new(BreakerState::default()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether calls should be rejected without running.
    ///
    /// Expires the failure count first if the window has passed.
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.expire(&mut state);
        state.failures >= self.threshold
    }

    /// Failures counted in the current window.
    pub fn failures(&self) -> u32 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.expire(&mut state);
        state.failures
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.expire(&mut state);
        state.failures = state.failures.saturating_add(1);
        state.last_failure = Some(self.clock.now());
        if state.failures == self.threshold {
            warn!(
                failures = state.failures,
                window = ?self.window,
                "circuit breaker opened"
            );
            docket_prometheus::set_circuit_open(true);
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.failures >= self.threshold {
            info!("circuit breaker closed after success");
        }
        state.failures = 0;
        state.last_failure = None;
        docket_prometheus::set_circuit_open(false);
    }

    fn expire(&self, state: &mut BreakerState) {
        let Some(last) = state.last_failure else {
            return;
        };
        if self.clock.now().saturating_duration_since(last) >= self.window {
            if state.failures >= self.threshold {
                info!(window = ?self.window, "circuit breaker window elapsed, closing");
                docket_prometheus::set_circuit_open(false);
            }
            state.failures = 0;
            state.last_failure = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_core::clock::ManualClock;

    fn breaker() -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = CircuitBreakerConfig {
            failure_threshold: 5,
            window_secs: 60,
        };
        (CircuitBreaker::with_clock(&config, clock.clone()), clock)
    }

    #[test]
    fn opens_at_threshold() {
        let (cb, _clock) = breaker();
        for _ in 0..4 {
            cb.record_failure();
        }
        assert!(!cb.is_open());
        cb.record_failure();
        assert!(cb.is_open());
        assert_eq!(cb.failures(), 5);
    }

    #[test]
    fn window_expiry_closes() {
        let (cb, clock) = breaker();
        for _ in 0..5 {
            cb.record_failure();
        }
        clock.advance(Duration::from_secs(59));
        assert!(cb.is_open());
        clock.advance(Duration::from_secs(1));
        assert!(!cb.is_open());
        assert_eq!(cb.failures(), 0);
    }

    #[test]
    fn failures_spread_beyond_window_do_not_accumulate() {
        let (cb, clock) = breaker();
        for _ in 0..4 {
            cb.record_failure();
        }
        clock.advance(Duration::from_secs(61));
        cb.record_failure();
        assert_eq!(cb.failures(), 1);
        assert!(!cb.is_open());
    }

    #[test]
    fn success_resets_count() {
        let (cb, _clock) = breaker();
        for _ in 0..5 {
            cb.record_failure();
        }
        cb.record_success();
        assert!(!cb.is_open());
        assert_eq!(cb.failures(), 0);
    }
}
