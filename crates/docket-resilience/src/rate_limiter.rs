// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-actor admission throttle.
//!
//! Each actor gets two limits: a minimum spacing between accepted actions
//! and a ceiling on accepted actions per rolling window. Denied calls never
//! count against the window and never move the spacing reference point.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use docket_config::model::RateLimitConfig;
use docket_core::clock::{Clock, SystemClock};
use docket_core::types::ActorId;

/// Result of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
    last_action: Instant,
}

/// Read-only view of an actor's current rate-limit state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitInfo {
    /// Accepted actions in the current window.
    pub count: u32,
    /// Accepted actions still available in the current window.
    pub remaining: u32,
    /// Time until the current window resets.
    pub resets_in: Duration,
    /// Time since the last accepted action.
    pub since_last_action: Duration,
}

/// Per-actor rate limiter backed by a concurrent map.
pub struct RateLimiter {
    entries: DashMap<ActorId, RateLimitEntry>,
    min_interval: Duration,
    window: Duration,
    max_actions: u32,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter on the system clock.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a limiter on an injected clock.
    pub fn with_clock(config: &RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            min_interval: config.min_interval(),
            window: config.window(),
            max_actions: config.max_actions,
            clock,
        }
    }

    /// Check whether `actor` may act now, recording the action if so.
    pub fn check_rate_limit(&self, actor: &ActorId) -> RateDecision {
        let now = self.clock.now();

        let mut entry = match self.entries.entry(actor.clone()) {
            Entry::Occupied(occupied) => occupied.into_ref(),
            Entry::Vacant(vacant) => {
                vacant.insert(RateLimitEntry {
                    count: 1,
                    window_start: now,
                    last_action: now,
                });
                docket_prometheus::set_tracked_actors(self.entries.len());
                return RateDecision::Allowed;
            }
        };

        let since_last = now.saturating_duration_since(entry.last_action);
        if since_last < self.min_interval {
            let retry_after = self.min_interval - since_last;
            debug!(actor = %actor, ?retry_after, "denied: minimum interval");
            return RateDecision::Denied { retry_after };
        }

        let window_age = now.saturating_duration_since(entry.window_start);
        if window_age >= self.window {
            entry.count = 1;
            entry.window_start = now;
            entry.last_action = now;
            return RateDecision::Allowed;
        }

        if entry.count >= self.max_actions {
            let retry_after = self.window - window_age;
            debug!(actor = %actor, count = entry.count, ?retry_after, "denied: window ceiling");
            return RateDecision::Denied { retry_after };
        }

        entry.count += 1;
        entry.last_action = now;
        RateDecision::Allowed
    }

    /// Forget everything about one actor.
    pub fn reset_user_rate_limit(&self, actor: &ActorId) {
        if self.entries.remove(actor).is_some() {
            info!(actor = %actor, "rate limit reset");
        }
    }

    /// Forget every actor.
    pub fn clear_all_rate_limits(&self) {
        let cleared = self.entries.len();
        self.entries.clear();
        docket_prometheus::set_tracked_actors(0);
        info!(cleared, "all rate limits cleared");
    }

    /// Snapshot of an actor's state, or `None` if the actor is untracked.
    pub fn get_user_rate_limit_info(&self, actor: &ActorId) -> Option<RateLimitInfo> {
        let now = self.clock.now();
        let entry = *self.entries.get(actor)?;
        let window_age = now.saturating_duration_since(entry.window_start);

        // A lapsed window reads as fresh even before the next check resets it.
        let (count, resets_in) = if window_age >= self.window {
            (0, Duration::ZERO)
        } else {
            (entry.count, self.window - window_age)
        };

        Some(RateLimitInfo {
            count,
            remaining: self.max_actions.saturating_sub(count),
            resets_in,
            since_last_action: now.saturating_duration_since(entry.last_action),
        })
    }

    /// Drop entries idle for more than two windows. Returns how many were removed.
    pub fn sweep_stale(&self) -> usize {
        let now = self.clock.now();
        let horizon = self.window * 2;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.last_action) <= horizon);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "swept stale rate-limit entries");
        }
        docket_prometheus::set_tracked_actors(self.entries.len());
        removed
    }

    /// Number of actors currently tracked.
    pub fn tracked_actors(&self) -> usize {
        self.entries.len()
    }

    /// Spawn a task calling [`sweep_stale`](Self::sweep_stale) every `interval`
    /// until `cancel` fires.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep_stale();
                    }
                    _ = cancel.cancelled() => {
                        debug!("rate-limit sweeper shutting down");
                        break;
                    }
                }
            }
        })
    }
}
