// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admission control and failure-handling primitives for Docket.
//!
//! - [`RateLimiter`]: per-actor spacing and rolling-window ceiling.
//! - [`OperationQueue`]: priority-aware, single-flight execution with
//!   per-operation timeouts.
//! - [`AdmissionGate`]: the two combined, used by command handlers.
//! - [`CircuitBreaker`] and [`RetryPolicy`]: building blocks for the
//!   transaction error handler.

pub mod admission;
pub mod circuit_breaker;
pub mod queue;
pub mod rate_limiter;
pub mod retry;

pub use admission::AdmissionGate;
pub use circuit_breaker::CircuitBreaker;
pub use queue::{OperationPriority, OperationQueue, OperationSnapshot, OperationState, QueueStatus};
pub use rate_limiter::{RateDecision, RateLimitInfo, RateLimiter};
pub use retry::RetryPolicy;
