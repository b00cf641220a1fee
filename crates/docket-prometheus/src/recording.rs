// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics. Without an installed recorder every call is a
//! no-op, which is what unit tests rely on.

use std::time::Duration;

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all Docket metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "docket_admission_total",
        "Admission decisions by outcome (accepted, rate_limited)"
    );
    describe_gauge!("docket_rate_limit_tracked_actors", "Actors with live rate-limit entries");
    describe_gauge!("docket_queue_depth", "Operations waiting in the queue");
    describe_counter!(
        "docket_queue_operations_total",
        "Queued operations by final state"
    );
    describe_histogram!(
        "docket_queue_wait_seconds",
        "Time from enqueue until an operation starts running"
    );
    describe_counter!(
        "docket_transaction_attempts_total",
        "Transactional attempts by outcome"
    );
    describe_histogram!(
        "docket_transaction_duration_seconds",
        "Wall time of a transactional operation including retries"
    );
    describe_gauge!("docket_circuit_open", "1 while the datastore circuit breaker is open");
    describe_counter!(
        "docket_compensations_total",
        "Compensation actions by outcome (applied, failed, skipped)"
    );
    describe_counter!("docket_rollbacks_total", "Rollbacks by overall result");
}

/// Record an admission decision.
pub fn record_admission(outcome: &'static str) {
    metrics::counter!("docket_admission_total", "outcome" => outcome).increment(1);
}

/// Set the number of actors tracked by the rate limiter.
pub fn set_tracked_actors(count: usize) {
    metrics::gauge!("docket_rate_limit_tracked_actors").set(count as f64);
}

/// Set the number of pending queued operations.
pub fn set_queue_depth(depth: usize) {
    metrics::gauge!("docket_queue_depth").set(depth as f64);
}

/// Record the final state of a queued operation.
pub fn record_queue_outcome(state: &'static str) {
    metrics::counter!("docket_queue_operations_total", "state" => state).increment(1);
}

/// Record how long an operation waited before running.
pub fn record_queue_wait(wait: Duration) {
    metrics::histogram!("docket_queue_wait_seconds").record(wait.as_secs_f64());
}

/// Record one transactional attempt.
pub fn record_transaction_attempt(operation: &str, outcome: &'static str) {
    metrics::counter!(
        "docket_transaction_attempts_total",
        "operation" => operation.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record the duration of a transactional operation.
pub fn record_transaction_duration(operation: &str, duration: Duration) {
    metrics::histogram!(
        "docket_transaction_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Flag the circuit breaker state.
pub fn set_circuit_open(open: bool) {
    metrics::gauge!("docket_circuit_open").set(if open { 1.0 } else { 0.0 });
}

/// Record a compensation outcome.
pub fn record_compensation(outcome: &'static str) {
    metrics::counter!("docket_compensations_total", "outcome" => outcome).increment(1);
}

/// Record a finished rollback.
pub fn record_rollback(success: bool) {
    let result = if success { "success" } else { "partial" };
    metrics::counter!("docket_rollbacks_total", "result" => result).increment(1);
}
