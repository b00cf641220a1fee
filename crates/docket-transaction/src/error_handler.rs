// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry loop and terminal-failure handling for transactional operations.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use docket_core::traits::Datastore;
use docket_core::types::OperationContext;
use docket_core::DocketError;
use docket_resilience::{CircuitBreaker, RetryPolicy};

use crate::classify::{classify_error, TransactionErrorInfo};
use crate::rollback::{RollbackResult, RollbackService};
use crate::unit_of_work::UnitOfWork;

/// What [`TransactionErrorHandler::execute_with_retry`] observed.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub outcome: Result<T, DocketError>,
    /// Times the operation was invoked. Zero when the breaker was open.
    pub attempts: u32,
    /// Wall time including backoff sleeps.
    pub duration: Duration,
    pub was_retried: bool,
    /// Classification of the most recent failure.
    pub classification: Option<TransactionErrorInfo>,
}

impl<T> RetryOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Everything known about a terminal transaction failure.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionFailureReport {
    pub classification: TransactionErrorInfo,
    pub rollback: RollbackResult,
    /// Operator hints, from the classification.
    pub recovery_actions: Vec<String>,
    /// Short reason suitable for the end user.
    pub user_message: String,
}

/// Retries, circuit breaking and rollback delegation.
pub struct TransactionErrorHandler {
    policy: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
    rollback: Arc<RollbackService>,
}

impl TransactionErrorHandler {
    pub fn new(
        policy: RetryPolicy,
        breaker: Arc<CircuitBreaker>,
        rollback: Arc<RollbackService>,
    ) -> Self {
        Self {
            policy,
            breaker,
            rollback,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn rollback_service(&self) -> &Arc<RollbackService> {
        &self.rollback
    }

    pub fn classify_error(&self, error: &DocketError) -> TransactionErrorInfo {
        classify_error(error)
    }

    /// Run `op` until it succeeds, fails permanently or exhausts its attempts.
    ///
    /// Each attempt is bounded by the policy's attempt timeout. An open
    /// breaker fails the call without invoking `op`.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        mut op: F,
        name: &str,
        ctx: &OperationContext,
    ) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DocketError>>,
    {
        let started = Instant::now();
        let mut attempts = 0u32;
        let mut classification = None;

        loop {
            if self.breaker.is_open() {
                let err = DocketError::CircuitOpen {
                    failures: self.breaker.failures(),
                    window: self.breaker.window(),
                };
                warn!(operation = name, attempts, "circuit breaker open, rejecting attempt");
                docket_prometheus::record_transaction_attempt(name, "rejected");
                return self.finish(name, Err(err), attempts, started, classification);
            }

            attempts += 1;
            let result = match tokio::time::timeout(self.policy.attempt_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(DocketError::Timeout {
                    duration: self.policy.attempt_timeout,
                }),
            };

            let err = match result {
                Ok(value) => {
                    self.breaker.record_success();
                    docket_prometheus::record_transaction_attempt(name, "ok");
                    if attempts > 1 {
                        info!(operation = name, attempts, "operation succeeded after retry");
                    }
                    return self.finish(name, Ok(value), attempts, started, classification);
                }
                Err(e) => e,
            };

            let info = classify_error(&err);
            let allowed = info.allowed_attempts(self.policy.max_attempts);
            if !info.retryable || attempts >= allowed {
                self.breaker.record_failure();
                docket_prometheus::record_transaction_attempt(name, "failed");
                error!(
                    operation = name,
                    tenant_id = ?ctx.tenant_id,
                    actor_id = ?ctx.actor_id,
                    attempts,
                    severity = %info.severity,
                    error = %err,
                    "operation failed"
                );
                return self.finish(name, Err(err), attempts, started, Some(info));
            }

            let delay = self.policy.delay_for(attempts, info.retry_delay);
            docket_prometheus::record_transaction_attempt(name, "retry");
            warn!(
                operation = name,
                attempt = attempts,
                allowed,
                ?delay,
                error = %err,
                "transient failure, retrying"
            );
            classification = Some(info);
            tokio::time::sleep(delay).await;
        }
    }

    /// Classify a terminal failure and roll back its unit of work.
    pub async fn handle_transaction_error<D: Datastore>(
        &self,
        error: &DocketError,
        uow: &mut UnitOfWork<D>,
        name: &str,
        ctx: &OperationContext,
    ) -> TransactionFailureReport {
        let classification = classify_error(error);
        let rollback_ctx = self
            .rollback
            .create_rollback_context(uow.id(), name, ctx, error.to_string())
            .with_classification(classification.clone());
        let rollback = self.rollback.perform_rollback(uow, &rollback_ctx).await;

        let recovery_actions: Vec<String> = classification
            .recovery_actions
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        error!(
            transaction_id = %rollback.transaction_id,
            operation = name,
            severity = %classification.severity,
            description = classification.description,
            rollback_succeeded = rollback.success,
            recovery = ?recovery_actions,
            "transaction failed"
        );

        TransactionFailureReport {
            user_message: error.user_message(),
            classification,
            rollback,
            recovery_actions,
        }
    }

    fn finish<T>(
        &self,
        name: &str,
        outcome: Result<T, DocketError>,
        attempts: u32,
        started: Instant,
        classification: Option<TransactionErrorInfo>,
    ) -> RetryOutcome<T> {
        let duration = started.elapsed();
        docket_prometheus::record_transaction_duration(name, duration);
        debug!(operation = name, attempts, ?duration, ok = outcome.is_ok(), "retry loop finished");
        RetryOutcome {
            outcome,
            attempts,
            duration,
            was_retried: attempts > 1,
            classification,
        }
    }
}
