// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Front door for command handlers: throttle, then queue.

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use docket_core::types::{ActorId, TenantId};
use docket_core::DocketError;

use crate::queue::OperationQueue;
use crate::rate_limiter::{RateDecision, RateLimiter};

/// Combines the per-actor [`RateLimiter`] with the [`OperationQueue`].
#[derive(Clone)]
pub struct AdmissionGate {
    limiter: Arc<RateLimiter>,
    queue: OperationQueue,
}

impl AdmissionGate {
    pub fn new(limiter: Arc<RateLimiter>, queue: OperationQueue) -> Self {
        Self { limiter, queue }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn queue(&self) -> &OperationQueue {
        &self.queue
    }

    /// Run `op` for `actor` if the actor is within its limits.
    ///
    /// Throttled actors get [`DocketError::RateLimited`] and `op` never runs.
    pub async fn submit<T, F, Fut>(
        &self,
        actor: ActorId,
        tenant: TenantId,
        privileged: bool,
        op: F,
    ) -> Result<T, DocketError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, DocketError>> + Send + 'static,
    {
        if let RateDecision::Denied { retry_after } = self.limiter.check_rate_limit(&actor) {
            debug!(actor_id = %actor, tenant_id = %tenant, ?retry_after, "submission throttled");
            docket_prometheus::record_admission("rate_limited");
            return Err(DocketError::RateLimited { retry_after });
        }

        match self.queue.enqueue(op, actor, tenant, privileged).await {
            Err(e) if e.is_admission() => {
                docket_prometheus::record_admission(match e {
                    DocketError::QueueFull { .. } => "queue_full",
                    DocketError::QueueTimeout { .. } => "queue_timeout",
                    _ => "queue_cleared",
                });
                Err(e)
            }
            other => {
                docket_prometheus::record_admission("admitted");
                other
            }
        }
    }
}
