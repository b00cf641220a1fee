// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Compensating actions for side effects a datastore rollback cannot undo.
//!
//! A transaction registers compensations as it performs external effects
//! (granting a role, posting a message). When the transaction fails,
//! [`RollbackService::perform_rollback`] aborts the datastore transaction and
//! then runs the plan, highest priority first. A failing compensation is
//! recorded and the plan continues.
//!
//! With a [`CompensationLedger`] attached, each outcome is recorded under
//! (transaction id, action id) and compensations already applied are
//! skipped on later rollbacks of the same transaction.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use docket_config::model::RollbackConfig;
use docket_core::traits::{CompensationLedger, Datastore, LedgerStatus};
use docket_core::types::{ActorId, OperationContext, TenantId, TransactionId};
use docket_core::DocketError;

use crate::classify::TransactionErrorInfo;
use crate::unit_of_work::UnitOfWork;

type CompensationFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), DocketError>> + Send + Sync>;

/// An undo step for an external side effect.
///
/// The executor may run more than once across rollbacks of the same
/// transaction, so it must be idempotent.
#[derive(Clone)]
pub struct CompensationAction {
    pub id: String,
    pub description: String,
    /// Higher runs first.
    pub priority: i32,
    pub retryable: bool,
    /// Attempts for a retryable action.
    pub max_attempts: u32,
    execute: CompensationFn,
}

impl CompensationAction {
    pub fn new<F, Fut>(id: impl Into<String>, execute: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), DocketError>> + Send + 'static,
    {
        let id = id.into();
        Self {
            description: id.clone(),
            id,
            priority: 0,
            retryable: true,
            max_attempts: 3,
            execute: Arc::new(move || execute().boxed()),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Mark the action as single-shot.
    pub fn non_retryable(mut self) -> Self {
        self.retryable = false;
        self
    }

    fn attempt_budget(&self) -> u32 {
        if self.retryable {
            self.max_attempts.max(1)
        } else {
            1
        }
    }
}

impl fmt::Debug for CompensationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompensationAction")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("priority", &self.priority)
            .field("retryable", &self.retryable)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

/// Why and for whom a rollback runs.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackContext {
    pub transaction_id: TransactionId,
    pub operation: String,
    pub tenant_id: Option<TenantId>,
    pub actor_id: Option<ActorId>,
    pub reason: String,
    /// How the originating failure was classified, when known.
    pub classification: Option<TransactionErrorInfo>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl RollbackContext {
    pub fn with_classification(mut self, classification: TransactionErrorInfo) -> Self {
        self.classification = Some(classification);
        self
    }
}

/// A compensation that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompensationFailure {
    pub action_id: String,
    pub attempts: u32,
    pub message: String,
}

/// Outcome of one rollback.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackResult {
    pub transaction_id: TransactionId,
    /// True when no compensation failed.
    pub success: bool,
    /// Ids of compensations that ran to success, in execution order.
    pub compensations_executed: Vec<String>,
    /// Ids of compensations that exhausted their attempts.
    pub compensations_failed: Vec<String>,
    /// Already applied by an earlier rollback, per the ledger.
    pub compensations_skipped: u32,
    pub errors: Vec<CompensationFailure>,
    pub duration: Duration,
}

#[derive(Default)]
struct History {
    order: VecDeque<TransactionId>,
    results: HashMap<TransactionId, Vec<RollbackResult>>,
}

/// Counts running rollbacks per transaction.
type InFlight = Mutex<HashMap<TransactionId, usize>>;

/// Holds one in-flight count for a transaction and releases it when the
/// rollback ends, including on cancellation.
struct InFlightGuard<'a> {
    counts: &'a InFlight,
    id: TransactionId,
}

impl<'a> InFlightGuard<'a> {
    fn enter(counts: &'a InFlight, id: TransactionId) -> Self {
        *counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.clone())
            .or_insert(0) += 1;
        Self { counts, id }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = counts.get_mut(&self.id) {
            *count -= 1;
            if *count == 0 {
                counts.remove(&self.id);
            }
        }
    }
}

/// Holds compensation plans per transaction and executes them on failure.
pub struct RollbackService {
    base_delay: Duration,
    history_capacity: usize,
    plans: Mutex<HashMap<TransactionId, Vec<CompensationAction>>>,
    history: Mutex<History>,
    in_flight: InFlight,
    ledger: Option<Arc<dyn CompensationLedger>>,
}

impl RollbackService {
    pub fn new(config: &RollbackConfig) -> Self {
        Self {
            base_delay: config.base_delay(),
            history_capacity: config.history_capacity.max(1),
            plans: Mutex::new(HashMap::new()),
            history: Mutex::new(History::default()),
            in_flight: Mutex::new(HashMap::new()),
            ledger: None,
        }
    }

    /// Record compensation outcomes in `ledger`.
    pub fn with_ledger(mut self, ledger: Arc<dyn CompensationLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Add `action` to the plan for `transaction_id`.
    ///
    /// Re-registering an action id replaces the earlier action in place, so
    /// retried attempts of one transaction do not duplicate the plan.
    pub fn register_compensation_action(
        &self,
        transaction_id: &TransactionId,
        action: CompensationAction,
    ) {
        let mut plans = self.plans.lock().unwrap_or_else(PoisonError::into_inner);
        let plan = plans.entry(transaction_id.clone()).or_default();
        match plan.iter_mut().find(|a| a.id == action.id) {
            Some(existing) => *existing = action,
            None => {
                debug!(
                    transaction_id = %transaction_id,
                    action_id = %action.id,
                    priority = action.priority,
                    "compensation registered"
                );
                plan.push(action);
            }
        }
    }

    /// Number of compensations registered for `transaction_id`.
    pub fn planned_actions(&self, transaction_id: &TransactionId) -> usize {
        self.plans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(transaction_id)
            .map_or(0, Vec::len)
    }

    /// Drop the compensation plan of `transaction_id`, keeping its history
    /// and ledger entries. Returns how many actions were dropped.
    pub fn forget_plan(&self, transaction_id: &TransactionId) -> usize {
        self.plans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(transaction_id)
            .map_or(0, |plan| plan.len())
    }

    pub fn create_rollback_context(
        &self,
        transaction_id: &TransactionId,
        operation: &str,
        ctx: &OperationContext,
        reason: impl Into<String>,
    ) -> RollbackContext {
        RollbackContext {
            transaction_id: transaction_id.clone(),
            operation: operation.to_string(),
            tenant_id: ctx.tenant_id.clone(),
            actor_id: ctx.actor_id.clone(),
            reason: reason.into(),
            classification: None,
            metadata: ctx.metadata.clone(),
        }
    }

    /// Abort the unit of work, run the compensation plan and dispose.
    pub async fn perform_rollback<D: Datastore>(
        &self,
        uow: &mut UnitOfWork<D>,
        ctx: &RollbackContext,
    ) -> RollbackResult {
        let started = Instant::now();
        let tx = ctx.transaction_id.clone();
        let _in_flight = InFlightGuard::enter(&self.in_flight, tx.clone());

        warn!(
            transaction_id = %tx,
            operation = %ctx.operation,
            reason = %ctx.reason,
            code = ?ctx.classification.as_ref().and_then(|c| c.code),
            severity = ?ctx.classification.as_ref().map(|c| c.severity),
            "rollback started"
        );

        if uow.is_active() {
            uow.rollback().await;
        }

        let mut plan = self
            .plans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&tx)
            .cloned()
            .unwrap_or_default();
        plan.sort_by_key(|a| Reverse(a.priority));

        let mut result = RollbackResult {
            transaction_id: tx.clone(),
            success: true,
            compensations_executed: Vec::new(),
            compensations_failed: Vec::new(),
            compensations_skipped: 0,
            errors: Vec::new(),
            duration: Duration::ZERO,
        };

        for action in &plan {
            if self.already_applied(&tx, &action.id).await {
                debug!(transaction_id = %tx, action_id = %action.id, "compensation already applied");
                result.compensations_skipped += 1;
                docket_prometheus::record_compensation("skipped");
                continue;
            }

            let (outcome, attempts) = self.run_action(&tx, action).await;
            match outcome {
                Ok(()) => {
                    result.compensations_executed.push(action.id.clone());
                    docket_prometheus::record_compensation("applied");
                    self.record(&tx, &action.id, LedgerStatus::Applied, attempts, None)
                        .await;
                }
                Err(e) => {
                    let message = e.to_string();
                    error!(
                        transaction_id = %tx,
                        action_id = %action.id,
                        attempts,
                        error = %message,
                        "compensation failed"
                    );
                    result.compensations_failed.push(action.id.clone());
                    docket_prometheus::record_compensation("failed");
                    self.record(&tx, &action.id, LedgerStatus::Failed, attempts, Some(&message))
                        .await;
                    result.errors.push(CompensationFailure {
                        action_id: action.id.clone(),
                        attempts,
                        message,
                    });
                }
            }
        }

        uow.dispose().await;

        result.success = result.errors.is_empty();
        result.duration = started.elapsed();
        docket_prometheus::record_rollback(result.success);
        info!(
            transaction_id = %tx,
            success = result.success,
            executed = result.compensations_executed.len(),
            failed = result.compensations_failed.len(),
            skipped = result.compensations_skipped,
            duration = ?result.duration,
            "rollback finished"
        );

        self.remember(result.clone());
        result
    }

    /// Rollbacks performed for `transaction_id`, oldest first.
    pub fn get_rollback_history(&self, transaction_id: &TransactionId) -> Vec<RollbackResult> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .results
            .get(transaction_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Forget the plan, history and ledger entries of `transaction_id`.
    ///
    /// Returns `false` without touching anything while a rollback for the
    /// transaction is running.
    pub async fn clear_transaction(&self, transaction_id: &TransactionId) -> bool {
        if self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(transaction_id)
        {
            warn!(transaction_id = %transaction_id, "refusing to clear transaction during rollback");
            return false;
        }

        self.plans
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(transaction_id);
        {
            let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            if history.results.remove(transaction_id).is_some() {
                history.order.retain(|t| t != transaction_id);
            }
        }
        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.clear(transaction_id).await {
                warn!(transaction_id = %transaction_id, error = %e, "failed to clear ledger entries");
            }
        }
        debug!(transaction_id = %transaction_id, "transaction bookkeeping cleared");
        true
    }

    async fn run_action(
        &self,
        tx: &TransactionId,
        action: &CompensationAction,
    ) -> (Result<(), DocketError>, u32) {
        let budget = action.attempt_budget();
        let mut attempt = 1;
        loop {
            match (action.execute)().await {
                Ok(()) => return (Ok(()), attempt),
                Err(e) if attempt < budget => {
                    let delay = self.base_delay.saturating_mul(1u32 << (attempt - 1).min(31));
                    warn!(
                        transaction_id = %tx,
                        action_id = %action.id,
                        attempt,
                        ?delay,
                        error = %e,
                        "compensation attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return (Err(e), attempt),
            }
        }
    }

    async fn already_applied(&self, tx: &TransactionId, action_id: &str) -> bool {
        let Some(ledger) = &self.ledger else {
            return false;
        };
        match ledger.status(tx, action_id).await {
            Ok(status) => status == Some(LedgerStatus::Applied),
            Err(e) => {
                warn!(transaction_id = %tx, action_id, error = %e, "ledger lookup failed");
                false
            }
        }
    }

    async fn record(
        &self,
        tx: &TransactionId,
        action_id: &str,
        status: LedgerStatus,
        attempts: u32,
        last_error: Option<&str>,
    ) {
        let Some(ledger) = &self.ledger else {
            return;
        };
        if let Err(e) = ledger.record(tx, action_id, status, attempts, last_error).await {
            warn!(transaction_id = %tx, action_id, error = %e, "ledger write failed");
        }
    }

    fn remember(&self, result: RollbackResult) {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = result.transaction_id.clone();
        match history.results.get_mut(&tx) {
            Some(results) => results.push(result),
            None => {
                history.results.insert(tx.clone(), vec![result]);
                history.order.push_back(tx);
            }
        }
        while history.order.len() > self.history_capacity {
            if let Some(evicted) = history.order.pop_front() {
                history.results.remove(&evicted);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use docket_config::model::TransactionConfig;
    use docket_core::traits::SessionAware;
    use docket_test_utils::{MockCounters, MockDatastore, MockRepository};

    use crate::ledger::InMemoryLedger;
    use crate::unit_of_work::UnitOfWorkFactory;

    fn service() -> RollbackService {
        RollbackService::new(&RollbackConfig {
            base_delay_ms: 100,
            history_capacity: 2,
            ledger_enabled: false,
        })
    }

    fn counting(id: &str, counter: &Arc<AtomicU32>, fail: bool) -> CompensationAction {
        let counter = Arc::clone(counter);
        CompensationAction::new(id, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if fail {
                    Err(DocketError::Platform {
                        message: "503 from platform".into(),
                        source: None,
                    })
                } else {
                    Ok(())
                }
            }
        })
    }

    fn recorder(id: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> CompensationAction {
        let log = Arc::clone(log);
        CompensationAction::new(id, move || {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(id);
                Ok(())
            }
        })
    }

    async fn active_uow(store: &MockDatastore) -> UnitOfWork<MockDatastore> {
        let factory = UnitOfWorkFactory::new(Arc::new(store.clone()), &TransactionConfig::default());
        let mut uow = factory.create(None);
        uow.begin().await.unwrap();
        uow
    }

    fn ctx(svc: &RollbackService, tx: &TransactionId) -> RollbackContext {
        svc.create_rollback_context(
            tx,
            "assign-role",
            &OperationContext::new("guild-1", "user-1"),
            "write conflict",
        )
    }

    #[tokio::test(start_paused = true)]
    async fn middle_failure_does_not_stop_plan() {
        let svc = service();
        let store = MockDatastore::new();
        let mut uow = active_uow(&store).await;
        let tx = uow.id().clone();
        let repo = uow.get_repository::<MockRepository>().unwrap();
        repo.insert("pending").await.unwrap();

        let first = Arc::new(AtomicU32::new(0));
        let middle = Arc::new(AtomicU32::new(0));
        let last = Arc::new(AtomicU32::new(0));
        svc.register_compensation_action(&tx, counting("first", &first, false));
        svc.register_compensation_action(&tx, counting("middle", &middle, true));
        svc.register_compensation_action(&tx, counting("last", &last, false));

        let result = svc.perform_rollback(&mut uow, &ctx(&svc, &tx)).await;

        assert!(!result.success);
        assert_eq!(result.compensations_executed, vec!["first", "last"]);
        assert_eq!(result.compensations_failed, vec!["middle"]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].action_id, "middle");
        assert_eq!(result.errors[0].attempts, 3);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(middle.load(Ordering::SeqCst), 3);
        assert_eq!(last.load(Ordering::SeqCst), 1);

        assert!(!uow.is_active());
        assert!(repo.session().is_none());
        assert!(store.committed().await.is_empty());
        assert_eq!(MockCounters::get(&store.counters().sessions_ended), 1);
    }

    #[tokio::test]
    async fn priority_then_insertion_order() {
        let svc = service();
        let store = MockDatastore::new();
        let mut uow = active_uow(&store).await;
        let tx = uow.id().clone();
        let log = Arc::new(Mutex::new(Vec::new()));

        svc.register_compensation_action(&tx, recorder("low", &log).with_priority(1));
        svc.register_compensation_action(&tx, recorder("high-a", &log).with_priority(10));
        svc.register_compensation_action(&tx, recorder("mid", &log).with_priority(5));
        svc.register_compensation_action(&tx, recorder("high-b", &log).with_priority(10));

        let result = svc.perform_rollback(&mut uow, &ctx(&svc, &tx)).await;
        assert!(result.success);
        assert_eq!(*log.lock().unwrap(), vec!["high-a", "high-b", "mid", "low"]);
    }

    #[tokio::test]
    async fn non_retryable_gets_one_attempt() {
        let svc = service();
        let store = MockDatastore::new();
        let mut uow = active_uow(&store).await;
        let tx = uow.id().clone();
        let calls = Arc::new(AtomicU32::new(0));
        svc.register_compensation_action(&tx, counting("once", &calls, true).non_retryable());

        let result = svc.perform_rollback(&mut uow, &ctx(&svc, &tx)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.errors[0].attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ledger_skips_applied_actions_on_second_rollback() {
        let ledger = Arc::new(InMemoryLedger::new());
        let svc = service().with_ledger(ledger.clone());
        let store = MockDatastore::new();
        let tx = TransactionId::from("tx-ledger");
        let applied = Arc::new(AtomicU32::new(0));
        let failing = Arc::new(AtomicU32::new(0));
        svc.register_compensation_action(&tx, counting("applied", &applied, false));
        svc.register_compensation_action(&tx, counting("failing", &failing, true));

        let factory = UnitOfWorkFactory::new(Arc::new(store.clone()), &TransactionConfig::default());
        let mut uow = factory.create_with_id(tx.clone(), None);
        svc.perform_rollback(&mut uow, &ctx(&svc, &tx)).await;
        assert_eq!(
            ledger.entry(&tx, "failing").unwrap().status,
            LedgerStatus::Failed
        );

        let mut uow = factory.create_with_id(tx.clone(), None);
        let second = svc.perform_rollback(&mut uow, &ctx(&svc, &tx)).await;
        assert_eq!(second.compensations_skipped, 1);
        assert_eq!(second.compensations_failed, vec!["failing"]);
        assert!(second.compensations_executed.is_empty());
        assert_eq!(applied.load(Ordering::SeqCst), 1);
        assert_eq!(failing.load(Ordering::SeqCst), 6);
        assert_eq!(ledger.entry(&tx, "failing").unwrap().attempts, 6);
        assert_eq!(svc.get_rollback_history(&tx).len(), 2);
    }

    #[tokio::test]
    async fn reregistering_replaces_action() {
        let svc = service();
        let tx = TransactionId::from("tx-1");
        let calls = Arc::new(AtomicU32::new(0));
        svc.register_compensation_action(&tx, counting("revoke", &calls, false));
        svc.register_compensation_action(&tx, counting("revoke", &calls, false));
        assert_eq!(svc.planned_actions(&tx), 1);
    }

    #[tokio::test]
    async fn clear_transaction_forgets_everything() {
        let ledger = Arc::new(InMemoryLedger::new());
        let svc = service().with_ledger(ledger.clone());
        let store = MockDatastore::new();
        let mut uow = active_uow(&store).await;
        let tx = uow.id().clone();
        let calls = Arc::new(AtomicU32::new(0));
        svc.register_compensation_action(&tx, counting("a", &calls, false));
        svc.perform_rollback(&mut uow, &ctx(&svc, &tx)).await;

        assert!(svc.clear_transaction(&tx).await);
        assert_eq!(svc.planned_actions(&tx), 0);
        assert!(svc.get_rollback_history(&tx).is_empty());
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn clear_refused_while_rollback_in_flight() {
        let svc = Arc::new(service());
        let store = MockDatastore::new();
        let mut uow = active_uow(&store).await;
        let tx = uow.id().clone();

        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let entered = Arc::new(Mutex::new(Some(entered_tx)));
        let release = Arc::new(tokio::sync::Mutex::new(Some(release_rx)));
        svc.register_compensation_action(
            &tx,
            CompensationAction::new("slow", move || {
                let entered = Arc::clone(&entered);
                let release = Arc::clone(&release);
                async move {
                    if let Some(tx) = entered.lock().unwrap().take() {
                        let _ = tx.send(());
                    }
                    if let Some(rx) = release.lock().await.take() {
                        let _ = rx.await;
                    }
                    Ok(())
                }
            }),
        );

        let rollback = {
            let svc = Arc::clone(&svc);
            let tx = tx.clone();
            tokio::spawn(async move {
                let ctx = svc.create_rollback_context(&tx, "op", &OperationContext::default(), "x");
                svc.perform_rollback(&mut uow, &ctx).await
            })
        };

        entered_rx.await.unwrap();
        assert!(!svc.clear_transaction(&tx).await);
        release_tx.send(()).unwrap();
        assert!(rollback.await.unwrap().success);
        assert!(svc.clear_transaction(&tx).await);
    }

    #[tokio::test]
    async fn overlapping_rollbacks_keep_transaction_in_flight() {
        let svc = Arc::new(service());
        let store = MockDatastore::new();
        let factory = UnitOfWorkFactory::new(Arc::new(store.clone()), &TransactionConfig::default());
        let tx = TransactionId::from("tx-overlap");

        // Only the first invocation blocks; later ones return at once.
        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel::<()>();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let entered = Arc::new(Mutex::new(Some(entered_tx)));
        let release = Arc::new(Mutex::new(Some(release_rx)));
        svc.register_compensation_action(
            &tx,
            CompensationAction::new("slow", move || {
                let entered = Arc::clone(&entered);
                let release = Arc::clone(&release);
                async move {
                    if let Some(tx) = entered.lock().unwrap().take() {
                        let _ = tx.send(());
                    }
                    let rx = release.lock().unwrap().take();
                    if let Some(rx) = rx {
                        let _ = rx.await;
                    }
                    Ok(())
                }
            }),
        );

        let first = {
            let svc = Arc::clone(&svc);
            let mut uow = factory.create_with_id(tx.clone(), None);
            let ctx = ctx(&svc, &tx);
            tokio::spawn(async move { svc.perform_rollback(&mut uow, &ctx).await })
        };
        entered_rx.await.unwrap();

        let mut uow = factory.create_with_id(tx.clone(), None);
        let second = svc.perform_rollback(&mut uow, &ctx(&svc, &tx)).await;
        assert!(second.success);

        // The first rollback is still draining its plan.
        assert!(!svc.clear_transaction(&tx).await);
        assert_eq!(svc.planned_actions(&tx), 1);

        release_tx.send(()).unwrap();
        assert!(first.await.unwrap().success);
        assert!(svc.clear_transaction(&tx).await);
        assert_eq!(svc.planned_actions(&tx), 0);
    }

    #[test]
    fn context_keeps_failure_classification() {
        use docket_core::datastore::{DatastoreError, ErrorCode};

        let svc = service();
        let tx = TransactionId::from("tx-10");
        let info = crate::classify::classify_datastore_error(&DatastoreError::new(
            ErrorCode::DuplicateKey,
            "dup",
        ));
        let ctx = svc
            .create_rollback_context(&tx, "open-case", &OperationContext::default(), "dup")
            .with_classification(info.clone());
        assert_eq!(ctx.classification, Some(info));
        assert!(svc
            .create_rollback_context(&tx, "open-case", &OperationContext::default(), "dup")
            .classification
            .is_none());
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let svc = service();
        let store = MockDatastore::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let mut uow = active_uow(&store).await;
            let tx = uow.id().clone();
            svc.perform_rollback(&mut uow, &ctx(&svc, &tx)).await;
            ids.push(tx);
        }
        assert!(svc.get_rollback_history(&ids[0]).is_empty());
        assert_eq!(svc.get_rollback_history(&ids[2]).len(), 1);
    }

    #[test]
    fn context_carries_operation_context() {
        let svc = service();
        let tx = TransactionId::from("tx-9");
        let op = OperationContext::new("guild-9", "user-9")
            .with_metadata("case", serde_json::json!("2024-001"));
        let ctx = svc.create_rollback_context(&tx, "open-case", &op, "duplicate key");
        assert_eq!(ctx.tenant_id, Some(TenantId::from("guild-9")));
        assert_eq!(ctx.actor_id, Some(ActorId::from("user-9")));
        assert_eq!(ctx.metadata["case"], "2024-001");
        assert_eq!(ctx.reason, "duplicate key");
    }
}
