// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Priority-aware, single-flight operation queue.
//!
//! Operations run strictly one at a time on a drain task. Privileged
//! submissions run before normal ones; within a class order is FIFO. Every
//! operation carries its own timeout measured from enqueue. A timeout or a
//! queue clear settles the caller's handle, but an action that already
//! started keeps running to completion on the drain task.
//!
//! Under sustained privileged load normal submissions can starve.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use docket_config::model::QueueConfig;
use docket_core::types::{ActorId, TenantId};
use docket_core::DocketError;

type AnyResult = Result<Box<dyn Any + Send>, DocketError>;
type Job = Box<dyn FnOnce() -> BoxFuture<'static, AnyResult> + Send>;

/// Scheduling class. Lower variants run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationPriority {
    Privileged,
    Normal,
}

impl OperationPriority {
    pub fn from_privileged(privileged: bool) -> Self {
        if privileged {
            OperationPriority::Privileged
        } else {
            OperationPriority::Normal
        }
    }
}

/// Lifecycle of a queued operation. Never re-enters `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
    Cleared,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OperationState::Pending | OperationState::Running)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationState::Pending => write!(f, "pending"),
            OperationState::Running => write!(f, "running"),
            OperationState::Completed => write!(f, "completed"),
            OperationState::Failed => write!(f, "failed"),
            OperationState::TimedOut => write!(f, "timed-out"),
            OperationState::Cleared => write!(f, "cleared"),
        }
    }
}

/// Observable view of one queued operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationSnapshot {
    pub id: u64,
    pub actor: ActorId,
    pub tenant: TenantId,
    pub priority: OperationPriority,
    pub state: OperationState,
    /// Time since enqueue.
    pub age: Duration,
}

/// Observable view of the whole queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    /// Pending operations (excludes the running one).
    pub length: usize,
    /// Whether the drain task is executing an operation.
    pub processing: bool,
    pub running: Option<OperationSnapshot>,
    pub pending: Vec<OperationSnapshot>,
}

/// Caller-side bookkeeping shared by the queue, the timer and the drain task.
struct OperationHandle {
    id: u64,
    seq: u64,
    actor: ActorId,
    tenant: TenantId,
    priority: OperationPriority,
    created_at: Instant,
    state: Mutex<OperationState>,
    completion: Mutex<Option<oneshot::Sender<AnyResult>>>,
}

impl OperationHandle {
    fn state(&self) -> OperationState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_running(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == OperationState::Pending {
            *state = OperationState::Running;
        }
    }

    /// Deliver `result` to the caller. Returns `false` if the handle was
    /// already settled, so each caller observes exactly one outcome.
    fn settle(&self, result: AnyResult, final_state: OperationState) -> bool {
        let sender = self
            .completion
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(sender) = sender else {
            return false;
        };
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = final_state;
        docket_prometheus::record_queue_outcome(match final_state {
            OperationState::Completed => "completed",
            OperationState::Failed => "failed",
            OperationState::TimedOut => "timed_out",
            OperationState::Cleared => "cleared",
            OperationState::Pending | OperationState::Running => "unknown",
        });
        // The caller may have stopped waiting; that is not an error here.
        let _ = sender.send(result);
        true
    }

    fn key(&self) -> (OperationPriority, Instant, u64) {
        (self.priority, self.created_at, self.seq)
    }

    fn snapshot(&self, now: Instant) -> OperationSnapshot {
        OperationSnapshot {
            id: self.id,
            actor: self.actor.clone(),
            tenant: self.tenant.clone(),
            priority: self.priority,
            state: self.state(),
            age: now.saturating_duration_since(self.created_at),
        }
    }
}

struct PendingOperation {
    handle: Arc<OperationHandle>,
    job: Job,
}

#[derive(Default)]
struct QueueState {
    pending: Vec<PendingOperation>,
    running: Option<Arc<OperationHandle>>,
    draining: bool,
    timers: HashMap<u64, JoinHandle<()>>,
}

struct Inner {
    state: Mutex<QueueState>,
    next_id: AtomicU64,
    timeout: Duration,
    max_pending: usize,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_timeout(&self, id: u64) {
        let (handle, was_pending) = {
            let mut state = self.lock();
            state.timers.remove(&id);
            if let Some(pos) = state.pending.iter().position(|p| p.handle.id == id) {
                let removed = state.pending.remove(pos);
                docket_prometheus::set_queue_depth(state.pending.len());
                (Some(removed.handle), true)
            } else {
                let running = state.running.as_ref().filter(|h| h.id == id).cloned();
                (running, false)
            }
        };

        if let Some(handle) = handle {
            let err = DocketError::QueueTimeout {
                operation_id: id,
                timeout: self.timeout,
            };
            if handle.settle(Err(err), OperationState::TimedOut) {
                warn!(
                    operation_id = id,
                    actor_id = %handle.actor,
                    tenant_id = %handle.tenant,
                    was_pending,
                    timeout = ?self.timeout,
                    "queued operation timed out"
                );
            }
        }
    }
}

/// Single-flight operation queue. Cheap to clone.
#[derive(Clone)]
pub struct OperationQueue {
    inner: Arc<Inner>,
}

impl OperationQueue {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                next_id: AtomicU64::new(1),
                timeout: config.operation_timeout(),
                max_pending: config.max_pending,
            }),
        }
    }

    /// Submit `op` and wait for its result, its timeout, or a queue clear.
    pub async fn enqueue<T, F, Fut>(
        &self,
        op: F,
        actor: ActorId,
        tenant: TenantId,
        privileged: bool,
    ) -> Result<T, DocketError>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, DocketError>> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        let handle = Arc::new(OperationHandle {
            id,
            seq: id,
            actor,
            tenant,
            priority: OperationPriority::from_privileged(privileged),
            created_at: Instant::now(),
            state: Mutex::new(OperationState::Pending),
            completion: Mutex::new(Some(tx)),
        });
        let job: Job = Box::new(move || {
            async move { op().await.map(|v| Box::new(v) as Box<dyn Any + Send>) }.boxed()
        });

        {
            let mut state = self.inner.lock();
            if state.pending.len() >= self.inner.max_pending {
                warn!(
                    operation_id = id,
                    actor_id = %handle.actor,
                    capacity = self.inner.max_pending,
                    "queue full, rejecting operation"
                );
                return Err(DocketError::QueueFull {
                    capacity: self.inner.max_pending,
                });
            }

            let key = handle.key();
            let pos = state.pending.partition_point(|p| p.handle.key() <= key);
            state.pending.insert(
                pos,
                PendingOperation {
                    handle: Arc::clone(&handle),
                    job,
                },
            );

            let timer_inner = Arc::clone(&self.inner);
            let timeout = self.inner.timeout;
            let timer = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                timer_inner.on_timeout(id);
            });
            state.timers.insert(id, timer);

            if !state.draining {
                state.draining = true;
                tokio::spawn(drain(Arc::clone(&self.inner)));
            }
            docket_prometheus::set_queue_depth(state.pending.len());
        }

        debug!(
            operation_id = id,
            actor_id = %handle.actor,
            tenant_id = %handle.tenant,
            priority = ?handle.priority,
            "operation enqueued"
        );
        drop(handle);

        match rx.await {
            Ok(Ok(value)) => value.downcast::<T>().map(|v| *v).map_err(|_| {
                DocketError::Internal(format!("queued operation {id} returned an unexpected type"))
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DocketError::Internal(format!(
                "queued operation {id} was dropped without an outcome"
            ))),
        }
    }

    /// Reject every outstanding caller with `QueueCleared`.
    ///
    /// A running action is not interrupted; its eventual result is dropped.
    pub fn clear_queue(&self) -> usize {
        let (pending, running, timers) = {
            let mut state = self.inner.lock();
            let pending = std::mem::take(&mut state.pending);
            let timers: Vec<_> = state.timers.drain().map(|(_, t)| t).collect();
            (pending, state.running.clone(), timers)
        };
        docket_prometheus::set_queue_depth(0);

        for timer in timers {
            timer.abort();
        }

        let mut rejected = 0;
        for op in pending {
            if op.handle.settle(Err(DocketError::QueueCleared), OperationState::Cleared) {
                rejected += 1;
            }
        }
        if let Some(handle) = running {
            if handle.settle(Err(DocketError::QueueCleared), OperationState::Cleared) {
                rejected += 1;
            }
        }
        warn!(rejected, "operation queue cleared");
        rejected
    }

    pub fn get_queue_status(&self) -> QueueStatus {
        let now = Instant::now();
        let state = self.inner.lock();
        QueueStatus {
            length: state.pending.len(),
            processing: state.running.is_some(),
            running: state.running.as_ref().map(|h| h.snapshot(now)),
            pending: state.pending.iter().map(|p| p.handle.snapshot(now)).collect(),
        }
    }

    /// Number of pending operations.
    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run pending operations one at a time until the queue is empty.
async fn drain(inner: Arc<Inner>) {
    loop {
        let next = {
            let mut state = inner.lock();
            if state.pending.is_empty() {
                state.draining = false;
                state.running = None;
                break;
            }
            let next = state.pending.remove(0);
            state.running = Some(Arc::clone(&next.handle));
            docket_prometheus::set_queue_depth(state.pending.len());
            next
        };

        let PendingOperation { handle, job } = next;
        handle.mark_running();
        docket_prometheus::record_queue_wait(handle.created_at.elapsed());
        debug!(operation_id = handle.id, actor_id = %handle.actor, "operation started");

        let result = match AssertUnwindSafe(job()).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                error!(operation_id = handle.id, "queued operation panicked");
                Err(DocketError::Internal(format!(
                    "queued operation {} panicked",
                    handle.id
                )))
            }
        };

        let final_state = if result.is_ok() {
            OperationState::Completed
        } else {
            OperationState::Failed
        };
        if !handle.settle(result, final_state) {
            debug!(
                operation_id = handle.id,
                state = %handle.state(),
                "operation finished after its caller was already answered"
            );
        }

        let mut state = inner.lock();
        state.running = None;
        if let Some(timer) = state.timers.remove(&handle.id) {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn queue(timeout_ms: u64, max_pending: usize) -> OperationQueue {
        OperationQueue::new(&QueueConfig {
            operation_timeout_ms: timeout_ms,
            max_pending,
        })
    }

    fn ids(actor: &str) -> (ActorId, TenantId) {
        (ActorId::from(actor), TenantId::from("guild-1"))
    }

    /// Occupy the execution slot until the returned sender fires.
    fn block(q: &OperationQueue) -> (oneshot::Sender<()>, JoinHandle<Result<(), DocketError>>) {
        let (release, gate) = oneshot::channel::<()>();
        let q = q.clone();
        let task = tokio::spawn(async move {
            let (a, t) = ids("blocker");
            q.enqueue(
                move || async move {
                    let _ = gate.await;
                    Ok(())
                },
                a,
                t,
                false,
            )
            .await
        });
        (release, task)
    }

    async fn settle_tasks() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn returns_operation_result() {
        let q = queue(30_000, 10);
        let (a, t) = ids("u1");
        let value = q.enqueue(|| async { Ok(42u32) }, a, t, false).await.unwrap();
        assert_eq!(value, 42);

        let (a, t) = ids("u1");
        let err = q
            .enqueue(
                || async { Err::<(), _>(DocketError::Internal("boom".into())) },
                a,
                t,
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DocketError::Internal(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn privileged_first_then_fifo() {
        let q = queue(30_000, 10);
        let order = Arc::new(Mutex::new(Vec::new()));
        let (release, blocker) = block(&q);
        settle_tasks().await;

        let mut tasks = Vec::new();
        for (name, privileged) in [("n1", false), ("n2", false), ("p1", true), ("n3", false), ("p2", true)] {
            let q = q.clone();
            let order = Arc::clone(&order);
            tasks.push(tokio::spawn(async move {
                let (a, t) = ids(name);
                q.enqueue(
                    move || async move {
                        order.lock().unwrap().push(name);
                        Ok(())
                    },
                    a,
                    t,
                    privileged,
                )
                .await
            }));
            settle_tasks().await;
        }

        let status = q.get_queue_status();
        assert_eq!(status.length, 5);
        assert!(status.processing);
        assert_eq!(status.pending[0].priority, OperationPriority::Privileged);

        release.send(()).unwrap();
        blocker.await.unwrap().unwrap();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec!["p1", "p2", "n1", "n2", "n3"]);
    }

    /// Privileged operation that enqueues its successor while running.
    fn privileged_chain(
        q: OperationQueue,
        order: Arc<Mutex<Vec<String>>>,
        n: usize,
        remaining: usize,
    ) -> JoinHandle<Result<(), DocketError>> {
        tokio::spawn(async move {
            let (a, t) = ids("partner");
            let next = q.clone();
            q.enqueue(
                move || async move {
                    order.lock().unwrap().push(format!("p{n}"));
                    if remaining > 0 {
                        privileged_chain(next, Arc::clone(&order), n + 1, remaining - 1);
                        settle_tasks().await;
                    }
                    Ok(())
                },
                a,
                t,
                true,
            )
            .await
        })
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_privileged_load_starves_normal_work() {
        let q = queue(30_000, 10);
        let order = Arc::new(Mutex::new(Vec::new()));
        let (release, blocker) = block(&q);
        settle_tasks().await;

        let normal = {
            let q = q.clone();
            let order = Arc::clone(&order);
            tokio::spawn(async move {
                let (a, t) = ids("clerk");
                q.enqueue(
                    move || async move {
                        order.lock().unwrap().push("normal".to_string());
                        Ok(())
                    },
                    a,
                    t,
                    false,
                )
                .await
            })
        };
        settle_tasks().await;
        privileged_chain(q.clone(), Arc::clone(&order), 0, 4);
        settle_tasks().await;

        release.send(()).unwrap();
        blocker.await.unwrap().unwrap();
        normal.await.unwrap().unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["p0", "p1", "p2", "p3", "p4", "normal"]);
    }

    #[tokio::test(start_paused = true)]
    async fn never_more_than_one_running() {
        let q = queue(30_000, 100);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for i in 0..20 {
            let q = q.clone();
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                let (a, t) = ids(&format!("u{i}"));
                q.enqueue(
                    move || async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    },
                    a,
                    t,
                    i % 3 == 0,
                )
                .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(q.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn hung_operation_times_out_exactly_once() {
        let q = queue(100, 10);
        let (a, t) = ids("u1");
        let err = q
            .enqueue(
                || async {
                    std::future::pending::<()>().await;
                    Ok(())
                },
                a,
                t,
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DocketError::QueueTimeout { timeout, .. } if timeout == Duration::from_millis(100)));

        let status = q.get_queue_status();
        let running = status.running.expect("action keeps running");
        assert_eq!(running.state, OperationState::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn late_completion_does_not_answer_timed_out_caller() {
        let q = queue(100, 10);
        let finished = Arc::new(AtomicUsize::new(0));

        let caller = {
            let q = q.clone();
            let finished = Arc::clone(&finished);
            tokio::spawn(async move {
                let (a, t) = ids("slow");
                q.enqueue(
                    move || async move {
                        tokio::time::sleep(Duration::from_millis(300)).await;
                        finished.fetch_add(1, Ordering::SeqCst);
                        Ok(7u32)
                    },
                    a,
                    t,
                    false,
                )
                .await
            })
        };
        settle_tasks().await;
        let handle = q.inner.lock().running.clone().expect("slow action is running");

        let err = caller.await.unwrap().unwrap_err();
        assert!(matches!(err, DocketError::QueueTimeout { .. }));
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert_eq!(
            q.get_queue_status().running.map(|r| r.state),
            Some(OperationState::TimedOut)
        );

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        // The late Ok(7) was dropped; the handle was settled once, as timed out.
        assert_eq!(handle.state(), OperationState::TimedOut);
        assert!(handle.completion.lock().unwrap().is_none());
        assert!(q.get_queue_status().running.is_none());
        assert!(q.inner.lock().timers.is_empty());

        let (a, t) = ids("next");
        assert_eq!(q.enqueue(|| async { Ok(8u32) }, a, t, false).await.unwrap(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_operation_times_out_and_leaves_queue() {
        let q = queue(100, 10);
        let (_release, blocker) = block(&q);
        settle_tasks().await;

        let waiter = {
            let q = q.clone();
            tokio::spawn(async move {
                let (a, t) = ids("late");
                q.enqueue(|| async { Ok(()) }, a, t, false).await
            })
        };
        settle_tasks().await;
        assert_eq!(q.len(), 1);

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, DocketError::QueueTimeout { .. }));
        assert_eq!(q.len(), 0);
        assert!(matches!(
            blocker.await.unwrap(),
            Err(DocketError::QueueTimeout { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_rejects_everyone() {
        let q = queue(30_000, 10);
        let (_release, blocker) = block(&q);
        settle_tasks().await;

        let mut waiters = Vec::new();
        for i in 0..3 {
            let q = q.clone();
            waiters.push(tokio::spawn(async move {
                let (a, t) = ids(&format!("u{i}"));
                q.enqueue(|| async { Ok(()) }, a, t, i == 1).await
            }));
            settle_tasks().await;
        }

        assert_eq!(q.clear_queue(), 4);
        assert_eq!(q.get_queue_status().length, 0);
        for w in waiters {
            assert!(matches!(w.await.unwrap(), Err(DocketError::QueueCleared)));
        }
        assert!(matches!(blocker.await.unwrap(), Err(DocketError::QueueCleared)));
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_rejects_submission() {
        let q = queue(30_000, 2);
        let (release, _blocker) = block(&q);
        settle_tasks().await;

        for i in 0..2 {
            let q = q.clone();
            tokio::spawn(async move {
                let (a, t) = ids(&format!("u{i}"));
                q.enqueue(|| async { Ok(()) }, a, t, false).await
            });
            settle_tasks().await;
        }

        let (a, t) = ids("overflow");
        let err = q.enqueue(|| async { Ok(()) }, a, t, true).await.unwrap_err();
        assert!(matches!(err, DocketError::QueueFull { capacity: 2 }));
        drop(release);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_operation_does_not_stall_queue() {
        let q = queue(30_000, 10);
        let (a, t) = ids("u1");
        let err = q
            .enqueue(
                || async {
                    if true {
                        panic!("operation bug");
                    }
                    Ok(())
                },
                a,
                t,
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DocketError::Internal(_)));

        let (a, t) = ids("u2");
        assert_eq!(q.enqueue(|| async { Ok("ok") }, a, t, false).await.unwrap(), "ok");
    }

    #[test]
    fn state_display() {
        assert_eq!(OperationState::TimedOut.to_string(), "timed-out");
        assert!(OperationState::Cleared.is_terminal());
        assert!(!OperationState::Running.is_terminal());
    }
}
