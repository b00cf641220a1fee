// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock datastore for deterministic transaction testing.
//!
//! `MockDatastore` implements `Datastore` with scripted failures for session
//! start, transaction start and commit, plus counters and a committed-writes
//! log so tests can assert what became durable.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use docket_core::datastore::{DatastoreError, TransactionOptions};
use docket_core::traits::{Datastore, TransactionSession};
use docket_core::types::HealthStatus;
use docket_core::DocketError;

/// Call counters shared by the datastore and every session it opens.
#[derive(Debug, Default)]
pub struct MockCounters {
    pub sessions_started: AtomicU32,
    pub sessions_ended: AtomicU32,
    pub transactions_started: AtomicU32,
    pub commits_attempted: AtomicU32,
    pub commits_succeeded: AtomicU32,
    pub aborts: AtomicU32,
}

impl MockCounters {
    pub fn get(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct MockState {
    counters: MockCounters,
    session_failures: Mutex<VecDeque<DatastoreError>>,
    begin_failures: Mutex<VecDeque<DatastoreError>>,
    commit_failures: Mutex<VecDeque<DatastoreError>>,
    abort_failures: Mutex<VecDeque<DatastoreError>>,
    committed: Mutex<Vec<String>>,
    last_options: Mutex<Option<TransactionOptions>>,
}

/// A scripted in-memory datastore.
///
/// Failures are popped from FIFO queues, one per call. When a queue is empty
/// the call succeeds.
#[derive(Clone, Default)]
pub struct MockDatastore {
    state: Arc<MockState>,
}

impl MockDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `start_session` call with `error`.
    pub async fn fail_next_session(&self, error: DatastoreError) {
        self.state.session_failures.lock().await.push_back(error);
    }

    /// Fail the next `start_transaction` call with `error`.
    pub async fn fail_next_begin(&self, error: DatastoreError) {
        self.state.begin_failures.lock().await.push_back(error);
    }

    /// Fail the next `commit_transaction` call with `error`.
    pub async fn fail_next_commit(&self, error: DatastoreError) {
        self.state.commit_failures.lock().await.push_back(error);
    }

    /// Fail the next `abort_transaction` call with `error`.
    pub async fn fail_next_abort(&self, error: DatastoreError) {
        self.state.abort_failures.lock().await.push_back(error);
    }

    pub fn counters(&self) -> &MockCounters {
        &self.state.counters
    }

    /// Writes that survived a successful commit, in commit order.
    pub async fn committed(&self) -> Vec<String> {
        self.state.committed.lock().await.clone()
    }

    /// Options passed to the most recent `start_transaction`.
    pub async fn last_options(&self) -> Option<TransactionOptions> {
        self.state.last_options.lock().await.clone()
    }
}

#[async_trait]
impl Datastore for MockDatastore {
    type Session = MockSession;

    fn name(&self) -> &str {
        "mock-datastore"
    }

    async fn start_session(&self) -> Result<MockSession, DatastoreError> {
        if let Some(err) = self.state.session_failures.lock().await.pop_front() {
            return Err(err);
        }
        self.state
            .counters
            .sessions_started
            .fetch_add(1, Ordering::SeqCst);
        Ok(MockSession {
            id: format!("mock-session-{}", uuid::Uuid::new_v4()),
            state: Arc::clone(&self.state),
            active: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            buffered: Mutex::new(Vec::new()),
        })
    }

    async fn health_check(&self) -> Result<HealthStatus, DocketError> {
        Ok(HealthStatus::Healthy)
    }
}

/// Session produced by [`MockDatastore`].
///
/// Writes made through a [`crate::MockRepository`] are buffered here and
/// only reach the datastore's committed log on a successful commit.
pub struct MockSession {
    id: String,
    state: Arc<MockState>,
    active: AtomicBool,
    ended: AtomicBool,
    buffered: Mutex<Vec<String>>,
}

impl MockSession {
    /// Buffer a write inside the open transaction.
    pub async fn write(&self, value: String) -> Result<(), DocketError> {
        if !self.in_transaction() {
            return Err(DocketError::TransactionInactive { operation: "write" });
        }
        self.buffered.lock().await.push(value);
        Ok(())
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionSession for MockSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn in_transaction(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    async fn start_transaction(&self, options: &TransactionOptions) -> Result<(), DatastoreError> {
        if let Some(err) = self.state.begin_failures.lock().await.pop_front() {
            return Err(err);
        }
        *self.state.last_options.lock().await = Some(options.clone());
        self.state
            .counters
            .transactions_started
            .fetch_add(1, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<(), DatastoreError> {
        self.state
            .counters
            .commits_attempted
            .fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.state.commit_failures.lock().await.pop_front() {
            return Err(err);
        }
        let writes: Vec<String> = self.buffered.lock().await.drain(..).collect();
        self.state.committed.lock().await.extend(writes);
        self.state
            .counters
            .commits_succeeded
            .fetch_add(1, Ordering::SeqCst);
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn abort_transaction(&self) -> Result<(), DatastoreError> {
        self.state.counters.aborts.fetch_add(1, Ordering::SeqCst);
        self.buffered.lock().await.clear();
        self.active.store(false, Ordering::SeqCst);
        match self.state.abort_failures.lock().await.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn end_session(&self) {
        if !self.ended.swap(true, Ordering::SeqCst) {
            self.state
                .counters
                .sessions_ended
                .fetch_add(1, Ordering::SeqCst);
        }
    }
}
