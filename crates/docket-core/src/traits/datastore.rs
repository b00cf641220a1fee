// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Datastore session and transaction primitives.

use async_trait::async_trait;

use crate::datastore::{DatastoreError, TransactionOptions};
use crate::error::DocketError;
use crate::types::HealthStatus;

/// A datastore capable of opening transactional sessions.
///
/// A unit of work owns exactly one session at a time; repositories only ever
/// see it through a `Weak` reference.
#[async_trait]
pub trait Datastore: Send + Sync + 'static {
    /// Session handle produced by this datastore.
    type Session: TransactionSession;

    /// Returns the human-readable name of this datastore.
    fn name(&self) -> &str;

    /// Opens a new session. No transaction is started yet.
    async fn start_session(&self) -> Result<Self::Session, DatastoreError>;

    /// Performs a health check against the backing store.
    async fn health_check(&self) -> Result<HealthStatus, DocketError>;
}

/// An opaque handle representing a datastore session.
///
/// Methods take `&self` so the session can be shared behind an `Arc` with the
/// repositories participating in the transaction.
#[async_trait]
pub trait TransactionSession: Send + Sync + 'static {
    /// Stable identifier used in logs.
    fn id(&self) -> &str;

    /// Whether a transaction is currently open on this session.
    fn in_transaction(&self) -> bool;

    /// Starts a transaction with the given guarantees.
    async fn start_transaction(&self, options: &TransactionOptions) -> Result<(), DatastoreError>;

    /// Commits the open transaction.
    async fn commit_transaction(&self) -> Result<(), DatastoreError>;

    /// Aborts the open transaction.
    async fn abort_transaction(&self) -> Result<(), DatastoreError>;

    /// Ends the session, releasing its connection. Never fails.
    async fn end_session(&self);
}
