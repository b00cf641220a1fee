// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock repository bound to [`MockDatastore`] sessions.

use std::sync::{Arc, Weak};

use docket_core::traits::{Repository, SessionAware, SessionSlot};
use docket_core::DocketError;

use crate::mock_datastore::{MockDatastore, MockSession};

/// A repository that writes strings through the attached session.
///
/// Fails with `TransactionInactive` when no live session is attached, which
/// makes session-lifecycle bugs visible in tests.
#[derive(Debug, Default)]
pub struct MockRepository {
    slot: SessionSlot<MockSession>,
}

impl MockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, value: impl Into<String>) -> Result<(), DocketError> {
        let session = self
            .slot
            .get()
            .ok_or(DocketError::TransactionInactive { operation: "insert" })?;
        session.write(value.into()).await
    }

    pub fn is_attached(&self) -> bool {
        self.slot.get().is_some()
    }
}

impl SessionAware<MockSession> for MockRepository {
    fn set_session(&self, session: Option<Weak<MockSession>>) {
        self.slot.set(session);
    }

    fn session(&self) -> Option<Arc<MockSession>> {
        self.slot.get()
    }
}

impl Repository<MockDatastore> for MockRepository {
    fn create(_datastore: &Arc<MockDatastore>) -> Self {
        Self::new()
    }
}

/// A second repository type, for tests that need two distinct repositories.
#[derive(Debug, Default)]
pub struct AuditRepository {
    slot: SessionSlot<MockSession>,
}

impl AuditRepository {
    pub async fn record(&self, entry: &str) -> Result<(), DocketError> {
        let session = self
            .slot
            .get()
            .ok_or(DocketError::TransactionInactive { operation: "record" })?;
        session.write(format!("audit:{entry}")).await
    }
}

impl SessionAware<MockSession> for AuditRepository {
    fn set_session(&self, session: Option<Weak<MockSession>>) {
        self.slot.set(session);
    }

    fn session(&self) -> Option<Arc<MockSession>> {
        self.slot.get()
    }
}

impl Repository<MockDatastore> for AuditRepository {
    fn create(_datastore: &Arc<MockDatastore>) -> Self {
        Self::default()
    }
}
