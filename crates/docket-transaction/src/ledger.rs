// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process compensation ledger, for tests and deployments without a
//! persisted ledger.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use docket_core::traits::{CompensationLedger, LedgerStatus};
use docket_core::types::TransactionId;
use docket_core::DocketError;

/// One recorded compensation outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub status: LedgerStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryLedger {
    entries: Mutex<HashMap<(TransactionId, String), LedgerEntry>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, transaction_id: &TransactionId, action_id: &str) -> Option<LedgerEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(transaction_id.clone(), action_id.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CompensationLedger for InMemoryLedger {
    async fn status(
        &self,
        transaction_id: &TransactionId,
        action_id: &str,
    ) -> Result<Option<LedgerStatus>, DocketError> {
        Ok(self.entry(transaction_id, action_id).map(|e| e.status))
    }

    async fn record(
        &self,
        transaction_id: &TransactionId,
        action_id: &str,
        status: LedgerStatus,
        attempts: u32,
        last_error: Option<&str>,
    ) -> Result<(), DocketError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .entry((transaction_id.clone(), action_id.to_string()))
            .or_insert(LedgerEntry {
                status,
                attempts: 0,
                last_error: None,
            });
        entry.status = status;
        entry.attempts = entry.attempts.saturating_add(attempts);
        entry.last_error = last_error.map(str::to_string);
        Ok(())
    }

    async fn clear(&self, transaction_id: &TransactionId) -> Result<(), DocketError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(tx, _), _| tx != transaction_id);
        Ok(())
    }
}
