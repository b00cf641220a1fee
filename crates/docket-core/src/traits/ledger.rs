// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted record of compensation outcomes keyed by (transaction, action).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::DocketError;
use crate::types::TransactionId;

/// Last recorded outcome of a compensation action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Applied,
    Failed,
}

/// Makes compensation retries safe across rollback attempts.
///
/// An action recorded as [`LedgerStatus::Applied`] is not executed again for
/// the same transaction.
#[async_trait]
pub trait CompensationLedger: Send + Sync + 'static {
    async fn status(
        &self,
        transaction_id: &TransactionId,
        action_id: &str,
    ) -> Result<Option<LedgerStatus>, DocketError>;

    async fn record(
        &self,
        transaction_id: &TransactionId,
        action_id: &str,
        status: LedgerStatus,
        attempts: u32,
        last_error: Option<&str>,
    ) -> Result<(), DocketError>;

    /// Forget every entry for the transaction.
    async fn clear(&self, transaction_id: &TransactionId) -> Result<(), DocketError>;
}
