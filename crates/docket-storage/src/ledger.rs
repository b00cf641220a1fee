// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed compensation ledger.
//!
//! Rows live in the `compensation_ledger` table (V2 migration). Writes go
//! through the primary connection, never a unit-of-work session, so a
//! recorded outcome survives the rollback that triggered it.

use std::str::FromStr;

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};

use docket_core::traits::{CompensationLedger, LedgerStatus};
use docket_core::types::TransactionId;
use docket_core::DocketError;

use crate::database::{map_tr_err, Database};

pub struct SqliteCompensationLedger {
    conn: tokio_rusqlite::Connection,
}

impl SqliteCompensationLedger {
    pub fn new(db: &Database) -> Self {
        Self {
            conn: db.connection().clone(),
        }
    }
}

#[async_trait]
impl CompensationLedger for SqliteCompensationLedger {
    async fn status(
        &self,
        transaction_id: &TransactionId,
        action_id: &str,
    ) -> Result<Option<LedgerStatus>, DocketError> {
        let tx = transaction_id.to_string();
        let action = action_id.to_string();
        let raw: Option<String> = self
            .conn
            .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
                conn.query_row(
                    "SELECT status FROM compensation_ledger
                     WHERE transaction_id = ?1 AND action_id = ?2",
                    params![tx, action],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)?;

        raw.map(|s| {
            LedgerStatus::from_str(&s)
                .map_err(|_| DocketError::Internal(format!("unknown ledger status `{s}`")))
        })
        .transpose()
    }

    async fn record(
        &self,
        transaction_id: &TransactionId,
        action_id: &str,
        status: LedgerStatus,
        attempts: u32,
        last_error: Option<&str>,
    ) -> Result<(), DocketError> {
        let tx = transaction_id.to_string();
        let action = action_id.to_string();
        let status = status.to_string();
        let last_error = last_error.map(str::to_string);
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO compensation_ledger
                        (transaction_id, action_id, status, attempts, last_error)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (transaction_id, action_id) DO UPDATE SET
                        status = excluded.status,
                        attempts = compensation_ledger.attempts + excluded.attempts,
                        last_error = excluded.last_error,
                        updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    params![tx, action, status, attempts, last_error],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn clear(&self, transaction_id: &TransactionId) -> Result<(), DocketError> {
        let tx = transaction_id.to_string();
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "DELETE FROM compensation_ledger WHERE transaction_id = ?1",
                    params![tx],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}
