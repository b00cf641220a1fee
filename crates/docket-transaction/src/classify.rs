// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classification of transaction failures.
//!
//! Datastore errors arrive already sealed into an [`ErrorCode`]. This module
//! maps each code to a severity, a retry budget and operator recovery hints.
//! A driver "transient transaction" label upgrades any code to transient.

use std::time::Duration;

use serde::Serialize;
use strum::Display;

use docket_core::datastore::{DatastoreError, ErrorCode};
use docket_core::DocketError;

/// How a failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Expected to succeed on retry.
    Transient,
    /// Will fail again; surface immediately.
    Permanent,
    /// Environment or credentials are wrong; needs an operator.
    Configuration,
    /// Not recognized; treated as non-retryable.
    Unknown,
}

/// Classification of one failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionErrorInfo {
    /// Numeric datastore code, when the failure came from the datastore.
    pub code: Option<i32>,
    pub severity: ErrorSeverity,
    pub retryable: bool,
    /// Minimum delay before retrying this kind of failure.
    pub retry_delay: Duration,
    /// Retries (not attempts) this kind of failure deserves.
    pub max_retries: u32,
    pub description: &'static str,
    pub recovery_actions: &'static [&'static str],
}

impl TransactionErrorInfo {
    /// Total attempts allowed under a policy that permits `policy_max`.
    pub fn allowed_attempts(&self, policy_max: u32) -> u32 {
        if !self.retryable {
            return 1;
        }
        policy_max.min(self.max_retries.saturating_add(1)).max(1)
    }
}

struct Entry {
    severity: ErrorSeverity,
    retry_delay_ms: u64,
    max_retries: u32,
    description: &'static str,
    recovery_actions: &'static [&'static str],
}

const fn transient(
    retry_delay_ms: u64,
    max_retries: u32,
    description: &'static str,
    recovery_actions: &'static [&'static str],
) -> Entry {
    Entry {
        severity: ErrorSeverity::Transient,
        retry_delay_ms,
        max_retries,
        description,
        recovery_actions,
    }
}

const fn fatal(
    severity: ErrorSeverity,
    description: &'static str,
    recovery_actions: &'static [&'static str],
) -> Entry {
    Entry {
        severity,
        retry_delay_ms: 0,
        max_retries: 0,
        description,
        recovery_actions,
    }
}

fn lookup(code: ErrorCode) -> Option<Entry> {
    use ErrorSeverity::{Configuration, Permanent};

    let entry = match code {
        ErrorCode::WriteConflict => transient(
            100,
            5,
            "write conflict with a concurrent transaction",
            &["retry the transaction", "reduce contention on frequently updated records"],
        ),
        ErrorCode::NotWritablePrimary => transient(
            1000,
            3,
            "datastore is not accepting writes",
            &["wait for the datastore to become writable"],
        ),
        ErrorCode::PrimarySteppedDown | ErrorCode::InterruptedDueToReplStateChange => transient(
            1000,
            3,
            "datastore changed state during the transaction",
            &["retry after the datastore settles"],
        ),
        ErrorCode::NetworkTimeout => transient(
            500,
            3,
            "network timeout talking to the datastore",
            &["check datastore latency", "retry the transaction"],
        ),
        ErrorCode::ExceededTimeLimit => transient(
            500,
            2,
            "datastore time limit exceeded",
            &["raise transaction.max_commit_time_ms", "shorten the transaction"],
        ),
        ErrorCode::ShutdownInProgress => transient(
            2000,
            2,
            "datastore is shutting down",
            &["wait for the datastore to restart"],
        ),
        ErrorCode::HostUnreachable | ErrorCode::HostNotFound => fatal(
            Configuration,
            "datastore cannot be reached",
            &["check storage.database_path", "check file permissions and free disk space"],
        ),
        ErrorCode::AuthenticationFailed => fatal(
            Configuration,
            "datastore rejected the credentials or file format",
            &["verify the database file is a Docket database", "check credentials"],
        ),
        ErrorCode::Unauthorized => fatal(
            Permanent,
            "not permitted to perform this operation",
            &["check that the database file is writable"],
        ),
        ErrorCode::DocumentTooLarge => fatal(
            Permanent,
            "document exceeds the size limit",
            &["split the document", "store large payloads outside the datastore"],
        ),
        ErrorCode::TransactionTooLarge => fatal(
            Permanent,
            "transaction exceeds the size limit",
            &["split the work into smaller transactions"],
        ),
        ErrorCode::SessionExpired | ErrorCode::TransactionTooOld | ErrorCode::NoSuchTransaction => {
            fatal(
                Permanent,
                "session or transaction is no longer valid",
                &["start a new unit of work"],
            )
        }
        ErrorCode::DuplicateKey => fatal(
            Permanent,
            "a record with this key already exists",
            &["check for an existing record before inserting"],
        ),
        ErrorCode::Other(_) => return None,
    };
    Some(entry)
}

const UNKNOWN_HINTS: &[&str] = &["inspect the logs for the underlying error"];

fn from_entry(code: Option<i32>, entry: Entry) -> TransactionErrorInfo {
    TransactionErrorInfo {
        code,
        severity: entry.severity,
        retryable: entry.severity == ErrorSeverity::Transient,
        retry_delay: Duration::from_millis(entry.retry_delay_ms),
        max_retries: entry.max_retries,
        description: entry.description,
        recovery_actions: entry.recovery_actions,
    }
}

/// Classify a sealed datastore error.
pub fn classify_datastore_error(error: &DatastoreError) -> TransactionErrorInfo {
    let code = Some(error.code.code());
    let mut info = match lookup(error.code) {
        Some(entry) => from_entry(code, entry),
        None => from_entry(
            code,
            fatal(ErrorSeverity::Unknown, "unrecognized datastore error", UNKNOWN_HINTS),
        ),
    };

    if error.transient && !info.retryable {
        info.severity = ErrorSeverity::Transient;
        info.retryable = true;
        info.retry_delay = info.retry_delay.max(Duration::from_millis(100));
        info.max_retries = info.max_retries.max(3);
    }
    info
}

/// Classify any error surfaced by a transactional operation.
pub fn classify_error(error: &DocketError) -> TransactionErrorInfo {
    match error {
        DocketError::Datastore(e) => classify_datastore_error(e),
        DocketError::Timeout { .. } => from_entry(
            None,
            transient(
                500,
                2,
                "attempt exceeded its time limit",
                &["check datastore latency", "raise retry.attempt_timeout_ms"],
            ),
        ),
        DocketError::CircuitOpen { .. } => from_entry(
            None,
            fatal(
                ErrorSeverity::Permanent,
                "circuit breaker is open after repeated failures",
                &["wait for the breaker window to pass", "investigate the earlier failures"],
            ),
        ),
        DocketError::TransactionInactive { .. } | DocketError::TransactionAlreadyActive => {
            from_entry(
                None,
                fatal(
                    ErrorSeverity::Permanent,
                    "unit of work used outside an active transaction",
                    &["fix the calling code"],
                ),
            )
        }
        DocketError::Storage { .. } => from_entry(
            None,
            fatal(
                ErrorSeverity::Configuration,
                "storage backend failed outside a transaction",
                &["check storage.database_path and disk health"],
            ),
        ),
        _ => from_entry(
            None,
            fatal(ErrorSeverity::Unknown, "unclassified failure", UNKNOWN_HINTS),
        ),
    }
}
