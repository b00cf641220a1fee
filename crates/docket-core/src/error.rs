// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Docket reliability layer.

use std::time::Duration;

use thiserror::Error;

use crate::datastore::DatastoreError;
use crate::types::TransactionId;

/// The primary error type used across all Docket crates.
///
/// Variants fall into three families:
/// - **admission** failures (`RateLimited`, `QueueTimeout`, `QueueCleared`,
///   `QueueFull`) are user-facing and never retried by the system;
/// - **transaction** failures (`Datastore`, `Timeout`, `CircuitOpen`,
///   `TransactionFailed`) are classified before being surfaced;
/// - **programming** errors (`TransactionInactive`, `TransactionAlreadyActive`)
///   indicate misuse of the unit of work and fail loudly.
#[derive(Debug, Error)]
pub enum DocketError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors outside of a classified datastore call
    /// (opening files, running migrations).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A classified error raised at the datastore boundary.
    #[error(transparent)]
    Datastore(#[from] DatastoreError),

    /// The actor exceeded its admission budget.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// A queued operation did not complete before its deadline.
    #[error("queued operation {operation_id} timed out after {timeout:?}")]
    QueueTimeout { operation_id: u64, timeout: Duration },

    /// The operation queue was cleared while the operation was outstanding.
    #[error("operation queue cleared")]
    QueueCleared,

    /// The operation queue is at capacity.
    #[error("operation queue full ({capacity} pending)")]
    QueueFull { capacity: usize },

    /// A unit-of-work call that requires an active transaction was made without one.
    #[error("no active transaction for `{operation}`")]
    TransactionInactive { operation: &'static str },

    /// `begin` was called on a unit of work that is already active.
    #[error("transaction already active")]
    TransactionAlreadyActive,

    /// The circuit breaker is refusing attempts against the datastore.
    #[error("circuit breaker open: {failures} failures within {window:?}")]
    CircuitOpen { failures: u32, window: Duration },

    /// A transaction failed terminally and compensation was attempted.
    #[error("transaction {transaction_id} failed: {message}")]
    TransactionFailed {
        transaction_id: TransactionId,
        message: String,
        rollback_succeeded: bool,
    },

    /// The external chat platform rejected a call.
    #[error("platform error: {message}")]
    Platform {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DocketError {
    /// Returns `true` for admission failures the caller must re-submit.
    pub fn is_admission(&self) -> bool {
        matches!(
            self,
            DocketError::RateLimited { .. }
                | DocketError::QueueTimeout { .. }
                | DocketError::QueueCleared
                | DocketError::QueueFull { .. }
        )
    }

    /// Short, end-user facing denial reason.
    ///
    /// Operator detail (codes, recovery hints) stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            DocketError::RateLimited { retry_after } => {
                let secs = retry_after.as_secs_f64().ceil().max(1.0);
                format!("You're doing that too quickly. Try again in {secs:.0}s.")
            }
            DocketError::QueueTimeout { .. } => {
                "The bot is busy and your request timed out. Please try again.".to_string()
            }
            DocketError::QueueCleared => {
                "Your request was cancelled by maintenance. Please try again.".to_string()
            }
            DocketError::QueueFull { .. } => {
                "The bot is overloaded right now. Please try again shortly.".to_string()
            }
            DocketError::CircuitOpen { .. } | DocketError::Datastore(_) => {
                "The database is temporarily unavailable. Please try again later.".to_string()
            }
            DocketError::TransactionFailed { .. } | DocketError::Timeout { .. } => {
                "The change could not be saved and was reverted.".to_string()
            }
            _ => "Something went wrong while processing your request.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::ErrorCode;

    #[test]
    fn admission_failures_are_flagged() {
        assert!(DocketError::QueueCleared.is_admission());
        assert!(DocketError::QueueFull { capacity: 1 }.is_admission());
        assert!(
            DocketError::RateLimited {
                retry_after: Duration::from_secs(1)
            }
            .is_admission()
        );
        assert!(!DocketError::Internal("x".into()).is_admission());
        assert!(
            !DocketError::Datastore(DatastoreError::new(ErrorCode::WriteConflict, "c"))
                .is_admission()
        );
    }

    #[test]
    fn rate_limited_user_message_rounds_up() {
        let err = DocketError::RateLimited {
            retry_after: Duration::from_millis(1200),
        };
        assert!(err.user_message().contains("2s"));
    }

    #[test]
    fn datastore_errors_are_transparent() {
        let err: DocketError = DatastoreError::new(ErrorCode::HostUnreachable, "down").into();
        assert_eq!(err.to_string(), "datastore error 6 (HostUnreachable): down");
    }
}
