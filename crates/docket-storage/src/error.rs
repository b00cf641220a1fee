// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Translation of SQLite failures into datastore error codes.
//!
//! The transaction error handler only understands [`ErrorCode`]s, so every
//! SQLite result code a session can produce is mapped onto the closest code
//! here. Busy and locked databases carry the transient label so commits
//! retry them.

use docket_core::datastore::{DatastoreError, ErrorCode};
use docket_core::DocketError;

/// Map a raw rusqlite error to a datastore error.
pub fn from_rusqlite(err: &rusqlite::Error) -> DatastoreError {
    let message = err.to_string();
    let Some(code) = err.sqlite_error_code() else {
        return DatastoreError::new(ErrorCode::Other(-1), message);
    };

    match code {
        rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
            DatastoreError::new(ErrorCode::WriteConflict, message).with_transient_label()
        }
        rusqlite::ErrorCode::CannotOpen | rusqlite::ErrorCode::SystemIoFailure => {
            DatastoreError::new(ErrorCode::HostUnreachable, message)
        }
        rusqlite::ErrorCode::PermissionDenied | rusqlite::ErrorCode::ReadOnly => {
            DatastoreError::new(ErrorCode::Unauthorized, message)
        }
        rusqlite::ErrorCode::AuthorizationForStatementDenied
        | rusqlite::ErrorCode::NotADatabase => {
            DatastoreError::new(ErrorCode::AuthenticationFailed, message)
        }
        rusqlite::ErrorCode::TooBig => DatastoreError::new(ErrorCode::DocumentTooLarge, message),
        rusqlite::ErrorCode::ConstraintViolation => {
            DatastoreError::new(ErrorCode::DuplicateKey, message)
        }
        rusqlite::ErrorCode::OperationInterrupted => {
            DatastoreError::new(ErrorCode::ExceededTimeLimit, message)
        }
        _ => {
            let raw = match err {
                rusqlite::Error::SqliteFailure(e, _) => e.extended_code,
                _ => -1,
            };
            DatastoreError::new(ErrorCode::Other(raw), message)
        }
    }
}

/// Map a tokio-rusqlite call failure on a session connection.
pub fn from_tokio_rusqlite(err: tokio_rusqlite::Error<rusqlite::Error>) -> DatastoreError {
    match err {
        tokio_rusqlite::Error::Error(e) => from_rusqlite(&e),
        tokio_rusqlite::Error::ConnectionClosed => {
            DatastoreError::new(ErrorCode::SessionExpired, "session connection closed")
        }
        other => DatastoreError::new(ErrorCode::SessionExpired, other.to_string()),
    }
}

/// Map a session call failure all the way to the workspace error.
pub fn session_err(err: tokio_rusqlite::Error<rusqlite::Error>) -> DocketError {
    DocketError::Datastore(from_tokio_rusqlite(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(extended: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(extended), None)
    }

    #[test]
    fn busy_is_transient_write_conflict() {
        let err = from_rusqlite(&failure(5));
        assert_eq!(err.code, ErrorCode::WriteConflict);
        assert!(err.transient);
    }

    #[test]
    fn constraint_is_duplicate_key() {
        let err = from_rusqlite(&failure(2067));
        assert_eq!(err.code, ErrorCode::DuplicateKey);
        assert!(!err.transient);
    }

    #[test]
    fn cannot_open_is_host_unreachable() {
        let err = from_rusqlite(&failure(14));
        assert_eq!(err.code, ErrorCode::HostUnreachable);
    }

    #[test]
    fn unknown_code_keeps_extended_code() {
        let err = from_rusqlite(&failure(17));
        assert_eq!(err.code, ErrorCode::Other(17));
    }

    #[test]
    fn non_sqlite_error_is_other() {
        let err = from_rusqlite(&rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(err.code, ErrorCode::Other(-1));
    }

    #[test]
    fn closed_connection_is_session_expired() {
        let err = from_tokio_rusqlite(tokio_rusqlite::Error::ConnectionClosed);
        assert_eq!(err.code, ErrorCode::SessionExpired);
    }
}
