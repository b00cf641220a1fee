// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Datastore boundary types.
//!
//! Every driver error is converted exactly once into a [`DatastoreError`]
//! carrying a closed [`ErrorCode`]. Downstream code (classification, retry,
//! circuit breaking) switches on the enum and never inspects messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Closed set of datastore failure codes.
///
/// Numeric values follow the document-store server codes the firm's
/// datastore reports, so logs line up with driver documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ErrorCode {
    HostUnreachable,
    HostNotFound,
    Unauthorized,
    AuthenticationFailed,
    ExceededTimeLimit,
    NetworkTimeout,
    ShutdownInProgress,
    WriteConflict,
    PrimarySteppedDown,
    SessionExpired,
    TransactionTooOld,
    NoSuchTransaction,
    TransactionTooLarge,
    DuplicateKey,
    NotWritablePrimary,
    InterruptedDueToReplStateChange,
    DocumentTooLarge,
    /// A code the boundary does not recognize.
    Other(i32),
}

impl ErrorCode {
    /// Numeric code as reported by the server.
    pub fn code(self) -> i32 {
        match self {
            ErrorCode::HostUnreachable => 6,
            ErrorCode::HostNotFound => 7,
            ErrorCode::Unauthorized => 13,
            ErrorCode::AuthenticationFailed => 18,
            ErrorCode::ExceededTimeLimit => 50,
            ErrorCode::NetworkTimeout => 89,
            ErrorCode::ShutdownInProgress => 91,
            ErrorCode::WriteConflict => 112,
            ErrorCode::PrimarySteppedDown => 189,
            ErrorCode::SessionExpired => 206,
            ErrorCode::TransactionTooOld => 225,
            ErrorCode::NoSuchTransaction => 251,
            ErrorCode::TransactionTooLarge => 257,
            ErrorCode::DuplicateKey => 11000,
            ErrorCode::NotWritablePrimary => 10107,
            ErrorCode::InterruptedDueToReplStateChange => 11602,
            ErrorCode::DocumentTooLarge => 10334,
            ErrorCode::Other(code) => code,
        }
    }

    /// Map a numeric server code back to the closed enum.
    pub fn from_code(code: i32) -> Self {
        match code {
            6 => ErrorCode::HostUnreachable,
            7 => ErrorCode::HostNotFound,
            13 => ErrorCode::Unauthorized,
            18 => ErrorCode::AuthenticationFailed,
            50 => ErrorCode::ExceededTimeLimit,
            89 => ErrorCode::NetworkTimeout,
            91 => ErrorCode::ShutdownInProgress,
            112 => ErrorCode::WriteConflict,
            189 => ErrorCode::PrimarySteppedDown,
            206 => ErrorCode::SessionExpired,
            225 => ErrorCode::TransactionTooOld,
            251 => ErrorCode::NoSuchTransaction,
            257 => ErrorCode::TransactionTooLarge,
            11000 => ErrorCode::DuplicateKey,
            10107 => ErrorCode::NotWritablePrimary,
            11602 => ErrorCode::InterruptedDueToReplStateChange,
            10334 => ErrorCode::DocumentTooLarge,
            other => ErrorCode::Other(other),
        }
    }
}

/// An error raised by the datastore driver, classified at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("datastore error {} ({code}): {message}", code.code())]
pub struct DatastoreError {
    /// Closed failure code.
    pub code: ErrorCode,
    /// Set when the driver labels the error as a transient transaction error.
    pub transient: bool,
    /// Driver message, kept for operator logs only.
    pub message: String,
}

impl DatastoreError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            transient: false,
            message: message.into(),
        }
    }

    /// Attach the driver's "transient transaction error" label.
    pub fn with_transient_label(mut self) -> Self {
        self.transient = true;
        self
    }
}

/// Read guarantee requested for a transaction.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReadConcern {
    Local,
    Majority,
    #[default]
    Snapshot,
}

/// Write guarantee requested for a transaction.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WriteConcern {
    Acknowledged,
    #[default]
    Majority,
}

/// Options applied when a unit of work starts its transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOptions {
    pub read_concern: ReadConcern,
    pub write_concern: WriteConcern,
    /// Upper bound on server-side commit time.
    pub max_commit_time: Duration,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            read_concern: ReadConcern::Snapshot,
            write_concern: WriteConcern::Majority,
            max_commit_time: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn known_codes_map_back() {
        for code in [
            ErrorCode::WriteConflict,
            ErrorCode::NotWritablePrimary,
            ErrorCode::HostUnreachable,
            ErrorCode::DocumentTooLarge,
        ] {
            assert_eq!(ErrorCode::from_code(code.code()), code);
        }
    }

    #[test]
    fn concerns_parse_lowercase() {
        use std::str::FromStr;
        assert_eq!(ReadConcern::from_str("local").unwrap(), ReadConcern::Local);
        assert_eq!(WriteConcern::Majority.to_string(), "majority");
    }

    proptest! {
        #[test]
        fn from_code_preserves_numeric_value(code in any::<i32>()) {
            prop_assert_eq!(ErrorCode::from_code(code).code(), code);
        }
    }
}
