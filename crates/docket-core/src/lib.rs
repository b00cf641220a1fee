// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Docket reliability layer.
//!
//! This crate provides the error taxonomy, identifiers, the injectable clock,
//! and the trait seams (datastore sessions, repositories, role gateway,
//! compensation ledger) used throughout the Docket workspace.

pub mod clock;
pub mod datastore;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use clock::{Clock, ManualClock, SystemClock};
pub use datastore::{DatastoreError, ErrorCode, ReadConcern, TransactionOptions, WriteConcern};
pub use error::DocketError;
pub use types::{ActorId, HealthStatus, OperationContext, TenantId, TransactionId};

pub use traits::{
    CompensationLedger, Datastore, LedgerStatus, Repository, RoleGateway, SessionAware,
    SessionSlot, TransactionSession,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docket_error_has_all_families() {
        let _config = DocketError::Config("test".into());
        let _storage = DocketError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _datastore = DocketError::Datastore(DatastoreError::new(ErrorCode::WriteConflict, "x"));
        let _inactive = DocketError::TransactionInactive { operation: "commit" };
        let _active = DocketError::TransactionAlreadyActive;
        let _failed = DocketError::TransactionFailed {
            transaction_id: TransactionId::generate(),
            message: "test".into(),
            rollback_succeeded: true,
        };
        let _platform = DocketError::Platform {
            message: "test".into(),
            source: None,
        };
        let _timeout = DocketError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _internal = DocketError::Internal("test".into());
    }

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_datastore<T: Datastore>() {}
        fn _assert_session<T: TransactionSession>() {}
        fn _assert_role_gateway<T: RoleGateway>() {}
        fn _assert_ledger<T: CompensationLedger>() {}
    }
}
