// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transaction management for Docket.
//!
//! A [`UnitOfWork`] scopes one datastore transaction across repositories.
//! [`TransactionErrorHandler`] retries transient failures behind a circuit
//! breaker and hands terminal failures to the [`RollbackService`], which
//! runs registered [`CompensationAction`]s for effects outside the
//! datastore. [`TransactionRunner`] wires the three together.

pub mod classify;
pub mod compensations;
pub mod error_handler;
pub mod ledger;
pub mod rollback;
pub mod runner;
pub mod unit_of_work;

pub use classify::{classify_error, ErrorSeverity, TransactionErrorInfo};
pub use compensations::revoke_role_action;
pub use error_handler::{RetryOutcome, TransactionErrorHandler, TransactionFailureReport};
pub use ledger::InMemoryLedger;
pub use rollback::{
    CompensationAction, CompensationFailure, RollbackContext, RollbackResult, RollbackService,
};
pub use runner::TransactionRunner;
pub use unit_of_work::{UnitOfWork, UnitOfWorkFactory};
