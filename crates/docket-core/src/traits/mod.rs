// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between the reliability core and its collaborators.
//!
//! The datastore driver, repositories, the external chat platform, and the
//! compensation ledger are all consumed through these traits so the core can
//! be exercised against SQLite in production and mocks in tests.

pub mod datastore;
pub mod ledger;
pub mod repository;
pub mod role_gateway;

pub use datastore::{Datastore, TransactionSession};
pub use ledger::{CompensationLedger, LedgerStatus};
pub use repository::{Repository, SessionAware, SessionSlot};
pub use role_gateway::RoleGateway;
