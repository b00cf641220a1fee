// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Docket bot.
//!
//! Provides a WAL-mode SQLite datastore with embedded migrations, isolated
//! per-session transactions, typed document repositories and the persisted
//! compensation ledger.

pub mod database;
pub mod datastore;
pub mod error;
pub mod ledger;
pub mod migrations;
pub mod repository;

pub use database::Database;
pub use datastore::{SqliteDatastore, SqliteSession};
pub use ledger::SqliteCompensationLedger;
pub use repository::{CollectionRepository, Document};
