// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Docket integration tests.
//!
//! Provides mock collaborators and a temp-database harness for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockDatastore`] - Scripted datastore with buffered writes and counters
//! - [`MockRepository`] - Repository writing through the attached mock session
//! - [`MockRoleGateway`] - Role gateway capturing grants and revocations
//! - [`TestHarness`] - Real SQLite datastore and ledger in a temp directory

pub mod harness;
pub mod mock_datastore;
pub mod mock_repository;
pub mod mock_role_gateway;

pub use harness::TestHarness;
pub use mock_datastore::{MockCounters, MockDatastore, MockSession};
pub use mock_repository::{AuditRepository, MockRepository};
pub use mock_role_gateway::{MockRoleGateway, RoleCall};
