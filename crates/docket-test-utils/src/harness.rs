// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness backed by a real SQLite datastore in a temp directory.
//!
//! `TestHarness` opens a migrated database, a datastore for units of work
//! and a persisted compensation ledger, all cleaned up on drop.

use std::sync::Arc;

use docket_config::model::{DocketConfig, StorageConfig};
use docket_core::DocketError;
use docket_storage::{SqliteCompensationLedger, SqliteDatastore};

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: DocketConfig,
    wal_mode: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            config: DocketConfig::default(),
            wal_mode: true,
        }
    }

    /// Start from a custom configuration. The storage path is always
    /// replaced by a temp file.
    pub fn with_config(mut self, config: DocketConfig) -> Self {
        self.config = config;
        self
    }

    /// Use rollback-journal mode instead of WAL.
    pub fn without_wal(mut self) -> Self {
        self.wal_mode = false;
        self
    }

    /// Build the test harness, creating the temp database.
    pub async fn build(self) -> Result<TestHarness, DocketError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| DocketError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");

        let mut config = self.config;
        config.storage = StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: self.wal_mode,
        };

        let datastore = Arc::new(SqliteDatastore::open(&config.storage).await?);
        let ledger = Arc::new(SqliteCompensationLedger::new(datastore.database()));

        Ok(TestHarness {
            datastore,
            ledger,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A temp SQLite environment for integration tests.
pub struct TestHarness {
    /// Datastore for units of work.
    pub datastore: Arc<SqliteDatastore>,
    /// Persisted compensation ledger on the same database.
    pub ledger: Arc<SqliteCompensationLedger>,
    /// Effective configuration, with `storage` pointing at the temp file.
    pub config: DocketConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Count rows in a document collection, outside any transaction.
    pub async fn document_count(&self, collection: &str) -> Result<i64, DocketError> {
        let collection = collection.to_string();
        self.datastore
            .database()
            .connection()
            .call(move |conn| -> Result<i64, rusqlite::Error> {
                conn.query_row(
                    "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                    [collection],
                    |row| row.get(0),
                )
            })
            .await
            .map_err(docket_storage::database::map_tr_err)
    }
}
