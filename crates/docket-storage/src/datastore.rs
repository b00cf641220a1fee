// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the `Datastore` and `TransactionSession` traits.
//!
//! Each session owns a dedicated connection so its transaction is isolated
//! from every other session. Transaction options map onto SQLite as follows:
//!
//! | option | SQLite |
//! |---|---|
//! | read concern `local` | `BEGIN DEFERRED` |
//! | read concern `majority` / `snapshot` | `BEGIN IMMEDIATE` |
//! | write concern `majority` | `PRAGMA synchronous = FULL` |
//! | write concern `acknowledged` | `PRAGMA synchronous = NORMAL` |
//! | `max_commit_time` | `PRAGMA busy_timeout` |

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, warn};

use docket_config::model::StorageConfig;
use docket_core::datastore::{
    DatastoreError, ErrorCode, ReadConcern, TransactionOptions, WriteConcern,
};
use docket_core::traits::{Datastore, TransactionSession};
use docket_core::types::HealthStatus;
use docket_core::DocketError;

use crate::database::{apply_pragmas, map_tr_err, Database};
use crate::error::{from_rusqlite, from_tokio_rusqlite};

/// SQLite-backed datastore.
pub struct SqliteDatastore {
    path: String,
    wal_mode: bool,
    db: Database,
}

impl SqliteDatastore {
    /// Open the database described by `config`, running migrations.
    pub async fn open(config: &StorageConfig) -> Result<Self, DocketError> {
        let db = Database::open_with(&config.database_path, config.wal_mode).await?;
        debug!(path = %config.database_path, "SQLite datastore ready");
        Ok(Self {
            path: config.database_path.clone(),
            wal_mode: config.wal_mode,
            db,
        })
    }

    /// The primary connection, shared with the compensation ledger.
    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Checkpoint and close the primary connection.
    pub async fn close(self) -> Result<(), DocketError> {
        self.db.close().await
    }
}

#[async_trait]
impl Datastore for SqliteDatastore {
    type Session = SqliteSession;

    fn name(&self) -> &str {
        "sqlite"
    }

    async fn start_session(&self) -> Result<SqliteSession, DatastoreError> {
        let conn = tokio_rusqlite::Connection::open(&self.path)
            .await
            .map_err(|e| DatastoreError::new(ErrorCode::HostUnreachable, e.to_string()))?;
        let wal_mode = self.wal_mode;
        conn.call(move |conn| -> Result<(), rusqlite::Error> { apply_pragmas(conn, wal_mode) })
            .await
            .map_err(from_tokio_rusqlite)?;

        let id = uuid::Uuid::new_v4().to_string();
        debug!(session_id = %id, "session started");
        Ok(SqliteSession {
            id,
            conn,
            in_tx: AtomicBool::new(false),
            ended: AtomicBool::new(false),
        })
    }

    async fn health_check(&self) -> Result<HealthStatus, DocketError> {
        self.db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }
}

/// A session on a dedicated SQLite connection.
pub struct SqliteSession {
    id: String,
    conn: tokio_rusqlite::Connection,
    in_tx: AtomicBool,
    ended: AtomicBool,
}

impl SqliteSession {
    /// The connection repositories run their statements on.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    fn ensure_open(&self) -> Result<(), DatastoreError> {
        if self.ended.load(Ordering::SeqCst) {
            return Err(DatastoreError::new(
                ErrorCode::SessionExpired,
                format!("session {} has ended", self.id),
            ));
        }
        Ok(())
    }
}

fn begin_statement(options: &TransactionOptions) -> String {
    let synchronous = match options.write_concern {
        WriteConcern::Majority => "FULL",
        WriteConcern::Acknowledged => "NORMAL",
    };
    let begin = match options.read_concern {
        ReadConcern::Local => "BEGIN DEFERRED",
        ReadConcern::Majority | ReadConcern::Snapshot => "BEGIN IMMEDIATE",
    };
    format!(
        "PRAGMA synchronous = {synchronous};\nPRAGMA busy_timeout = {};\n{begin};",
        options.max_commit_time.as_millis()
    )
}

#[async_trait]
impl TransactionSession for SqliteSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn in_transaction(&self) -> bool {
        self.in_tx.load(Ordering::SeqCst)
    }

    async fn start_transaction(&self, options: &TransactionOptions) -> Result<(), DatastoreError> {
        self.ensure_open()?;
        if self.in_transaction() {
            return Err(DatastoreError::new(
                ErrorCode::Other(-1),
                "transaction already in progress on this session",
            ));
        }
        let sql = begin_statement(options);
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> { conn.execute_batch(&sql) })
            .await
            .map_err(from_tokio_rusqlite)?;
        self.in_tx.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<(), DatastoreError> {
        self.ensure_open()?;
        if !self.in_transaction() {
            return Err(DatastoreError::new(
                ErrorCode::NoSuchTransaction,
                "no transaction to commit",
            ));
        }
        // A busy COMMIT leaves the transaction open and can be retried;
        // other failures may roll it back, which is visible via autocommit.
        let (result, autocommit) = self
            .conn
            .call(|conn| -> Result<_, rusqlite::Error> {
                let result = conn.execute_batch("COMMIT;");
                Ok((result, conn.is_autocommit()))
            })
            .await
            .map_err(from_tokio_rusqlite)?;
        self.in_tx.store(!autocommit, Ordering::SeqCst);
        result.map_err(|e| from_rusqlite(&e))
    }

    async fn abort_transaction(&self) -> Result<(), DatastoreError> {
        if !self.in_transaction() {
            return Ok(());
        }
        self.in_tx.store(false, Ordering::SeqCst);
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                if !conn.is_autocommit() {
                    conn.execute_batch("ROLLBACK;")?;
                }
                Ok(())
            })
            .await
            .map_err(from_tokio_rusqlite)
    }

    async fn end_session(&self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.in_tx.swap(false, Ordering::SeqCst) {
            let result = self
                .conn
                .call(|conn| -> Result<(), rusqlite::Error> {
                    if !conn.is_autocommit() {
                        conn.execute_batch("ROLLBACK;")?;
                    }
                    Ok(())
                })
                .await;
            if let Err(e) = result {
                warn!(session_id = %self.id, error = %e, "rollback on session end failed");
            }
        }
        debug!(session_id = %self.id, "session ended");
    }
}
