// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed document repositories that run inside a unit-of-work session.

use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use docket_core::traits::{Repository, SessionAware, SessionSlot};
use docket_core::DocketError;

use crate::datastore::{SqliteDatastore, SqliteSession};
use crate::error::session_err;

/// A JSON document stored in a named collection.
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection the document lives in.
    const COLLECTION: &'static str;

    /// Primary key within the collection.
    fn id(&self) -> String;
}

/// Repository over one [`Document`] collection.
///
/// Every call runs on the attached session's connection, so writes are part
/// of the unit of work's transaction and vanish on rollback.
pub struct CollectionRepository<T> {
    slot: SessionSlot<SqliteSession>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Document> CollectionRepository<T> {
    pub fn new() -> Self {
        Self {
            slot: SessionSlot::new(),
            _marker: PhantomData,
        }
    }

    fn active_session(&self, operation: &'static str) -> Result<Arc<SqliteSession>, DocketError> {
        self.slot
            .get()
            .ok_or(DocketError::TransactionInactive { operation })
    }

    /// Insert a new document. Fails with a duplicate-key datastore error if
    /// the id is taken.
    pub async fn insert(&self, doc: &T) -> Result<(), DocketError> {
        let session = self.active_session("insert")?;
        let id = doc.id();
        let body = serde_json::to_string(doc).map_err(|e| DocketError::Internal(e.to_string()))?;
        session
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
                    params![T::COLLECTION, id, body],
                )?;
                Ok(())
            })
            .await
            .map_err(session_err)
    }

    /// Insert or replace a document.
    pub async fn upsert(&self, doc: &T) -> Result<(), DocketError> {
        let session = self.active_session("upsert")?;
        let id = doc.id();
        let body = serde_json::to_string(doc).map_err(|e| DocketError::Internal(e.to_string()))?;
        session
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)
                     ON CONFLICT (collection, id) DO UPDATE SET
                       body = excluded.body,
                       updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    params![T::COLLECTION, id, body],
                )?;
                Ok(())
            })
            .await
            .map_err(session_err)
    }

    pub async fn get(&self, id: &str) -> Result<Option<T>, DocketError> {
        let session = self.active_session("get")?;
        let id = id.to_string();
        let body: Option<String> = session
            .connection()
            .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
                conn.query_row(
                    "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                    params![T::COLLECTION, id],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(session_err)?;
        body.map(|b| decode(&b)).transpose()
    }

    /// Delete by id. Returns whether a document was removed.
    pub async fn delete(&self, id: &str) -> Result<bool, DocketError> {
        let session = self.active_session("delete")?;
        let id = id.to_string();
        let removed = session
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                    params![T::COLLECTION, id],
                )
            })
            .await
            .map_err(session_err)?;
        Ok(removed > 0)
    }

    /// All documents in the collection, ordered by id.
    pub async fn list(&self) -> Result<Vec<T>, DocketError> {
        let session = self.active_session("list")?;
        let bodies = session
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn
                    .prepare("SELECT body FROM documents WHERE collection = ?1 ORDER BY id")?;
                let rows = stmt.query_map(params![T::COLLECTION], |row| row.get(0))?;
                rows.collect()
            })
            .await
            .map_err(session_err)?;
        bodies.iter().map(|b| decode(b)).collect()
    }
}

fn decode<T: Document>(body: &str) -> Result<T, DocketError> {
    serde_json::from_str(body).map_err(|e| {
        DocketError::Internal(format!("corrupt document in `{}`: {e}", T::COLLECTION))
    })
}

impl<T: Document> Default for CollectionRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Document> SessionAware<SqliteSession> for CollectionRepository<T> {
    fn set_session(&self, session: Option<Weak<SqliteSession>>) {
        self.slot.set(session);
    }

    fn session(&self) -> Option<Arc<SqliteSession>> {
        self.slot.get()
    }
}

impl<T: Document> Repository<SqliteDatastore> for CollectionRepository<T> {
    fn create(_datastore: &Arc<SqliteDatastore>) -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_config::model::StorageConfig;
    use docket_core::datastore::{ErrorCode, TransactionOptions};
    use docket_core::traits::{Datastore, TransactionSession};
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Case {
        number: String,
        client: String,
    }

    impl Document for Case {
        const COLLECTION: &'static str = "cases";
        fn id(&self) -> String {
            self.number.clone()
        }
    }

    fn case(number: &str) -> Case {
        Case {
            number: number.into(),
            client: "Acme".into(),
        }
    }

    async fn setup() -> (SqliteDatastore, Arc<SqliteSession>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            database_path: dir.path().join("docket.db").display().to_string(),
            wal_mode: true,
        };
        let store = SqliteDatastore::open(&config).await.unwrap();
        let session = Arc::new(store.start_session().await.unwrap());
        session
            .start_transaction(&TransactionOptions::default())
            .await
            .unwrap();
        (store, session, dir)
    }

    #[tokio::test]
    async fn detached_repository_refuses_calls() {
        let repo = CollectionRepository::<Case>::new();
        let err = repo.get("1").await.unwrap_err();
        assert!(matches!(err, DocketError::TransactionInactive { operation: "get" }));
    }

    #[tokio::test]
    async fn crud_inside_transaction() {
        let (_store, session, _dir) = setup().await;
        let repo = CollectionRepository::<Case>::new();
        repo.set_session(Some(Arc::downgrade(&session)));

        repo.insert(&case("2024-001")).await.unwrap();
        repo.insert(&case("2024-002")).await.unwrap();
        assert_eq!(repo.get("2024-001").await.unwrap(), Some(case("2024-001")));
        assert_eq!(repo.list().await.unwrap().len(), 2);

        let mut updated = case("2024-001");
        updated.client = "Globex".into();
        repo.upsert(&updated).await.unwrap();
        assert_eq!(repo.get("2024-001").await.unwrap().unwrap().client, "Globex");

        assert!(repo.delete("2024-002").await.unwrap());
        assert!(!repo.delete("2024-002").await.unwrap());
        session.commit_transaction().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_insert_maps_to_duplicate_key() {
        let (_store, session, _dir) = setup().await;
        let repo = CollectionRepository::<Case>::new();
        repo.set_session(Some(Arc::downgrade(&session)));

        repo.insert(&case("2024-001")).await.unwrap();
        let err = repo.insert(&case("2024-001")).await.unwrap_err();
        match err {
            DocketError::Datastore(e) => assert_eq!(e.code, ErrorCode::DuplicateKey),
            other => panic!("expected datastore error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropped_session_detaches_repository() {
        let (_store, session, _dir) = setup().await;
        let repo = CollectionRepository::<Case>::new();
        repo.set_session(Some(Arc::downgrade(&session)));
        drop(session);
        assert!(repo.session().is_none());
        assert!(repo.insert(&case("x")).await.is_err());
    }
}
