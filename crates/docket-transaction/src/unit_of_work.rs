// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Unit of Work: one datastore session and transaction shared by a set of
//! repositories.
//!
//! The unit of work owns the session behind an `Arc`; repositories only get
//! a `Weak`, so once the unit of work releases the session no repository can
//! keep using it.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use docket_config::model::TransactionConfig;
use docket_core::datastore::TransactionOptions;
use docket_core::traits::{Datastore, Repository, SessionAware, TransactionSession};
use docket_core::types::TransactionId;
use docket_core::DocketError;

use crate::classify::classify_datastore_error;

type RepositoryEntry<S> = (Arc<dyn Any + Send + Sync>, Arc<dyn SessionAware<S>>);

/// Scope of one transaction.
pub struct UnitOfWork<D: Datastore> {
    id: TransactionId,
    datastore: Arc<D>,
    options: TransactionOptions,
    commit_max_attempts: u32,
    commit_base_delay: Duration,
    session: Option<Arc<D::Session>>,
    repositories: HashMap<TypeId, RepositoryEntry<D::Session>>,
}

impl<D: Datastore> UnitOfWork<D> {
    pub fn new(
        id: TransactionId,
        datastore: Arc<D>,
        options: TransactionOptions,
        commit_max_attempts: u32,
        commit_base_delay: Duration,
    ) -> Self {
        Self {
            id,
            datastore,
            options,
            commit_max_attempts: commit_max_attempts.max(1),
            commit_base_delay,
            session: None,
            repositories: HashMap::new(),
        }
    }

    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    pub fn options(&self) -> &TransactionOptions {
        &self.options
    }

    /// Whether a session with an open transaction is held.
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<Arc<D::Session>> {
        self.session.clone()
    }

    /// Open a session and start a transaction, then hand the session to
    /// every registered repository.
    pub async fn begin(&mut self) -> Result<(), DocketError> {
        if self.session.is_some() {
            return Err(DocketError::TransactionAlreadyActive);
        }

        let session = self.datastore.start_session().await?;
        if let Err(e) = session.start_transaction(&self.options).await {
            session.end_session().await;
            return Err(e.into());
        }

        let session = Arc::new(session);
        for (_, repo) in self.repositories.values() {
            repo.set_session(Some(Arc::downgrade(&session)));
        }
        debug!(
            transaction_id = %self.id,
            session_id = session.id(),
            datastore = self.datastore.name(),
            read_concern = %self.options.read_concern,
            write_concern = %self.options.write_concern,
            "transaction started"
        );
        self.session = Some(session);
        Ok(())
    }

    /// Commit, retrying transient commit failures with exponential backoff.
    ///
    /// The session is released whether the commit succeeds or finally fails.
    pub async fn commit(&mut self) -> Result<(), DocketError> {
        let session = self
            .session
            .clone()
            .ok_or(DocketError::TransactionInactive { operation: "commit" })?;

        let mut attempt = 1;
        let result = loop {
            match session.commit_transaction().await {
                Ok(()) => break Ok(()),
                Err(e) => {
                    let info = classify_datastore_error(&e);
                    let can_retry = info.retryable
                        && attempt < self.commit_max_attempts
                        && session.in_transaction();
                    if !can_retry {
                        break Err(e);
                    }
                    let delay = self
                        .commit_base_delay
                        .saturating_mul(1u32 << (attempt - 1).min(31));
                    warn!(
                        transaction_id = %self.id,
                        attempt,
                        code = %e.code,
                        ?delay,
                        "transient commit failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        };

        match &result {
            Ok(()) => info!(transaction_id = %self.id, attempts = attempt, "transaction committed"),
            Err(e) => {
                error!(transaction_id = %self.id, attempts = attempt, error = %e, "commit failed");
                if let Err(abort_err) = session.abort_transaction().await {
                    warn!(transaction_id = %self.id, error = %abort_err, "abort after failed commit failed");
                }
            }
        }

        drop(session);
        self.release().await;
        result.map_err(DocketError::from)
    }

    /// Abort the transaction and release the session. Never fails.
    pub async fn rollback(&mut self) {
        let Some(session) = self.session.clone() else {
            return;
        };
        match session.abort_transaction().await {
            Ok(()) => info!(transaction_id = %self.id, "transaction rolled back"),
            Err(e) => warn!(transaction_id = %self.id, error = %e, "rollback failed"),
        }
        drop(session);
        self.release().await;
    }

    /// Roll back if still active and detach every repository.
    pub async fn dispose(&mut self) {
        if self.session.is_some() {
            self.rollback().await;
        }
        self.detach_repositories();
    }

    /// The repository of type `R`, created on first use and bound to the
    /// active session.
    pub fn get_repository<R>(&mut self) -> Result<Arc<R>, DocketError>
    where
        R: Repository<D>,
    {
        let session = self.session.as_ref().ok_or(DocketError::TransactionInactive {
            operation: "get_repository",
        })?;

        let key = TypeId::of::<R>();
        if let Some((any, _)) = self.repositories.get(&key) {
            return Arc::clone(any).downcast::<R>().map_err(|_| {
                DocketError::Internal(format!(
                    "repository slot for {} holds another type",
                    std::any::type_name::<R>()
                ))
            });
        }

        let repo = Arc::new(R::create(&self.datastore));
        repo.set_session(Some(Arc::downgrade(session)));
        let any: Arc<dyn Any + Send + Sync> = repo.clone();
        let aware: Arc<dyn SessionAware<D::Session>> = repo.clone();
        self.repositories.insert(key, (any, aware));
        Ok(repo)
    }

    /// Register an externally constructed repository. It receives the
    /// session immediately if the unit of work is active.
    pub fn register_repository<R>(&mut self, repo: Arc<R>)
    where
        R: SessionAware<D::Session>,
    {
        if let Some(session) = &self.session {
            repo.set_session(Some(Arc::downgrade(session)));
        }
        let any: Arc<dyn Any + Send + Sync> = repo.clone();
        let aware: Arc<dyn SessionAware<D::Session>> = repo;
        self.repositories.insert(TypeId::of::<R>(), (any, aware));
    }

    async fn release(&mut self) {
        self.detach_repositories();
        if let Some(session) = self.session.take() {
            session.end_session().await;
        }
    }

    fn detach_repositories(&self) {
        for (_, repo) in self.repositories.values() {
            repo.set_session(None);
        }
    }
}

impl<D: Datastore> Drop for UnitOfWork<D> {
    fn drop(&mut self) {
        if self.session.is_some() {
            warn!(transaction_id = %self.id, "unit of work dropped while active");
            self.detach_repositories();
        }
    }
}

/// Builds units of work with the configured defaults.
pub struct UnitOfWorkFactory<D: Datastore> {
    datastore: Arc<D>,
    defaults: TransactionOptions,
    commit_max_attempts: u32,
    commit_base_delay: Duration,
}

impl<D: Datastore> Clone for UnitOfWorkFactory<D> {
    fn clone(&self) -> Self {
        Self {
            datastore: Arc::clone(&self.datastore),
            defaults: self.defaults.clone(),
            commit_max_attempts: self.commit_max_attempts,
            commit_base_delay: self.commit_base_delay,
        }
    }
}

impl<D: Datastore> UnitOfWorkFactory<D> {
    pub fn new(datastore: Arc<D>, config: &TransactionConfig) -> Self {
        Self {
            datastore,
            defaults: config.options(),
            commit_max_attempts: config.commit_max_attempts,
            commit_base_delay: config.commit_base_delay(),
        }
    }

    pub fn datastore(&self) -> &Arc<D> {
        &self.datastore
    }

    /// A unit of work with a fresh transaction id.
    pub fn create(&self, options: Option<TransactionOptions>) -> UnitOfWork<D> {
        self.create_with_id(TransactionId::generate(), options)
    }

    /// A unit of work reusing `id`, so retried attempts share compensations.
    pub fn create_with_id(
        &self,
        id: TransactionId,
        options: Option<TransactionOptions>,
    ) -> UnitOfWork<D> {
        UnitOfWork::new(
            id,
            Arc::clone(&self.datastore),
            options.unwrap_or_else(|| self.defaults.clone()),
            self.commit_max_attempts,
            self.commit_base_delay,
        )
    }
}
