// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs a transactional operation end to end: retry, commit, rollback.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info};

use docket_core::traits::Datastore;
use docket_core::types::{OperationContext, TransactionId};
use docket_core::DocketError;

use crate::error_handler::TransactionErrorHandler;
use crate::rollback::RollbackService;
use crate::unit_of_work::{UnitOfWork, UnitOfWorkFactory};

/// Glue between the unit-of-work factory and the error handler.
///
/// Every attempt of one `run` gets a fresh [`UnitOfWork`] sharing a single
/// transaction id, so compensations registered by any attempt belong to the
/// same plan.
pub struct TransactionRunner<D: Datastore> {
    factory: UnitOfWorkFactory<D>,
    handler: Arc<TransactionErrorHandler>,
}

impl<D: Datastore> TransactionRunner<D> {
    pub fn new(factory: UnitOfWorkFactory<D>, handler: Arc<TransactionErrorHandler>) -> Self {
        Self { factory, handler }
    }

    pub fn factory(&self) -> &UnitOfWorkFactory<D> {
        &self.factory
    }

    pub fn handler(&self) -> &Arc<TransactionErrorHandler> {
        &self.handler
    }

    pub fn rollback_service(&self) -> &Arc<RollbackService> {
        self.handler.rollback_service()
    }

    /// Run `op` inside a transaction.
    ///
    /// `op` receives an active unit of work and may register compensations
    /// under [`UnitOfWork::id`]. The runner commits on success. On terminal
    /// failure it rolls back, runs the compensation plan and returns
    /// [`DocketError::TransactionFailed`].
    pub async fn run<T, F>(
        &self,
        name: &str,
        ctx: &OperationContext,
        op: F,
    ) -> Result<T, DocketError>
    where
        T: Send,
        F: for<'a> Fn(&'a mut UnitOfWork<D>) -> BoxFuture<'a, Result<T, DocketError>>
            + Send
            + Sync,
    {
        let transaction_id = TransactionId::generate();
        debug!(transaction_id = %transaction_id, operation = name, "transaction run started");

        let factory = &self.factory;
        let op = &op;
        let tx = &transaction_id;
        let outcome = self
            .handler
            .execute_with_retry(
                move || async move {
                    let mut uow = factory.create_with_id(tx.clone(), None);
                    uow.begin().await?;
                    match op(&mut uow).await {
                        Ok(value) => {
                            uow.commit().await?;
                            Ok(value)
                        }
                        Err(e) => {
                            uow.dispose().await;
                            Err(e)
                        }
                    }
                },
                name,
                ctx,
            )
            .await;

        match outcome.outcome {
            Ok(value) => {
                self.rollback_service().clear_transaction(&transaction_id).await;
                info!(
                    transaction_id = %transaction_id,
                    operation = name,
                    attempts = outcome.attempts,
                    "transaction run succeeded"
                );
                Ok(value)
            }
            Err(err) => {
                let mut uow = self.factory.create_with_id(transaction_id.clone(), None);
                let report = self
                    .handler
                    .handle_transaction_error(&err, &mut uow, name, ctx)
                    .await;
                if report.rollback.success {
                    self.rollback_service().forget_plan(&transaction_id);
                }
                Err(DocketError::TransactionFailed {
                    transaction_id,
                    message: err.to_string(),
                    rollback_succeeded: report.rollback.success,
                })
            }
        }
    }
}
