// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end transaction flows against a real SQLite datastore.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use docket_config::model::{DocketConfig, RollbackConfig};
use docket_core::traits::{CompensationLedger, LedgerStatus, RoleGateway};
use docket_core::types::{ActorId, OperationContext, TenantId, TransactionId};
use docket_core::DocketError;
use docket_resilience::{CircuitBreaker, RetryPolicy};
use docket_storage::{CollectionRepository, Document, SqliteDatastore};
use docket_test_utils::{MockRoleGateway, TestHarness};
use docket_transaction::{
    revoke_role_action, RollbackService, TransactionErrorHandler, TransactionRunner,
    UnitOfWorkFactory,
};

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
        client: "Acme Holdings".into(),
    }
}

fn quick_rollback() -> RollbackConfig {
    RollbackConfig {
        base_delay_ms: 5,
        ..RollbackConfig::default()
    }
}

async fn harness() -> TestHarness {
    let mut config = DocketConfig::default();
    config.retry.base_delay_ms = 5;
    config.retry.max_delay_ms = 20;
    config.rollback = quick_rollback();
    TestHarness::builder().with_config(config).build().await.unwrap()
}

fn runner(h: &TestHarness, rollback: Arc<RollbackService>) -> TransactionRunner<SqliteDatastore> {
    let factory = UnitOfWorkFactory::new(Arc::clone(&h.datastore), &h.config.transaction);
    let handler = TransactionErrorHandler::new(
        RetryPolicy::from_config(&h.config.retry),
        Arc::new(CircuitBreaker::new(&h.config.circuit_breaker)),
        rollback,
    );
    TransactionRunner::new(factory, Arc::new(handler))
}

#[tokio::test]
async fn committed_documents_are_visible() {
    let h = harness().await;
    let runner = runner(&h, Arc::new(RollbackService::new(&h.config.rollback)));

    runner
        .run("open-case", &OperationContext::new("guild-1", "clerk-1"), |uow| {
            Box::pin(async move {
                let cases = uow.get_repository::<CollectionRepository<Case>>()?;
                cases.insert(&case("2024-001")).await?;
                cases.insert(&case("2024-002")).await?;
                Ok(())
            })
        })
        .await
        .unwrap();

    assert_eq!(h.document_count("cases").await.unwrap(), 2);
}

#[tokio::test]
async fn failed_transaction_rolls_back_and_revokes_role() {
    let h = harness().await;
    let ledger: Arc<dyn CompensationLedger> = h.ledger.clone();
    let rollback =
        Arc::new(RollbackService::new(&h.config.rollback).with_ledger(Arc::clone(&ledger)));
    let runner = runner(&h, Arc::clone(&rollback));
    let gateway = MockRoleGateway::new();
    let ctx = OperationContext::new("guild-1", "partner-1");

    let gw = gateway.clone();
    let svc = Arc::clone(&rollback);
    let err = runner
        .run("assign-paralegal", &ctx, move |uow| {
            let gw = gw.clone();
            let svc = Arc::clone(&svc);
            Box::pin(async move {
                let tenant = TenantId::from("guild-1");
                let member = ActorId::from("member-7");
                gw.grant_role(&tenant, &member, "paralegal").await?;
                svc.register_compensation_action(
                    uow.id(),
                    revoke_role_action(Arc::new(gw.clone()), tenant, member, "paralegal"),
                );

                let cases = uow.get_repository::<CollectionRepository<Case>>()?;
                cases.insert(&case("2024-010")).await?;
                // Second insert violates the primary key.
                cases.insert(&case("2024-010")).await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();

    let tx = match err {
        DocketError::TransactionFailed {
            transaction_id,
            rollback_succeeded,
            ..
        } => {
            assert!(rollback_succeeded);
            transaction_id
        }
        other => panic!("expected transaction failure, got {other:?}"),
    };

    assert_eq!(h.document_count("cases").await.unwrap(), 0);
    assert_eq!(gateway.granted().await.len(), 1);
    assert_eq!(gateway.revoked().await.len(), 1);
    assert_eq!(
        ledger
            .status(&tx, "revoke-role:guild-1:member-7:paralegal")
            .await
            .unwrap(),
        Some(LedgerStatus::Applied)
    );
}

#[tokio::test]
async fn persisted_ledger_survives_service_restart() {
    let h = harness().await;
    let ledger: Arc<dyn CompensationLedger> = h.ledger.clone();
    let gateway = MockRoleGateway::new();
    gateway.fail_revokes(3).await;
    let tx = TransactionId::from("tx-restart");
    let factory = UnitOfWorkFactory::new(Arc::clone(&h.datastore), &h.config.transaction);

    let plan = |svc: &RollbackService| {
        svc.register_compensation_action(
            &tx,
            revoke_role_action(
                Arc::new(gateway.clone()),
                TenantId::from("guild-1"),
                ActorId::from("member-7"),
                "paralegal",
            ),
        );
    };

    // First process: every attempt fails and the failure is persisted.
    let first = RollbackService::new(&h.config.rollback).with_ledger(Arc::clone(&ledger));
    plan(&first);
    let mut uow = factory.create_with_id(tx.clone(), None);
    let ctx = first.create_rollback_context(&tx, "assign", &OperationContext::default(), "crash");
    let result = first.perform_rollback(&mut uow, &ctx).await;
    assert!(!result.success);
    assert_eq!(
        ledger.status(&tx, "revoke-role:guild-1:member-7:paralegal").await.unwrap(),
        Some(LedgerStatus::Failed)
    );

    // Second process retries the failed compensation.
    let second = RollbackService::new(&h.config.rollback).with_ledger(Arc::clone(&ledger));
    plan(&second);
    let mut uow = factory.create_with_id(tx.clone(), None);
    let result = second.perform_rollback(&mut uow, &ctx).await;
    assert!(result.success);
    assert_eq!(
        result.compensations_executed,
        vec!["revoke-role:guild-1:member-7:paralegal"]
    );

    // Third process finds it applied and skips it.
    let third = RollbackService::new(&h.config.rollback).with_ledger(Arc::clone(&ledger));
    plan(&third);
    let mut uow = factory.create_with_id(tx.clone(), None);
    let result = third.perform_rollback(&mut uow, &ctx).await;
    assert_eq!(result.compensations_skipped, 1);
    assert!(result.compensations_executed.is_empty());
    assert_eq!(gateway.revoked().await.len(), 1);
}
