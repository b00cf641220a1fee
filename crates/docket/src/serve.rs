// SPDX-FileCopyrightText: 2026 Docket Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `docket serve`: assemble the reliability services and run until shutdown.

use std::sync::Arc;
use std::time::Duration;

use docket_config::model::DocketConfig;
use docket_core::traits::CompensationLedger;
use docket_core::DocketError;
use docket_resilience::{AdmissionGate, CircuitBreaker, OperationQueue, RateLimiter, RetryPolicy};
use docket_storage::{SqliteCompensationLedger, SqliteDatastore};
use docket_transaction::{
    RollbackService, TransactionErrorHandler, TransactionRunner, UnitOfWorkFactory,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::shutdown;

/// The assembled service graph a command dispatcher runs against.
pub struct Services {
    pub gate: AdmissionGate,
    pub runner: Arc<TransactionRunner<SqliteDatastore>>,
    datastore: Arc<SqliteDatastore>,
}

impl Services {
    /// Wire every service from `config` on top of an opened datastore.
    pub fn build(config: &DocketConfig, datastore: Arc<SqliteDatastore>) -> Self {
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let queue = OperationQueue::new(&config.queue);
        let gate = AdmissionGate::new(limiter, queue);

        let mut rollback = RollbackService::new(&config.rollback);
        if config.rollback.ledger_enabled {
            let ledger: Arc<dyn CompensationLedger> =
                Arc::new(SqliteCompensationLedger::new(datastore.database()));
            rollback = rollback.with_ledger(ledger);
            debug!("compensation ledger enabled");
        }

        let handler = TransactionErrorHandler::new(
            RetryPolicy::from_config(&config.retry),
            Arc::new(CircuitBreaker::new(&config.circuit_breaker)),
            Arc::new(rollback),
        );
        let factory = UnitOfWorkFactory::new(Arc::clone(&datastore), &config.transaction);
        let runner = Arc::new(TransactionRunner::new(factory, Arc::new(handler)));

        Self {
            gate,
            runner,
            datastore,
        }
    }

    /// Start the periodic rate-limit sweep.
    pub fn spawn_sweeper(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        Arc::clone(self.gate.limiter()).spawn_sweeper(interval, cancel)
    }

    /// Reject queued work and close storage.
    pub async fn shutdown(self) -> Result<(), DocketError> {
        let cleared = self.gate.queue().clear_queue();
        if cleared > 0 {
            info!(cleared, "rejected queued operations on shutdown");
        }

        let Self {
            gate,
            runner,
            datastore,
        } = self;
        drop(runner);
        drop(gate);

        match Arc::try_unwrap(datastore) {
            Ok(datastore) => datastore.close().await,
            Err(_) => {
                warn!("datastore still shared at shutdown, skipping checkpoint");
                Ok(())
            }
        }
    }
}

/// Runs the `docket serve` command until SIGINT or SIGTERM.
pub async fn run_serve(config: DocketConfig) -> Result<(), DocketError> {
    init_tracing(&config.bot.log_level);
    info!(bot = %config.bot.name, "starting docket");

    let _prometheus_adapter = if config.prometheus.enabled {
        match docket_prometheus::PrometheusAdapter::new() {
            Ok(adapter) => {
                info!("prometheus metrics enabled");
                Some(adapter)
            }
            Err(e) => {
                warn!(error = %e, "prometheus initialization failed, continuing without metrics");
                None
            }
        }
    } else {
        debug!("prometheus metrics disabled by configuration");
        None
    };

    let datastore = Arc::new(SqliteDatastore::open(&config.storage).await?);
    info!(path = %datastore.path(), "storage ready");

    let services = Services::build(&config, datastore);
    let cancel = shutdown::install_signal_handler();
    let sweeper = services.spawn_sweeper(
        Duration::from_secs(config.rate_limit.sweep_interval_secs),
        cancel.clone(),
    );

    info!("docket ready");
    cancel.cancelled().await;

    if let Err(e) = sweeper.await {
        warn!(error = %e, "rate-limit sweeper ended abnormally");
    }
    services.shutdown().await?;
    info!("docket stopped");
    Ok(())
}

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise Docket crates log at `log_level`
/// and everything else at `warn`.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("docket={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
