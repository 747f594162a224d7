//! Wiring for one client session
//!
//! A session owns the cache, the transaction log, the query service and the
//! lifecycle manager, all built from [`Settings`] around caller-supplied
//! gateways. It also runs the cache sweeper until shut down.

use crate::api::AppState;
use crate::cache::TtlCache;
use crate::config::Settings;
use crate::error::CoreResult;
use crate::gateway::{ContractGateway, LedgerGateway, Signer};
use crate::query::{QueryConfig, QueryService};
use crate::tx::{ManagerConfig, Operation, Transaction, TransactionLog, TransactionManager};

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// External collaborators a session needs
#[derive(Clone)]
pub struct Gateways {
    pub ledger: Arc<dyn LedgerGateway>,
    pub contract: Arc<dyn ContractGateway>,
    pub signer: Arc<dyn Signer>,
}

pub struct Session {
    cache: Arc<TtlCache>,
    log: Arc<TransactionLog>,
    query: Arc<QueryService>,
    manager: Arc<TransactionManager>,
    sweeper: Option<JoinHandle<()>>,
}

impl Session {
    /// Build every component. Must be called inside a Tokio runtime when the
    /// sweep interval is non-zero.
    pub fn start(settings: &Settings, gateways: Gateways) -> Self {
        let cache = Arc::new(TtlCache::new(settings.cache.default_ttl()));
        let log = Arc::new(TransactionLog::new(settings.lifecycle.log_capacity));

        let query = Arc::new(QueryService::new(
            Arc::clone(&gateways.ledger),
            Arc::clone(&gateways.contract),
            Arc::clone(&cache),
            QueryConfig::from_settings(settings),
        ));

        let manager = Arc::new(TransactionManager::new(
            gateways.ledger,
            gateways.contract,
            gateways.signer,
            Arc::clone(&cache),
            Arc::clone(&query),
            Arc::clone(&log),
            ManagerConfig::from_settings(settings),
        ));

        let sweeper = if settings.cache.sweep_interval_secs > 0 {
            Some(cache.spawn_sweeper(settings.cache.sweep_interval()))
        } else {
            None
        };

        info!(
            "Session started for pool {} (log capacity {})",
            settings.pool.contract_id, settings.lifecycle.log_capacity
        );

        Self {
            cache,
            log,
            query,
            manager,
            sweeper,
        }
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    pub fn log(&self) -> &Arc<TransactionLog> {
        &self.log
    }

    pub fn query(&self) -> &Arc<QueryService> {
        &self.query
    }

    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// Run an operation in the background
    pub fn spawn(&self, operation: Operation) -> JoinHandle<CoreResult<Transaction>> {
        self.manager.spawn(operation)
    }

    /// State for the read-only status API
    pub fn app_state(&self) -> AppState {
        AppState {
            log: Arc::clone(&self.log),
            cache: Arc::clone(&self.cache),
            query: Arc::clone(&self.query),
            default_slippage_percent: self.manager.config().default_slippage_percent,
        }
    }

    /// Stop the sweeper and drop every cached read
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }
        self.cache.clear();
        info!("Session stopped");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }
    }
}
