//! Bounded, newest-first history of the session's transactions

use super::types::{Transaction, TxId};
use crate::error::{CoreError, CoreResult};

use std::collections::VecDeque;
use tokio::sync::RwLock;
use tracing::debug;

/// Default number of transactions kept
pub const DEFAULT_CAPACITY: usize = 50;

struct LogState {
    /// Newest first
    entries: VecDeque<Transaction>,
    /// Always a member of `entries`, or `None`
    active: Option<TxId>,
}

/// Transaction history shared between the lifecycle manager and readers
pub struct TransactionLog {
    state: RwLock<LogState>,
    capacity: usize,
}

impl TransactionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: RwLock::new(LogState {
                entries: VecDeque::with_capacity(capacity),
                active: None,
            }),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add a transaction as the newest entry and make it active, evicting the
    /// oldest entries past capacity
    pub async fn insert(&self, tx: Transaction) {
        let mut state = self.state.write().await;
        state.active = Some(tx.id);
        state.entries.push_front(tx);

        while state.entries.len() > self.capacity {
            if let Some(evicted) = state.entries.pop_back() {
                debug!("Evicted transaction {} from the log", evicted.id);
                if state.active == Some(evicted.id) {
                    state.active = None;
                }
            }
        }
    }

    /// Mutate one entry in place
    pub async fn update<R>(&self, id: TxId, f: impl FnOnce(&mut Transaction) -> R) -> CoreResult<R> {
        let mut state = self.state.write().await;
        state
            .entries
            .iter_mut()
            .find(|tx| tx.id == id)
            .map(f)
            .ok_or(CoreError::TransactionNotFound { tx_id: id })
    }

    pub async fn get(&self, id: TxId) -> Option<Transaction> {
        self.state
            .read()
            .await
            .entries
            .iter()
            .find(|tx| tx.id == id)
            .cloned()
    }

    /// Snapshot, newest first
    pub async fn list(&self) -> Vec<Transaction> {
        self.state.read().await.entries.iter().cloned().collect()
    }

    pub async fn active(&self) -> Option<Transaction> {
        let state = self.state.read().await;
        let id = state.active?;
        state.entries.iter().find(|tx| tx.id == id).cloned()
    }

    /// Transactions not yet terminal
    pub async fn in_flight(&self) -> Vec<Transaction> {
        self.state
            .read()
            .await
            .entries
            .iter()
            .filter(|tx| !tx.is_terminal())
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.active = None;
    }
}

impl Default for TransactionLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
