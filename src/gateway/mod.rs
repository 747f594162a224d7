//! Gateway module - the remote services the core drives
//!
//! This module provides:
//! - `LedgerGateway` for account loads and classic payments
//! - `ContractGateway` for contract simulation, submission and events
//! - `Signer` for wallet signatures
//!
//! Concrete clients live outside the core. Every failure crosses the boundary
//! as a [`RawError`] and is classified by the caller.

pub mod types;

pub use types::{
    AccountInfo, Balance, ContractCall, ContractEventRecord, EventFilter, LedgerSubmission,
    LedgerTransaction, ScValue, SendResponse, SendStatus, SignedEnvelope, Simulation,
    TransactionLookup, UnsignedEnvelope,
};

use crate::error::RawError;

use async_trait::async_trait;

/// Ledger ("Horizon" style) gateway
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn load_account(&self, address: &str) -> Result<AccountInfo, RawError>;

    async fn build_native_payment(
        &self,
        source: &AccountInfo,
        destination: &str,
        amount: i128,
    ) -> Result<UnsignedEnvelope, RawError>;

    async fn submit(&self, envelope: &SignedEnvelope) -> Result<LedgerSubmission, RawError>;

    /// `Ok(None)` while the transaction is not yet known to the gateway
    async fn get_transaction_by_hash(
        &self,
        hash: &str,
    ) -> Result<Option<LedgerTransaction>, RawError>;
}

/// Contract ("Soroban RPC" style) gateway
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContractGateway: Send + Sync {
    async fn load_account(&self, address: &str) -> Result<AccountInfo, RawError>;

    async fn build_invocation(
        &self,
        source: &AccountInfo,
        call: &ContractCall,
    ) -> Result<UnsignedEnvelope, RawError>;

    async fn simulate(&self, envelope: &UnsignedEnvelope) -> Result<Simulation, RawError>;

    async fn assemble(
        &self,
        envelope: &UnsignedEnvelope,
        simulation: &Simulation,
    ) -> Result<UnsignedEnvelope, RawError>;

    async fn send_transaction(&self, envelope: &SignedEnvelope) -> Result<SendResponse, RawError>;

    async fn get_transaction(&self, hash: &str) -> Result<TransactionLookup, RawError>;

    async fn get_events(&self, filter: &EventFilter) -> Result<Vec<ContractEventRecord>, RawError>;
}

/// Wallet signer
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(
        &self,
        envelope: &UnsignedEnvelope,
        network_passphrase: &str,
    ) -> Result<SignedEnvelope, RawError>;
}
