//! Error types for the swap core

pub mod classify;

pub use classify::{
    error_label, is_recoverable_error, parse_error, ContractFailure, ErrorCodeValue, RawError,
    WalletError, WalletErrorCode,
};

use crate::tx::{TxId, TxStatus, ValidationError};
use thiserror::Error;

/// Main error type for the core
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transaction {tx_id} failed validation: {source}")]
    Validation {
        tx_id: TxId,
        #[source]
        source: ValidationError,
    },

    #[error("Transaction {tx_id} failed: {error}")]
    Rejected { tx_id: TxId, error: WalletError },

    #[error("Gateway error: {0}")]
    Gateway(WalletError),

    #[error("Transaction {tx_id} failed on-chain: {hash}")]
    OnChainFailure {
        tx_id: TxId,
        hash: String,
        ledger: Option<u32>,
    },

    #[error("Timeout waiting for confirmation of {hash} after {attempts} attempts")]
    ConfirmationTimeout {
        tx_id: TxId,
        hash: String,
        attempts: u32,
    },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: TxStatus, to: TxStatus },

    #[error("Transaction {tx_id} not found")]
    TransactionNotFound { tx_id: TxId },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Check if a fresh attempt could reasonably succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Rejected { error, .. } | CoreError::Gateway(error) => {
                error.is_recoverable()
            }
            CoreError::OnChainFailure { .. } => true,
            // Outcome unknown; resubmitting risks executing twice
            CoreError::ConfirmationTimeout { .. } => false,
            _ => false,
        }
    }

    /// Taxonomy code for this failure
    pub fn code(&self) -> WalletErrorCode {
        match self {
            CoreError::Validation { source, .. } => source.code(),
            CoreError::Rejected { error, .. } | CoreError::Gateway(error) => error.code,
            CoreError::OnChainFailure { .. } => WalletErrorCode::ContractError,
            _ => WalletErrorCode::Unknown,
        }
    }

    /// Primary human-readable message; never the raw gateway text
    pub fn user_message(&self) -> String {
        match self {
            CoreError::Validation { source, .. } => source.to_string(),
            CoreError::Rejected { error, .. } | CoreError::Gateway(error) => {
                error.message.clone()
            }
            CoreError::OnChainFailure { .. } => "Transaction failed on-chain.".to_string(),
            CoreError::ConfirmationTimeout { .. } => {
                "Transaction was submitted but not confirmed in time. Check a block explorer before retrying."
                    .to_string()
            }
            other => other.to_string(),
        }
    }

    /// Transaction this error belongs to, if any
    pub fn tx_id(&self) -> Option<TxId> {
        match self {
            CoreError::Validation { tx_id, .. }
            | CoreError::Rejected { tx_id, .. }
            | CoreError::OnChainFailure { tx_id, .. }
            | CoreError::ConfirmationTimeout { tx_id, .. }
            | CoreError::TransactionNotFound { tx_id } => Some(*tx_id),
            _ => None,
        }
    }
}

impl From<RawError> for CoreError {
    fn from(raw: RawError) -> Self {
        CoreError::Gateway(parse_error(&raw))
    }
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
