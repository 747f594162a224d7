//! Pool contract event types and parsing
//!
//! The pool publishes `(symbol, user)` topics with a map body:
//! - `swap`: `{ user, token_in, token_out, amount_in, amount_out }`
//! - `add_liq` / `rem_liq`: `{ provider, amount_a, amount_b, shares }`

use crate::error::{CoreError, CoreResult, WalletError, WalletErrorCode};
use crate::gateway::{ContractEventRecord, ScValue};

use serde::{Deserialize, Serialize};

/// Topic symbols emitted by the pool contract
pub mod topics {
    pub const SWAP: &str = "swap";
    pub const ADD_LIQUIDITY: &str = "add_liq";
    pub const REMOVE_LIQUIDITY: &str = "rem_liq";

    pub const ALL: [&str; 3] = [SWAP, ADD_LIQUIDITY, REMOVE_LIQUIDITY];
}

/// Events emitted by the pool contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolEvent {
    /// Tokens swapped through the pool
    Swap {
        id: String,
        ledger: u32,
        tx_hash: String,
        user: String,
        token_in: String,
        token_out: String,
        amount_in: i128,
        amount_out: i128,
    },

    /// Liquidity deposited
    AddLiquidity {
        id: String,
        ledger: u32,
        tx_hash: String,
        provider: String,
        amount_a: i128,
        amount_b: i128,
        shares: i128,
    },

    /// Liquidity withdrawn
    RemoveLiquidity {
        id: String,
        ledger: u32,
        tx_hash: String,
        provider: String,
        amount_a: i128,
        amount_b: i128,
        shares: i128,
    },

    /// Anything else the contract published
    Unknown {
        id: String,
        ledger: u32,
        tx_hash: String,
        topic: Option<String>,
    },
}

impl PoolEvent {
    /// Ledger the event was published in
    pub fn ledger(&self) -> u32 {
        match self {
            PoolEvent::Swap { ledger, .. }
            | PoolEvent::AddLiquidity { ledger, .. }
            | PoolEvent::RemoveLiquidity { ledger, .. }
            | PoolEvent::Unknown { ledger, .. } => *ledger,
        }
    }

    pub fn tx_hash(&self) -> &str {
        match self {
            PoolEvent::Swap { tx_hash, .. }
            | PoolEvent::AddLiquidity { tx_hash, .. }
            | PoolEvent::RemoveLiquidity { tx_hash, .. }
            | PoolEvent::Unknown { tx_hash, .. } => tx_hash,
        }
    }

    /// Get event name for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            PoolEvent::Swap { .. } => "swap",
            PoolEvent::AddLiquidity { .. } => "add_liquidity",
            PoolEvent::RemoveLiquidity { .. } => "remove_liquidity",
            PoolEvent::Unknown { .. } => "unknown",
        }
    }

    /// Account the event concerns, if known
    pub fn account(&self) -> Option<&str> {
        match self {
            PoolEvent::Swap { user, .. } => Some(user),
            PoolEvent::AddLiquidity { provider, .. } | PoolEvent::RemoveLiquidity { provider, .. } => {
                Some(provider)
            }
            PoolEvent::Unknown { .. } => None,
        }
    }

    /// Parse a raw contract event
    pub fn parse(record: &ContractEventRecord) -> CoreResult<Self> {
        let id = record.id.clone();
        let ledger = record.ledger;
        let tx_hash = record.tx_hash.clone();
        let topic = record.topics.first().and_then(ScValue::as_symbol);

        match topic {
            Some(topics::SWAP) => {
                let body = &record.value;
                Ok(PoolEvent::Swap {
                    id,
                    ledger,
                    tx_hash,
                    user: address_field(body, "user", record)?,
                    token_in: address_field(body, "token_in", record)?,
                    token_out: address_field(body, "token_out", record)?,
                    amount_in: amount_field(body, "amount_in", record)?,
                    amount_out: amount_field(body, "amount_out", record)?,
                })
            }
            Some(topics::ADD_LIQUIDITY) | Some(topics::REMOVE_LIQUIDITY) => {
                let body = &record.value;
                let provider = address_field(body, "provider", record)?;
                let amount_a = amount_field(body, "amount_a", record)?;
                let amount_b = amount_field(body, "amount_b", record)?;
                let shares = amount_field(body, "shares", record)?;
                if topic == Some(topics::ADD_LIQUIDITY) {
                    Ok(PoolEvent::AddLiquidity {
                        id,
                        ledger,
                        tx_hash,
                        provider,
                        amount_a,
                        amount_b,
                        shares,
                    })
                } else {
                    Ok(PoolEvent::RemoveLiquidity {
                        id,
                        ledger,
                        tx_hash,
                        provider,
                        amount_a,
                        amount_b,
                        shares,
                    })
                }
            }
            other => Ok(PoolEvent::Unknown {
                id,
                ledger,
                tx_hash,
                topic: other.map(str::to_string),
            }),
        }
    }
}

fn malformed(record: &ContractEventRecord, field: &str) -> CoreError {
    CoreError::Gateway(WalletError::new(
        WalletErrorCode::ContractError,
        format!("event {} is missing field {}", record.id, field),
    ))
}

fn address_field(body: &ScValue, field: &str, record: &ContractEventRecord) -> CoreResult<String> {
    body.field(field)
        .and_then(ScValue::as_address)
        .map(str::to_string)
        .ok_or_else(|| malformed(record, field))
}

fn amount_field(body: &ScValue, field: &str, record: &ContractEventRecord) -> CoreResult<i128> {
    body.field(field)
        .and_then(ScValue::as_i128)
        .ok_or_else(|| malformed(record, field))
}
