//! Request and response shapes exchanged with the gateways
//!
//! Envelopes are opaque to the core: the gateway that built one is the only
//! party that interprets its contents.

use serde::{Deserialize, Serialize};

/// Transaction envelope awaiting a signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedEnvelope {
    pub xdr: String,
}

/// Signed transaction envelope ready for submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub xdr: String,
}

impl UnsignedEnvelope {
    pub fn new(xdr: impl Into<String>) -> Self {
        Self { xdr: xdr.into() }
    }
}

impl SignedEnvelope {
    pub fn new(xdr: impl Into<String>) -> Self {
        Self { xdr: xdr.into() }
    }
}

/// Single balance line of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// `None` for the native asset
    pub asset_code: Option<String>,
    pub asset_issuer: Option<String>,
    /// Amount in stroops
    pub balance: i128,
}

/// Account state needed to build a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub id: String,
    pub sequence: i64,
    pub balances: Vec<Balance>,
}

impl AccountInfo {
    /// Source account for read-only simulations, which never consume a
    /// sequence number
    pub fn for_simulation(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sequence: 0,
            balances: Vec::new(),
        }
    }

    /// Native balance in stroops, zero when the account holds none
    pub fn native_balance(&self) -> i128 {
        self.balances
            .iter()
            .find(|b| b.asset_code.is_none())
            .map(|b| b.balance)
            .unwrap_or(0)
    }
}

/// Contract value, as passed to and returned from invocations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ScValue {
    Void,
    Bool(bool),
    U32(u32),
    I128(i128),
    Symbol(String),
    Address(String),
    Vec(Vec<ScValue>),
    Map(Vec<(String, ScValue)>),
}

impl ScValue {
    pub fn address(address: impl Into<String>) -> Self {
        ScValue::Address(address.into())
    }

    pub fn as_i128(&self) -> Option<i128> {
        match self {
            ScValue::I128(v) => Some(*v),
            ScValue::U32(v) => Some(i128::from(*v)),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            ScValue::U32(v) => Some(*v),
            ScValue::I128(v) => u32::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<&str> {
        match self {
            ScValue::Address(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            ScValue::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_vec(&self) -> Option<&[ScValue]> {
        match self {
            ScValue::Vec(items) => Some(items),
            _ => None,
        }
    }

    /// Named field of a map value
    pub fn field(&self, name: &str) -> Option<&ScValue> {
        match self {
            ScValue::Map(entries) => entries.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }
}

/// Contract function invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    pub contract: String,
    pub function: String,
    pub args: Vec<ScValue>,
}

impl ContractCall {
    pub fn new(contract: impl Into<String>, function: impl Into<String>, args: Vec<ScValue>) -> Self {
        Self {
            contract: contract.into(),
            function: function.into(),
            args,
        }
    }
}

/// Preflight result for a contract invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Simulation {
    /// Return value of the simulated call
    pub result: Option<ScValue>,
    pub min_resource_fee: u64,
    /// Footprint and resource data, opaque to the core
    pub transaction_data: String,
}

/// Response of a synchronous ledger submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSubmission {
    pub hash: String,
    /// Present when the gateway already saw the transaction close
    pub ledger: Option<u32>,
}

/// Transaction as reported by the ledger gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub successful: bool,
    pub ledger: u32,
}

/// Contract gateway submission status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendStatus {
    Pending,
    Duplicate,
    TryAgainLater,
    Error,
}

impl SendStatus {
    /// Whether the network accepted the transaction for inclusion
    pub fn is_accepted(&self) -> bool {
        matches!(self, SendStatus::Pending | SendStatus::Duplicate)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResponse {
    pub status: SendStatus,
    pub hash: String,
    pub error_detail: Option<String>,
}

/// Contract gateway lookup of a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionLookup {
    NotFound,
    Success { ledger: u32 },
    Failed { ledger: u32 },
}

/// Contract event query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    pub contract_id: String,
    pub start_ledger: u32,
    /// Topic-0 symbols to match; empty matches all
    pub topics: Vec<String>,
    pub limit: Option<u32>,
}

/// Raw contract event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEventRecord {
    pub id: String,
    pub ledger: u32,
    pub tx_hash: String,
    pub topics: Vec<ScValue>,
    pub value: ScValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_balance_ignores_issued_assets() {
        let account = AccountInfo {
            id: "G".into(),
            sequence: 1,
            balances: vec![
                Balance {
                    asset_code: Some("USDC".into()),
                    asset_issuer: Some("GISSUER".into()),
                    balance: 5,
                },
                Balance {
                    asset_code: None,
                    asset_issuer: None,
                    balance: 120_000_000,
                },
            ],
        };
        assert_eq!(account.native_balance(), 120_000_000);
        assert_eq!(AccountInfo::for_simulation("G").native_balance(), 0);
    }

    #[test]
    fn test_map_field_lookup() {
        let value = ScValue::Map(vec![
            ("amount_in".into(), ScValue::I128(10)),
            ("user".into(), ScValue::address("GUSER")),
        ]);
        assert_eq!(value.field("amount_in").and_then(ScValue::as_i128), Some(10));
        assert_eq!(value.field("user").and_then(ScValue::as_address), Some("GUSER"));
        assert!(value.field("missing").is_none());
    }
}
