//! Wallet and gateway error classification
//!
//! Failures reach the core in several shapes: plain strings from the ledger
//! gateway, structured `{code, message}` objects from wallet extensions,
//! `{type}` tagged objects from the contract RPC, or nothing useful at all.
//! Each gateway resolves its failure into a [`RawError`] once, and
//! [`parse_error`] maps that onto the fixed [`WalletErrorCode`] taxonomy.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Canonical error categories shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletErrorCode {
    WalletNotFound,
    NotConnected,
    TransactionRejected,
    InsufficientBalance,
    NetworkMismatch,
    InvalidAddress,
    ContractError,
    Unknown,
}

impl WalletErrorCode {
    pub const ALL: [WalletErrorCode; 8] = [
        WalletErrorCode::WalletNotFound,
        WalletErrorCode::NotConnected,
        WalletErrorCode::TransactionRejected,
        WalletErrorCode::InsufficientBalance,
        WalletErrorCode::NetworkMismatch,
        WalletErrorCode::InvalidAddress,
        WalletErrorCode::ContractError,
        WalletErrorCode::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WalletErrorCode::WalletNotFound => "WALLET_NOT_FOUND",
            WalletErrorCode::NotConnected => "NOT_CONNECTED",
            WalletErrorCode::TransactionRejected => "TRANSACTION_REJECTED",
            WalletErrorCode::InsufficientBalance => "INSUFFICIENT_BALANCE",
            WalletErrorCode::NetworkMismatch => "NETWORK_MISMATCH",
            WalletErrorCode::InvalidAddress => "INVALID_ADDRESS",
            WalletErrorCode::ContractError => "CONTRACT_ERROR",
            WalletErrorCode::Unknown => "UNKNOWN",
        }
    }

    /// Primary message shown for this category
    fn default_message(&self) -> &'static str {
        match self {
            WalletErrorCode::WalletNotFound => {
                "No Stellar wallet was found. Install a wallet extension and reload the page."
            }
            WalletErrorCode::NotConnected => {
                "Wallet is not connected. Connect your wallet and try again."
            }
            WalletErrorCode::TransactionRejected => "Transaction was rejected in the wallet.",
            WalletErrorCode::InsufficientBalance => {
                "Insufficient balance to complete this transaction."
            }
            WalletErrorCode::NetworkMismatch => {
                "Wallet is connected to the wrong network. Switch networks and try again."
            }
            WalletErrorCode::InvalidAddress => "The address is not a valid Stellar address.",
            WalletErrorCode::ContractError => "The contract call failed.",
            WalletErrorCode::Unknown => "An unexpected error occurred. Please try again.",
        }
    }
}

impl fmt::Display for WalletErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Refinement of [`WalletErrorCode::ContractError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractFailure {
    /// The pool's own min-output guard tripped; resubmitting with a wider
    /// tolerance can succeed
    SlippageExceeded,
    /// Preflight simulation rejected the call
    SimulationFailed,
    Other,
}

impl ContractFailure {
    fn detect(lowered: &str) -> Self {
        if lowered.contains("slippage") {
            ContractFailure::SlippageExceeded
        } else if lowered.contains("simulation") || lowered.contains("simulate") {
            ContractFailure::SimulationFailed
        } else {
            ContractFailure::Other
        }
    }

    fn message(&self) -> &'static str {
        match self {
            ContractFailure::SlippageExceeded => {
                "Price moved beyond your slippage tolerance. Increase slippage or try again."
            }
            ContractFailure::SimulationFailed => {
                "Transaction simulation failed; the contract would reject this call."
            }
            ContractFailure::Other => WalletErrorCode::ContractError.default_message(),
        }
    }
}

/// Explicit `code` carried by an error object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorCodeValue {
    Number(i64),
    Text(String),
}

impl ErrorCodeValue {
    fn normalized(&self) -> String {
        match self {
            ErrorCodeValue::Number(n) => n.to_string(),
            ErrorCodeValue::Text(s) => s.trim().to_ascii_uppercase(),
        }
    }
}

impl fmt::Display for ErrorCodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCodeValue::Number(n) => write!(f, "{}", n),
            ErrorCodeValue::Text(s) => f.write_str(s),
        }
    }
}

/// Failure as reported by a gateway or signer, before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawError {
    /// Bare string
    Message(String),
    /// Error object exposing only a message
    Error { message: String },
    /// Object with an explicit code
    Coded {
        code: ErrorCodeValue,
        message: Option<String>,
    },
    /// Object with a `type` tag
    Typed { kind: String, message: Option<String> },
    /// Null, undefined or unrecognized
    Empty,
}

impl RawError {
    pub fn message(message: impl Into<String>) -> Self {
        RawError::Message(message.into())
    }

    pub fn coded(code: impl Into<ErrorCodeValue>, message: impl Into<String>) -> Self {
        RawError::Coded {
            code: code.into(),
            message: Some(message.into()),
        }
    }

    pub fn typed(kind: impl Into<String>, message: impl Into<String>) -> Self {
        RawError::Typed {
            kind: kind.into(),
            message: Some(message.into()),
        }
    }

    /// Resolve a JSON-shaped error payload into its variant
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => RawError::Message(s.clone()),
            Value::Object(map) => {
                let message = map
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string);

                let code = match map.get("code") {
                    Some(Value::Number(n)) => Some(match n.as_i64() {
                        Some(i) => ErrorCodeValue::Number(i),
                        None => ErrorCodeValue::Text(n.to_string()),
                    }),
                    Some(Value::String(s)) => Some(ErrorCodeValue::Text(s.clone())),
                    _ => None,
                };
                if let Some(code) = code {
                    return RawError::Coded { code, message };
                }

                if let Some(kind) = map.get("type").and_then(Value::as_str) {
                    return RawError::Typed {
                        kind: kind.to_string(),
                        message,
                    };
                }

                match message.or_else(|| {
                    map.get("error").and_then(Value::as_str).map(str::to_string)
                }) {
                    Some(message) => RawError::Error { message },
                    None => RawError::Empty,
                }
            }
            _ => RawError::Empty,
        }
    }

    /// Message text carried by the error, if any
    fn text(&self) -> Option<&str> {
        match self {
            RawError::Message(m) | RawError::Error { message: m } => Some(m),
            RawError::Coded { message, .. } | RawError::Typed { message, .. } => {
                message.as_deref()
            }
            RawError::Empty => None,
        }
    }
}

impl fmt::Display for RawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawError::Message(m) | RawError::Error { message: m } => f.write_str(m),
            RawError::Coded { code, message } => match message {
                Some(m) => write!(f, "code {}: {}", code, m),
                None => write!(f, "code {}", code),
            },
            RawError::Typed { kind, message } => match message {
                Some(m) => write!(f, "{}: {}", kind, m),
                None => f.write_str(kind),
            },
            RawError::Empty => f.write_str("no error information"),
        }
    }
}

impl std::error::Error for RawError {}

impl From<&str> for RawError {
    fn from(s: &str) -> Self {
        RawError::Message(s.to_string())
    }
}

impl From<String> for RawError {
    fn from(s: String) -> Self {
        RawError::Message(s)
    }
}

impl From<i64> for ErrorCodeValue {
    fn from(n: i64) -> Self {
        ErrorCodeValue::Number(n)
    }
}

impl From<&str> for ErrorCodeValue {
    fn from(s: &str) -> Self {
        ErrorCodeValue::Text(s.to_string())
    }
}

/// Classified, user-presentable error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletError {
    pub code: WalletErrorCode,
    pub message: String,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_failure: Option<ContractFailure>,
}

impl WalletError {
    /// Build an error for a category with its standard message
    pub fn new(code: WalletErrorCode, details: impl Into<String>) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: details.into(),
            contract_failure: None,
        }
    }

    fn contract(failure: ContractFailure, details: String) -> Self {
        Self {
            code: WalletErrorCode::ContractError,
            message: failure.message().to_string(),
            details,
            contract_failure: Some(failure),
        }
    }

    /// Recoverability refined by contract sub-case
    pub fn is_recoverable(&self) -> bool {
        match (self.code, self.contract_failure) {
            (WalletErrorCode::ContractError, Some(ContractFailure::SlippageExceeded)) => true,
            (code, _) => is_recoverable_error(code),
        }
    }
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WalletError {}

const CODE_RULES: &[(&str, WalletErrorCode)] = &[
    ("-4", WalletErrorCode::TransactionRejected),
    ("4001", WalletErrorCode::TransactionRejected),
    ("USER_DECLINED", WalletErrorCode::TransactionRejected),
    ("USER_REJECTED", WalletErrorCode::TransactionRejected),
    ("-3", WalletErrorCode::NetworkMismatch),
    ("4901", WalletErrorCode::NetworkMismatch),
    ("NETWORK_MISMATCH", WalletErrorCode::NetworkMismatch),
    ("WALLET_NOT_FOUND", WalletErrorCode::WalletNotFound),
    ("NOT_CONNECTED", WalletErrorCode::NotConnected),
];

// Compared after lowercasing and stripping separators
const TYPE_RULES: &[(&str, WalletErrorCode)] = &[
    ("userrejected", WalletErrorCode::TransactionRejected),
    ("userdeclined", WalletErrorCode::TransactionRejected),
    ("walletnotfound", WalletErrorCode::WalletNotFound),
    ("walletnotinstalled", WalletErrorCode::WalletNotFound),
    ("notconnected", WalletErrorCode::NotConnected),
    ("networkmismatch", WalletErrorCode::NetworkMismatch),
    ("insufficientbalance", WalletErrorCode::InsufficientBalance),
    ("invalidaddress", WalletErrorCode::InvalidAddress),
    ("simulationfailed", WalletErrorCode::ContractError),
    ("contracterror", WalletErrorCode::ContractError),
];

// Evaluated in order; the first category with a matching pattern wins
const MESSAGE_RULES: &[(WalletErrorCode, &[&str])] = &[
    (
        WalletErrorCode::WalletNotFound,
        &[
            "not installed",
            "extension not found",
            "wallet not found",
            "no wallet",
            "freighter is not",
        ],
    ),
    (
        WalletErrorCode::TransactionRejected,
        &[
            "user rejected",
            "rejected by user",
            "user declined",
            "declined",
            "user denied",
            "cancelled",
            "canceled",
        ],
    ),
    (
        WalletErrorCode::InsufficientBalance,
        &[
            "insufficient funds",
            "insufficient balance",
            "underfunded",
            "tx_insufficient_balance",
            "low reserve",
        ],
    ),
    (
        WalletErrorCode::NetworkMismatch,
        &[
            "wrong network",
            "network mismatch",
            "different network",
            "network passphrase",
        ],
    ),
    (
        WalletErrorCode::ContractError,
        &[
            "simulation failed",
            "slippage exceeded",
            "soroban",
            "hosterror",
            "host error",
            "contract",
            "insufficient shares",
            "insufficient allowance",
        ],
    ),
];

fn lookup_code(code: &ErrorCodeValue) -> Option<WalletErrorCode> {
    let normalized = code.normalized();
    CODE_RULES
        .iter()
        .find(|(c, _)| *c == normalized)
        .map(|(_, category)| *category)
}

fn lookup_type(kind: &str) -> Option<WalletErrorCode> {
    let normalized: String = kind
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect();
    TYPE_RULES
        .iter()
        .find(|(t, _)| *t == normalized)
        .map(|(_, category)| *category)
}

fn classify_message(message: &str) -> Option<WalletErrorCode> {
    let lowered = message.to_lowercase();
    MESSAGE_RULES
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| lowered.contains(p)))
        .map(|(category, _)| *category)
}

fn build(code: WalletErrorCode, raw: &RawError) -> WalletError {
    let details = raw.to_string();
    if code == WalletErrorCode::ContractError {
        let failure = ContractFailure::detect(&details.to_lowercase());
        WalletError::contract(failure, details)
    } else {
        WalletError::new(code, details)
    }
}

/// Classify a raw failure. Never panics; every result carries a non-empty
/// message.
pub fn parse_error(raw: &RawError) -> WalletError {
    let explicit = match raw {
        RawError::Coded { code, .. } => lookup_code(code),
        RawError::Typed { kind, .. } => lookup_type(kind),
        _ => None,
    };

    let code = explicit
        .or_else(|| raw.text().and_then(classify_message))
        .unwrap_or(WalletErrorCode::Unknown);

    build(code, raw)
}

/// Short display label for a category
pub fn error_label(code: WalletErrorCode) -> &'static str {
    match code {
        WalletErrorCode::WalletNotFound => "Wallet Not Found",
        WalletErrorCode::NotConnected => "Not Connected",
        WalletErrorCode::TransactionRejected => "Transaction Rejected",
        WalletErrorCode::InsufficientBalance => "Insufficient Balance",
        WalletErrorCode::NetworkMismatch => "Wrong Network",
        WalletErrorCode::InvalidAddress => "Invalid Address",
        WalletErrorCode::ContractError => "Contract Error",
        WalletErrorCode::Unknown => "Unknown Error",
    }
}

/// Whether retrying without outside remediation is plausible
pub fn is_recoverable_error(code: WalletErrorCode) -> bool {
    matches!(
        code,
        WalletErrorCode::TransactionRejected
            | WalletErrorCode::InsufficientBalance
            | WalletErrorCode::Unknown
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insufficient_balance_message() {
        let err = parse_error(&RawError::message("Error: insufficient balance for transfer"));
        assert_eq!(err.code, WalletErrorCode::InsufficientBalance);
        assert!(err.message.to_lowercase().contains("balance"));
        assert!(err.details.contains("insufficient balance for transfer"));
    }

    #[test]
    fn test_user_rejected_message() {
        let err = parse_error(&RawError::Error {
            message: "User rejected the request".to_string(),
        });
        assert_eq!(err.code, WalletErrorCode::TransactionRejected);
    }

    #[test]
    fn test_unrecognized_message_is_unknown() {
        let err = parse_error(&RawError::message("something odd happened"));
        assert_eq!(err.code, WalletErrorCode::Unknown);
        assert!(!err.message.is_empty());
    }

    #[test]
    fn test_empty_input_never_fails() {
        for raw in [RawError::Empty, RawError::from_json(&Value::Null), RawError::from_json(&json!(42))] {
            let err = parse_error(&raw);
            assert_eq!(err.code, WalletErrorCode::Unknown);
            assert!(!err.message.is_empty());
        }
    }

    #[test]
    fn test_string_code_lookup() {
        let err = parse_error(&RawError::from_json(&json!({ "code": "-4" })));
        assert_eq!(err.code, WalletErrorCode::TransactionRejected);

        let err = parse_error(&RawError::from_json(&json!({ "code": -4, "message": "x" })));
        assert_eq!(err.code, WalletErrorCode::TransactionRejected);
    }

    #[test]
    fn test_code_miss_falls_through_to_message() {
        let err = parse_error(&RawError::from_json(&json!({
            "code": -32603,
            "message": "Simulation failed: HostError(Contract, #3)"
        })));
        assert_eq!(err.code, WalletErrorCode::ContractError);
        assert_eq!(err.contract_failure, Some(ContractFailure::SimulationFailed));
    }

    #[test]
    fn test_code_takes_precedence_over_message() {
        // Message alone would say insufficient balance
        let err = parse_error(&RawError::coded(-3i64, "insufficient funds"));
        assert_eq!(err.code, WalletErrorCode::NetworkMismatch);
    }

    #[test]
    fn test_type_tag_lookup() {
        let err = parse_error(&RawError::from_json(&json!({ "type": "wallet_not_installed" })));
        assert_eq!(err.code, WalletErrorCode::WalletNotFound);

        let err = parse_error(&RawError::typed("RpcError", "wrong network selected"));
        assert_eq!(err.code, WalletErrorCode::NetworkMismatch);
    }

    #[test]
    fn test_message_priority_order() {
        // Matches both rejected and contract patterns; rejected comes first
        let err = parse_error(&RawError::message("user rejected contract call"));
        assert_eq!(err.code, WalletErrorCode::TransactionRejected);

        let err = parse_error(&RawError::message("Freighter extension not found"));
        assert_eq!(err.code, WalletErrorCode::WalletNotFound);

        let err = parse_error(&RawError::message("op_underfunded"));
        assert_eq!(err.code, WalletErrorCode::InsufficientBalance);
    }

    #[test]
    fn test_slippage_is_recoverable_contract_error() {
        let err = parse_error(&RawError::message("Error(Contract): slippage exceeded"));
        assert_eq!(err.code, WalletErrorCode::ContractError);
        assert_eq!(err.contract_failure, Some(ContractFailure::SlippageExceeded));
        assert!(err.is_recoverable());
        assert!(!is_recoverable_error(WalletErrorCode::ContractError));
    }

    #[test]
    fn test_from_json_message_object() {
        let raw = RawError::from_json(&json!({ "message": "tx_bad_seq" }));
        assert_eq!(
            raw,
            RawError::Error {
                message: "tx_bad_seq".to_string()
            }
        );
        let raw = RawError::from_json(&json!({ "error": "User declined access" }));
        assert_eq!(parse_error(&raw).code, WalletErrorCode::TransactionRejected);
    }

    #[test]
    fn test_labels_are_total() {
        for code in WalletErrorCode::ALL {
            assert!(!error_label(code).is_empty());
            assert!(!code.default_message().is_empty());
        }
    }

    #[test]
    fn test_recoverability_table() {
        assert!(is_recoverable_error(WalletErrorCode::TransactionRejected));
        assert!(is_recoverable_error(WalletErrorCode::InsufficientBalance));
        assert!(is_recoverable_error(WalletErrorCode::Unknown));
        assert!(!is_recoverable_error(WalletErrorCode::WalletNotFound));
        assert!(!is_recoverable_error(WalletErrorCode::NetworkMismatch));
    }

    #[test]
    fn test_code_serializes_screaming_snake_case() {
        let s = serde_json::to_string(&WalletErrorCode::InsufficientBalance).unwrap();
        assert_eq!(s, "\"INSUFFICIENT_BALANCE\"");
    }
}
