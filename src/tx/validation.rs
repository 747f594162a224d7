//! Local checks run before anything is sent to a gateway
//!
//! Addresses are StrKeys: a version byte, a 32-byte payload and a CRC16-XMODEM
//! checksum (little-endian), base32 encoded without padding.

use crate::error::WalletErrorCode;

use thiserror::Error;

const ACCOUNT_VERSION: u8 = 6 << 3; // 'G'
const CONTRACT_VERSION: u8 = 2 << 3; // 'C'
const STRKEY_LEN: usize = 56;
const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("The {field} is not a valid Stellar account address.")]
    InvalidAccount { field: &'static str, value: String },

    #[error("The {field} is not a valid contract address.")]
    InvalidContract { field: &'static str, value: String },

    #[error("The {field} must be greater than zero.")]
    NonPositiveAmount { field: &'static str },

    #[error("The {field} cannot be negative.")]
    NegativeAmount { field: &'static str },

    #[error("Insufficient balance: {available} stroops spendable after the reserve, {required} required.")]
    InsufficientBalance { required: i128, available: i128 },

    #[error("Insufficient LP shares: {owned} owned, {requested} requested.")]
    InsufficientShares { owned: i128, requested: i128 },

    #[error("The pool has no liquidity yet.")]
    NoLiquidity,

    #[error("The amount is too small to produce any output.")]
    ZeroOutput,

    #[error("Slippage tolerance must be between 0 and 100 percent, got {value}.")]
    InvalidSlippage { value: String },
}

impl ValidationError {
    /// Taxonomy code reported for this failure
    pub fn code(&self) -> WalletErrorCode {
        match self {
            ValidationError::InvalidAccount { .. } | ValidationError::InvalidContract { .. } => {
                WalletErrorCode::InvalidAddress
            }
            ValidationError::InsufficientBalance { .. }
            | ValidationError::InsufficientShares { .. } => WalletErrorCode::InsufficientBalance,
            ValidationError::NoLiquidity => WalletErrorCode::ContractError,
            ValidationError::NonPositiveAmount { .. }
            | ValidationError::NegativeAmount { .. }
            | ValidationError::ZeroOutput
            | ValidationError::InvalidSlippage { .. } => WalletErrorCode::Unknown,
        }
    }
}

fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for byte in data {
        crc ^= u16::from(*byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn base32_decode(input: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for c in input.bytes() {
        let value = ALPHABET.iter().position(|a| *a == c)? as u32;
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }
    // Leftover bits must be zero for a canonical encoding
    if buffer != 0 {
        return None;
    }
    Some(out)
}

fn base32_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8 + 4) / 5);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for byte in data {
        buffer = (buffer << 8) | u32::from(*byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
        buffer &= (1 << bits) - 1;
    }
    if bits > 0 {
        out.push(ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

fn decode_strkey(version: u8, address: &str) -> Option<[u8; 32]> {
    if address.len() != STRKEY_LEN {
        return None;
    }
    let raw = base32_decode(address)?;
    if raw.len() != 35 || raw[0] != version {
        return None;
    }
    let (body, checksum) = raw.split_at(33);
    let expected = crc16_xmodem(body).to_le_bytes();
    if checksum != expected {
        return None;
    }
    let mut payload = [0u8; 32];
    payload.copy_from_slice(&body[1..]);
    Some(payload)
}

fn encode_strkey(version: u8, payload: &[u8; 32]) -> String {
    let mut raw = Vec::with_capacity(35);
    raw.push(version);
    raw.extend_from_slice(payload);
    let checksum = crc16_xmodem(&raw).to_le_bytes();
    raw.extend_from_slice(&checksum);
    base32_encode(&raw)
}

/// Encode an ed25519 public key as a `G…` account address
pub fn encode_account(public_key: &[u8; 32]) -> String {
    encode_strkey(ACCOUNT_VERSION, public_key)
}

/// Encode a contract hash as a `C…` contract address
pub fn encode_contract(contract_hash: &[u8; 32]) -> String {
    encode_strkey(CONTRACT_VERSION, contract_hash)
}

pub fn is_valid_account(address: &str) -> bool {
    decode_strkey(ACCOUNT_VERSION, address).is_some()
}

pub fn is_valid_contract(address: &str) -> bool {
    decode_strkey(CONTRACT_VERSION, address).is_some()
}

/// 32-byte hex transaction hash
pub fn is_valid_tx_hash(hash: &str) -> bool {
    hash.len() == 64 && hex::decode(hash).is_ok()
}

pub fn require_account(field: &'static str, address: &str) -> Result<(), ValidationError> {
    if is_valid_account(address) {
        Ok(())
    } else {
        Err(ValidationError::InvalidAccount {
            field,
            value: address.to_string(),
        })
    }
}

pub fn require_contract(field: &'static str, address: &str) -> Result<(), ValidationError> {
    if is_valid_contract(address) {
        Ok(())
    } else {
        Err(ValidationError::InvalidContract {
            field,
            value: address.to_string(),
        })
    }
}

/// Accounts and contracts can both hold allowances
pub fn require_address(field: &'static str, address: &str) -> Result<(), ValidationError> {
    if is_valid_account(address) || is_valid_contract(address) {
        Ok(())
    } else {
        Err(ValidationError::InvalidAccount {
            field,
            value: address.to_string(),
        })
    }
}

pub fn require_positive(field: &'static str, amount: i128) -> Result<(), ValidationError> {
    if amount > 0 {
        Ok(())
    } else {
        Err(ValidationError::NonPositiveAmount { field })
    }
}

pub fn require_non_negative(field: &'static str, amount: i128) -> Result<(), ValidationError> {
    if amount >= 0 {
        Ok(())
    } else {
        Err(ValidationError::NegativeAmount { field })
    }
}

/// Slippage is a percentage in `0..=100`; NaN is rejected
pub fn require_slippage(percent: f64) -> Result<(), ValidationError> {
    if (0.0..=100.0).contains(&percent) {
        Ok(())
    } else {
        Err(ValidationError::InvalidSlippage {
            value: percent.to_string(),
        })
    }
}

/// `amount` must fit in the balance left after keeping `reserve` back
pub fn require_spendable(amount: i128, balance: i128, reserve: i128) -> Result<(), ValidationError> {
    let available = balance.saturating_sub(reserve).max(0);
    if amount <= available {
        Ok(())
    } else {
        Err(ValidationError::InsufficientBalance {
            required: amount,
            available,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZERO_ACCOUNT: &str = "GAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAWHF";
    const ZERO_CONTRACT: &str = "CAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAABSC4";

    #[test]
    fn test_crc16_xmodem_check_value() {
        assert_eq!(crc16_xmodem(b"123456789"), 0x31c3);
    }

    #[test]
    fn test_known_addresses() {
        assert!(is_valid_account(ZERO_ACCOUNT));
        assert!(is_valid_contract(ZERO_CONTRACT));
        assert!(!is_valid_account(ZERO_CONTRACT));
        assert!(!is_valid_contract(ZERO_ACCOUNT));
    }

    #[test]
    fn test_encoding_matches_known_vectors() {
        assert_eq!(encode_account(&[0u8; 32]), ZERO_ACCOUNT);
        assert_eq!(encode_contract(&[0u8; 32]), ZERO_CONTRACT);
        assert_eq!(
            encode_account(&[1u8; 32]),
            "GAAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQCAIBAEAQDZ7H"
        );
        assert_eq!(
            encode_contract(&[7u8; 32]),
            "CADQOBYHA4DQOBYHA4DQOBYHA4DQOBYHA4DQOBYHA4DQOBYHA4DQP5KR"
        );
    }

    #[test]
    fn test_rejects_malformed_addresses() {
        let mut corrupted = ZERO_ACCOUNT.to_string();
        corrupted.replace_range(10..11, "B");
        let lowered = ZERO_ACCOUNT.to_lowercase();
        for bad in [
            "",
            "GABC",
            corrupted.as_str(),
            lowered.as_str(),
            &ZERO_ACCOUNT[..55],
            "GAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAWH1",
        ] {
            assert!(!is_valid_account(bad), "{bad}");
        }
    }

    #[test]
    fn test_amount_checks() {
        assert!(require_positive("amount", 1).is_ok());
        assert_eq!(
            require_positive("amount", 0),
            Err(ValidationError::NonPositiveAmount { field: "amount" })
        );
        assert!(require_non_negative("amount", 0).is_ok());
        assert!(require_non_negative("amount", -1).is_err());
    }

    #[test]
    fn test_slippage_range() {
        for ok in [0.0, 0.005, 0.5, 100.0] {
            assert!(require_slippage(ok).is_ok(), "{ok}");
        }
        for bad in [-0.1, 100.5, 150.0, f64::NAN, f64::INFINITY] {
            let err = require_slippage(bad).unwrap_err();
            assert!(matches!(err, ValidationError::InvalidSlippage { .. }), "{bad}");
            assert_eq!(err.code(), WalletErrorCode::Unknown);
        }
        assert_eq!(
            require_slippage(150.0).unwrap_err().to_string(),
            "Slippage tolerance must be between 0 and 100 percent, got 150."
        );
    }

    #[test]
    fn test_spendable_keeps_reserve() {
        assert!(require_spendable(85, 100, 15).is_ok());
        let err = require_spendable(86, 100, 15).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InsufficientBalance {
                required: 86,
                available: 85
            }
        );
        assert_eq!(err.code(), WalletErrorCode::InsufficientBalance);
        assert!(require_spendable(1, 10, 15).is_err());
    }

    #[test]
    fn test_tx_hash_format() {
        assert!(is_valid_tx_hash(&"ab".repeat(32)));
        assert!(!is_valid_tx_hash("abc"));
        assert!(!is_valid_tx_hash(&"zz".repeat(32)));
    }

    #[test]
    fn test_validation_messages_are_direct() {
        let err = ValidationError::InvalidAccount {
            field: "recipient",
            value: "nope".into(),
        };
        assert_eq!(err.code(), WalletErrorCode::InvalidAddress);
        assert_eq!(err.to_string(), "The recipient is not a valid Stellar account address.");
    }
}
