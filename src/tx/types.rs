//! Transaction records and the lifecycle state machine

use crate::cache::keys;
use crate::error::{CoreError, CoreResult, WalletErrorCode};
use crate::quote::SwapDirection;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonic transaction identifier, unique within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(pub u64);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    NativePayment,
    Swap,
    AddLiquidity,
    RemoveLiquidity,
    Approve,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::NativePayment => "native_payment",
            TxKind::Swap => "swap",
            TxKind::AddLiquidity => "add_liquidity",
            TxKind::RemoveLiquidity => "remove_liquidity",
            TxKind::Approve => "approve",
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Building,
    Signing,
    Submitting,
    Pending,
    Success,
    Error,
    /// Polling ran out before a definite answer; the outcome is unknown
    TimedOut,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Building => "building",
            TxStatus::Signing => "signing",
            TxStatus::Submitting => "submitting",
            TxStatus::Pending => "pending",
            TxStatus::Success => "success",
            TxStatus::Error => "error",
            TxStatus::TimedOut => "timed_out",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Success | TxStatus::Error | TxStatus::TimedOut)
    }

    pub fn can_transition_to(&self, next: TxStatus) -> bool {
        use TxStatus::*;
        matches!(
            (self, next),
            (Building, Signing)
                | (Signing, Submitting)
                | (Submitting, Pending)
                | (Pending, Success)
                | (Pending, TimedOut)
                | (Building, Error)
                | (Signing, Error)
                | (Submitting, Error)
                | (Pending, Error)
        )
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a transaction does. Fields left `None` at creation are derived from a
/// fresh quote while building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    NativePayment {
        from: String,
        to: String,
        /// Stroops
        amount: i128,
    },
    Swap {
        user: String,
        direction: SwapDirection,
        amount_in: i128,
        slippage_percent: f64,
        quoted_out: Option<i128>,
        min_amount_out: Option<i128>,
    },
    AddLiquidity {
        provider: String,
        amount_a: i128,
        amount_b: i128,
        slippage_percent: f64,
        estimated_shares: Option<i128>,
        min_shares: Option<i128>,
    },
    RemoveLiquidity {
        provider: String,
        shares: i128,
        slippage_percent: f64,
        min_amount_a: Option<i128>,
        min_amount_b: Option<i128>,
    },
    Approve {
        owner: String,
        token: String,
        spender: String,
        amount: i128,
        expiration_ledger: u32,
    },
}

impl Operation {
    pub fn native_payment(from: impl Into<String>, to: impl Into<String>, amount: i128) -> Self {
        Operation::NativePayment {
            from: from.into(),
            to: to.into(),
            amount,
        }
    }

    pub fn swap(
        user: impl Into<String>,
        direction: SwapDirection,
        amount_in: i128,
        slippage_percent: f64,
    ) -> Self {
        Operation::Swap {
            user: user.into(),
            direction,
            amount_in,
            slippage_percent,
            quoted_out: None,
            min_amount_out: None,
        }
    }

    pub fn add_liquidity(
        provider: impl Into<String>,
        amount_a: i128,
        amount_b: i128,
        slippage_percent: f64,
    ) -> Self {
        Operation::AddLiquidity {
            provider: provider.into(),
            amount_a,
            amount_b,
            slippage_percent,
            estimated_shares: None,
            min_shares: None,
        }
    }

    pub fn remove_liquidity(provider: impl Into<String>, shares: i128, slippage_percent: f64) -> Self {
        Operation::RemoveLiquidity {
            provider: provider.into(),
            shares,
            slippage_percent,
            min_amount_a: None,
            min_amount_b: None,
        }
    }

    pub fn approve(
        owner: impl Into<String>,
        token: impl Into<String>,
        spender: impl Into<String>,
        amount: i128,
        expiration_ledger: u32,
    ) -> Self {
        Operation::Approve {
            owner: owner.into(),
            token: token.into(),
            spender: spender.into(),
            amount,
            expiration_ledger,
        }
    }

    pub fn kind(&self) -> TxKind {
        match self {
            Operation::NativePayment { .. } => TxKind::NativePayment,
            Operation::Swap { .. } => TxKind::Swap,
            Operation::AddLiquidity { .. } => TxKind::AddLiquidity,
            Operation::RemoveLiquidity { .. } => TxKind::RemoveLiquidity,
            Operation::Approve { .. } => TxKind::Approve,
        }
    }

    /// Account that signs and pays for the transaction
    pub fn source(&self) -> &str {
        match self {
            Operation::NativePayment { from, .. } => from,
            Operation::Swap { user, .. } => user,
            Operation::AddLiquidity { provider, .. } => provider,
            Operation::RemoveLiquidity { provider, .. } => provider,
            Operation::Approve { owner, .. } => owner,
        }
    }

    /// Cache scopes whose reads a successful run makes stale
    pub fn touched_scopes(&self, pool_contract: &str) -> Vec<String> {
        match self {
            Operation::NativePayment { from, to, .. } => {
                vec![keys::account_scope(from), keys::account_scope(to)]
            }
            Operation::Swap { user: account, .. }
            | Operation::AddLiquidity { provider: account, .. }
            | Operation::RemoveLiquidity { provider: account, .. } => {
                // Token balances held by the pool move with its reserves
                vec![
                    keys::account_scope(account),
                    keys::account_scope(pool_contract),
                    keys::pool_scope(pool_contract),
                ]
            }
            Operation::Approve { owner, .. } => vec![keys::account_scope(owner)],
        }
    }
}

/// One tracked transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub kind: TxKind,
    pub status: TxStatus,
    pub operation: Operation,
    pub hash: Option<String>,
    pub ledger_seq: Option<u32>,
    pub error_message: Option<String>,
    pub error_code: Option<WalletErrorCode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(id: TxId, operation: Operation) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind: operation.kind(),
            status: TxStatus::Building,
            operation,
            hash: None,
            ledger_seq: None,
            error_message: None,
            error_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, refusing anything the state machine does not allow
    pub fn transition(&mut self, next: TxStatus) -> CoreResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidStateTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Seconds from creation to the last update
    pub fn elapsed_secs(&self) -> f64 {
        (self.updated_at - self.created_at).num_milliseconds() as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TxStatus; 7] = [
        TxStatus::Building,
        TxStatus::Signing,
        TxStatus::Submitting,
        TxStatus::Pending,
        TxStatus::Success,
        TxStatus::Error,
        TxStatus::TimedOut,
    ];

    #[test]
    fn test_new_transaction_is_building() {
        let tx = Transaction::new(TxId(1), Operation::native_payment("GA", "GB", 10));
        assert_eq!(tx.status, TxStatus::Building);
        assert_eq!(tx.kind, TxKind::NativePayment);
        assert!(tx.hash.is_none());
        assert!(tx.error_message.is_none());
    }

    #[test]
    fn test_terminal_states_are_final() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_happy_path_and_error_shortcuts() {
        let mut tx = Transaction::new(TxId(2), Operation::native_payment("GA", "GB", 10));
        tx.transition(TxStatus::Signing).unwrap();
        tx.transition(TxStatus::Submitting).unwrap();
        tx.transition(TxStatus::Pending).unwrap();
        tx.transition(TxStatus::Success).unwrap();

        assert!(TxStatus::Building.can_transition_to(TxStatus::Error));
        assert!(TxStatus::Signing.can_transition_to(TxStatus::Error));
        assert!(TxStatus::Submitting.can_transition_to(TxStatus::Error));
        assert!(!TxStatus::Building.can_transition_to(TxStatus::Pending));
        assert!(!TxStatus::Submitting.can_transition_to(TxStatus::TimedOut));
    }

    #[test]
    fn test_illegal_transition_is_refused() {
        let mut tx = Transaction::new(TxId(3), Operation::native_payment("GA", "GB", 10));
        let err = tx.transition(TxStatus::Success).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidStateTransition {
                from: TxStatus::Building,
                to: TxStatus::Success
            }
        ));
        assert_eq!(tx.status, TxStatus::Building);
    }

    #[test]
    fn test_touched_scopes() {
        let pay = Operation::native_payment("GA", "GB", 1);
        assert_eq!(pay.touched_scopes("CPOOL"), vec!["acct:GA:", "acct:GB:"]);

        let swap = Operation::swap("GA", SwapDirection::AToB, 5, 0.5);
        assert_eq!(
            swap.touched_scopes("CPOOL"),
            vec!["acct:GA:", "acct:CPOOL:", "pool:CPOOL:"]
        );

        let remove = Operation::remove_liquidity("GA", 10, 1.0);
        assert!(remove.touched_scopes("CPOOL").contains(&"acct:CPOOL:".to_string()));

        let approve = Operation::approve("GA", "CTOKEN", "CPOOL", 5, 100);
        assert_eq!(approve.touched_scopes("CPOOL"), vec!["acct:GA:"]);
    }

    #[test]
    fn test_serializes_with_snake_case_tags() {
        let tx = Transaction::new(TxId(9), Operation::swap("GA", SwapDirection::BToA, 5, 1.0));
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["id"], 9);
        assert_eq!(json["status"], "building");
        assert_eq!(json["operation"]["kind"], "swap");
        assert_eq!(json["operation"]["direction"], "b_to_a");
    }
}
