//! Confirmation polling for submitted transactions
//!
//! Both gateways report settlement differently:
//! - Ledger gateway: the transaction is unknown until it closes, then carries
//!   a `successful` flag
//! - Contract gateway: `NOT_FOUND` until it closes, then `SUCCESS` or `FAILED`
//!
//! Polling is bounded. Lookup errors are treated as "no answer yet" and use
//! up an attempt like any other.

use crate::error::RawError;
use crate::gateway::{ContractGateway, LedgerGateway, TransactionLookup};
use crate::metrics;

use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// How long to wait for settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            attempts: 30,
            interval: Duration::from_secs(2),
        }
    }
}

/// Final answer of a confirmation poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Success { ledger: u32 },
    Failed { ledger: Option<u32> },
    /// No definite answer within the policy; the outcome is unknown
    TimedOut { attempts: u32 },
}

/// Result of a single lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Observation {
    Unknown,
    Success(u32),
    Failed(Option<u32>),
}

/// Polls a gateway until a submitted transaction settles
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfirmationTracker {
    policy: ConfirmationPolicy,
}

impl ConfirmationTracker {
    pub fn new(policy: ConfirmationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ConfirmationPolicy {
        self.policy
    }

    /// Wait for a transaction submitted through the ledger gateway
    pub async fn await_ledger(&self, gateway: &dyn LedgerGateway, hash: &str) -> Confirmation {
        self.poll("ledger", hash, move || async move {
            gateway.get_transaction_by_hash(hash).await.map(|found| match found {
                Some(tx) if tx.successful => Observation::Success(tx.ledger),
                Some(tx) => Observation::Failed(Some(tx.ledger)),
                None => Observation::Unknown,
            })
        })
        .await
    }

    /// Wait for a transaction submitted through the contract gateway
    pub async fn await_contract(&self, gateway: &dyn ContractGateway, hash: &str) -> Confirmation {
        self.poll("contract", hash, move || async move {
            gateway.get_transaction(hash).await.map(|lookup| match lookup {
                TransactionLookup::Success { ledger } => Observation::Success(ledger),
                TransactionLookup::Failed { ledger } => Observation::Failed(Some(ledger)),
                TransactionLookup::NotFound => Observation::Unknown,
            })
        })
        .await
    }

    async fn poll<F, Fut>(&self, gateway: &str, hash: &str, mut lookup: F) -> Confirmation
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Observation, RawError>>,
    {
        let attempts = self.policy.attempts;

        for attempt in 1..=attempts {
            match lookup().await {
                Ok(Observation::Success(ledger)) => {
                    info!("Transaction {} confirmed in ledger {} (attempt {})", hash, ledger, attempt);
                    metrics::record_poll_attempts(gateway, attempt);
                    return Confirmation::Success { ledger };
                }
                Ok(Observation::Failed(ledger)) => {
                    warn!("Transaction {} failed on-chain (attempt {})", hash, attempt);
                    metrics::record_poll_attempts(gateway, attempt);
                    return Confirmation::Failed { ledger };
                }
                Ok(Observation::Unknown) => {
                    debug!("Transaction {} not settled yet ({}/{})", hash, attempt, attempts);
                }
                Err(e) => {
                    warn!("Lookup of {} failed ({}/{}): {}", hash, attempt, attempts, e);
                }
            }

            if attempt < attempts {
                sleep(self.policy.interval).await;
            }
        }

        warn!("Gave up waiting for {} after {} attempts", hash, attempts);
        metrics::record_poll_attempts(gateway, attempts);
        Confirmation::TimedOut { attempts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{LedgerTransaction, MockContractGateway, MockLedgerGateway};
    use mockall::Sequence;

    fn fast_policy(attempts: u32) -> ConfirmationPolicy {
        ConfirmationPolicy {
            attempts,
            interval: Duration::from_secs(2),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_contract_success_after_not_found() {
        let mut gateway = MockContractGateway::new();
        let mut seq = Sequence::new();
        gateway
            .expect_get_transaction()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(TransactionLookup::NotFound));
        gateway
            .expect_get_transaction()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(TransactionLookup::Success { ledger: 812 }));

        let tracker = ConfirmationTracker::new(fast_policy(30));
        let result = tracker.await_contract(&gateway, "hash").await;
        assert_eq!(result, Confirmation::Success { ledger: 812 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_contract_failure_is_definite() {
        let mut gateway = MockContractGateway::new();
        gateway
            .expect_get_transaction()
            .times(1)
            .returning(|_| Ok(TransactionLookup::Failed { ledger: 9 }));

        let tracker = ConfirmationTracker::new(fast_policy(30));
        assert_eq!(
            tracker.await_contract(&gateway, "hash").await,
            Confirmation::Failed { ledger: Some(9) }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_times_out_after_exact_attempts() {
        let mut gateway = MockLedgerGateway::new();
        gateway
            .expect_get_transaction_by_hash()
            .times(30)
            .returning(|_| Ok(None));

        let tracker = ConfirmationTracker::default();
        let started = tokio::time::Instant::now();
        let result = tracker.await_ledger(&gateway, "hash").await;
        assert_eq!(result, Confirmation::TimedOut { attempts: 30 });
        // 29 gaps between 30 attempts
        assert!(started.elapsed() >= Duration::from_secs(58));
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_errors_consume_attempts() {
        let mut gateway = MockLedgerGateway::new();
        let mut seq = Sequence::new();
        gateway
            .expect_get_transaction_by_hash()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Err(RawError::message("503 Service Unavailable")));
        gateway
            .expect_get_transaction_by_hash()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(Some(LedgerTransaction {
                    successful: true,
                    ledger: 44,
                }))
            });

        let tracker = ConfirmationTracker::new(fast_policy(3));
        assert_eq!(
            tracker.await_ledger(&gateway, "hash").await,
            Confirmation::Success { ledger: 44 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsuccessful_ledger_transaction_fails() {
        let mut gateway = MockLedgerGateway::new();
        gateway.expect_get_transaction_by_hash().returning(|_| {
            Ok(Some(LedgerTransaction {
                successful: false,
                ledger: 50,
            }))
        });

        let tracker = ConfirmationTracker::new(fast_policy(3));
        assert_eq!(
            tracker.await_ledger(&gateway, "hash").await,
            Confirmation::Failed { ledger: Some(50) }
        );
    }
}
