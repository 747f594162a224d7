//! Stellar Swap Core - client-side engine for a constant-product pool
//!
//! Tracks swap, liquidity, approval and payment transactions from build to
//! confirmation, caches ledger and contract reads with per-entry TTLs, quotes
//! swaps against the pool's reserves and classifies wallet/network failures
//! into a fixed taxonomy. Ledger, contract and signing access are injected
//! through the traits in [`gateway`].

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod metrics;
pub mod query;
pub mod quote;
pub mod session;
pub mod tx;

pub use cache::TtlCache;
pub use config::Settings;
pub use error::{parse_error, CoreError, CoreResult, RawError, WalletError, WalletErrorCode};
pub use gateway::{ContractGateway, LedgerGateway, Signer};
pub use query::QueryService;
pub use quote::{SwapDirection, SwapQuote};
pub use session::{Gateways, Session};
pub use tx::{Operation, Transaction, TransactionLog, TransactionManager, TxId, TxStatus};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter; a second call is a no-op.
pub fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stellar_swap_core=debug,hyper=warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}
