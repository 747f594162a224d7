//! Cache-backed reads against the gateways
//!
//! Every read goes through [`TtlCache::get_or_fetch`] under a scoped key, so
//! concurrent callers share one gateway round trip and a finished transaction
//! can drop exactly the reads it made stale. Contract view functions are read
//! by simulating the call; nothing is submitted.

use crate::cache::{keys, TtlCache};
use crate::config::Settings;
use crate::error::{parse_error, CoreError, CoreResult, RawError, WalletError, WalletErrorCode};
use crate::events::{topics, PoolEvent};
use crate::gateway::{
    AccountInfo, ContractCall, ContractGateway, EventFilter, LedgerGateway, ScValue,
};
use crate::quote::{self, SwapDirection, SwapQuote};

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Pool identity and per-read TTLs
#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub pool_contract: String,
    pub token_a: String,
    pub token_b: String,
    pub simulation_source: String,
    pub default_fee_bps: u32,
    pub balance_ttl: Duration,
    pub reserves_ttl: Duration,
    pub fee_ttl: Duration,
    pub shares_ttl: Duration,
    pub events_ttl: Duration,
}

impl QueryConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let cache = &settings.cache;
        Self {
            pool_contract: settings.pool.contract_id.clone(),
            token_a: settings.pool.token_a.clone(),
            token_b: settings.pool.token_b.clone(),
            simulation_source: settings.network.simulation_source.clone(),
            default_fee_bps: settings.pool.default_fee_bps,
            balance_ttl: Duration::from_secs(cache.balance_ttl_secs),
            reserves_ttl: Duration::from_secs(cache.reserves_ttl_secs),
            fee_ttl: Duration::from_secs(cache.fee_ttl_secs),
            shares_ttl: Duration::from_secs(cache.shares_ttl_secs),
            events_ttl: Duration::from_secs(cache.events_ttl_secs),
        }
    }
}

/// Read accessors shared by the lifecycle manager and the status API
pub struct QueryService {
    ledger: Arc<dyn LedgerGateway>,
    contract: Arc<dyn ContractGateway>,
    cache: Arc<TtlCache>,
    config: QueryConfig,
}

async fn simulate_view(
    gateway: &dyn ContractGateway,
    source: &AccountInfo,
    call: &ContractCall,
) -> Result<ScValue, RawError> {
    let envelope = gateway.build_invocation(source, call).await?;
    let simulation = gateway.simulate(&envelope).await?;
    simulation.result.ok_or_else(|| {
        RawError::message(format!("contract call {} returned no result", call.function))
    })
}

fn unexpected(function: &str, value: &ScValue) -> WalletError {
    WalletError::new(
        WalletErrorCode::ContractError,
        format!("{} returned an unexpected value: {:?}", function, value),
    )
}

fn decode_pair(value: &ScValue) -> Option<(i128, i128)> {
    match value.as_vec()? {
        [a, b] => Some((a.as_i128()?, b.as_i128()?)),
        _ => None,
    }
}

impl QueryService {
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        contract: Arc<dyn ContractGateway>,
        cache: Arc<TtlCache>,
        config: QueryConfig,
    ) -> Self {
        Self {
            ledger,
            contract,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<TtlCache> {
        &self.cache
    }

    /// Simulate a read-only contract call through the cache
    async fn view<T, D>(
        &self,
        key: String,
        ttl: Duration,
        call: ContractCall,
        decode: D,
    ) -> CoreResult<T>
    where
        T: Clone + Send + Sync + 'static,
        D: FnOnce(&ScValue) -> Option<T> + Send + 'static,
    {
        let gateway = Arc::clone(&self.contract);
        let source = AccountInfo::for_simulation(&self.config.simulation_source);

        self.cache
            .get_or_fetch(
                &key,
                move || async move {
                    debug!("Reading {}.{} from the contract gateway", call.contract, call.function);
                    let value = simulate_view(gateway.as_ref(), &source, &call)
                        .await
                        .map_err(|raw| parse_error(&raw))?;
                    decode(&value).ok_or_else(|| unexpected(&call.function, &value))
                },
                ttl,
            )
            .await
            .map_err(CoreError::Gateway)
    }

    /// Native balance in stroops
    pub async fn native_balance(&self, account: &str) -> CoreResult<i128> {
        let gateway = Arc::clone(&self.ledger);
        let account_id = account.to_string();

        self.cache
            .get_or_fetch(
                &keys::native_balance(account),
                move || async move {
                    gateway
                        .load_account(&account_id)
                        .await
                        .map(|info| info.native_balance())
                        .map_err(|raw| parse_error(&raw))
                },
                self.config.balance_ttl,
            )
            .await
            .map_err(CoreError::Gateway)
    }

    pub async fn token_balance(&self, token: &str, account: &str) -> CoreResult<i128> {
        let call = ContractCall::new(token, "balance", vec![ScValue::address(account)]);
        self.view(
            keys::token_balance(account, token),
            self.config.balance_ttl,
            call,
            ScValue::as_i128,
        )
        .await
    }

    pub async fn allowance(&self, token: &str, owner: &str, spender: &str) -> CoreResult<i128> {
        let call = ContractCall::new(
            token,
            "allowance",
            vec![ScValue::address(owner), ScValue::address(spender)],
        );
        self.view(
            keys::allowance(owner, token, spender),
            self.config.balance_ttl,
            call,
            ScValue::as_i128,
        )
        .await
    }

    /// `(reserve_a, reserve_b)`
    pub async fn pool_reserves(&self) -> CoreResult<(i128, i128)> {
        let pool = &self.config.pool_contract;
        let call = ContractCall::new(pool.as_str(), "get_reserves", Vec::new());
        self.view(keys::pool_reserves(pool), self.config.reserves_ttl, call, decode_pair)
            .await
    }

    /// Reserves read straight from the gateway, refreshing the cache
    pub async fn fresh_pool_reserves(&self) -> CoreResult<(i128, i128)> {
        self.cache.delete(&keys::pool_reserves(&self.config.pool_contract));
        self.pool_reserves().await
    }

    pub async fn pool_fee(&self) -> CoreResult<u32> {
        let pool = &self.config.pool_contract;
        let call = ContractCall::new(pool.as_str(), "get_fee", Vec::new());
        let default_fee = self.config.default_fee_bps;
        self.view(keys::pool_fee(pool), self.config.fee_ttl, call, move |value| {
            match value {
                ScValue::Void => Some(default_fee),
                other => other.as_u32(),
            }
        })
        .await
    }

    pub async fn total_shares(&self) -> CoreResult<i128> {
        let pool = &self.config.pool_contract;
        let call = ContractCall::new(pool.as_str(), "total_shares", Vec::new());
        self.view(keys::total_shares(pool), self.config.shares_ttl, call, ScValue::as_i128)
            .await
    }

    pub async fn fresh_total_shares(&self) -> CoreResult<i128> {
        self.cache.delete(&keys::total_shares(&self.config.pool_contract));
        self.total_shares().await
    }

    /// LP shares held by `provider`
    pub async fn lp_shares(&self, provider: &str) -> CoreResult<i128> {
        let pool = &self.config.pool_contract;
        let call = ContractCall::new(pool.as_str(), "get_shares", vec![ScValue::address(provider)]);
        self.view(
            keys::lp_shares(pool, provider),
            self.config.shares_ttl,
            call,
            ScValue::as_i128,
        )
        .await
    }

    pub async fn fresh_lp_shares(&self, provider: &str) -> CoreResult<i128> {
        self.cache
            .delete(&keys::lp_shares(&self.config.pool_contract, provider));
        self.lp_shares(provider).await
    }

    /// Quote from cached reserves and fee
    pub async fn quote(
        &self,
        direction: SwapDirection,
        amount_in: i128,
        slippage_percent: f64,
    ) -> CoreResult<SwapQuote> {
        let (reserve_a, reserve_b) = self.pool_reserves().await?;
        let fee_bps = self.pool_fee().await?;
        Ok(quote::quote_swap(
            direction,
            amount_in,
            reserve_a,
            reserve_b,
            fee_bps,
            slippage_percent,
        ))
    }

    /// Pool events from `start_ledger` onwards. Records that do not decode are
    /// skipped.
    pub async fn pool_events(&self, start_ledger: u32) -> CoreResult<Vec<PoolEvent>> {
        let gateway = Arc::clone(&self.contract);
        let filter = EventFilter {
            contract_id: self.config.pool_contract.clone(),
            start_ledger,
            topics: topics::ALL.iter().map(|t| t.to_string()).collect(),
            limit: None,
        };

        self.cache
            .get_or_fetch(
                &keys::pool_events(&self.config.pool_contract, start_ledger),
                move || async move {
                    let records = gateway
                        .get_events(&filter)
                        .await
                        .map_err(|raw| parse_error(&raw))?;
                    let events = records
                        .iter()
                        .filter_map(|record| match PoolEvent::parse(record) {
                            Ok(event) => Some(event),
                            Err(e) => {
                                warn!("Skipping pool event {}: {}", record.id, e);
                                None
                            }
                        })
                        .collect::<Vec<_>>();
                    Ok::<_, WalletError>(events)
                },
                self.config.events_ttl,
            )
            .await
            .map_err(CoreError::Gateway)
    }
}
