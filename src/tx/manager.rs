//! Transaction lifecycle manager
//!
//! Drives every operation through build → sign → submit → confirm, writing
//! each step into the [`TransactionLog`] by id. Failures are classified once,
//! recorded on the transaction, and returned to the caller. Nothing is retried
//! except the bounded confirmation poll.

use super::confirm::{Confirmation, ConfirmationPolicy, ConfirmationTracker};
use super::log::TransactionLog;
use super::types::{Operation, Transaction, TxId, TxStatus};
use super::validation::{self, ValidationError};
use crate::cache::TtlCache;
use crate::config::Settings;
use crate::error::{parse_error, CoreError, CoreResult, RawError};
use crate::gateway::{
    ContractCall, ContractGateway, LedgerGateway, ScValue, SignedEnvelope, Signer,
    UnsignedEnvelope,
};
use crate::metrics;
use crate::query::QueryService;
use crate::quote::{self, SwapDirection};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Settings the lifecycle needs
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub network_passphrase: String,
    pub pool_contract: String,
    pub token_a: String,
    pub token_b: String,
    /// Native stroops a payment must leave untouched
    pub native_reserve: i128,
    pub default_slippage_percent: f64,
    pub confirmation: ConfirmationPolicy,
}

impl ManagerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            network_passphrase: settings.network.passphrase.clone(),
            pool_contract: settings.pool.contract_id.clone(),
            token_a: settings.pool.token_a.clone(),
            token_b: settings.pool.token_b.clone(),
            native_reserve: i128::from(settings.lifecycle.native_reserve_stroops),
            default_slippage_percent: settings.lifecycle.default_slippage_percent,
            confirmation: ConfirmationPolicy {
                attempts: settings.lifecycle.poll_attempts,
                interval: settings.lifecycle.poll_interval(),
            },
        }
    }
}

/// Which gateway a transaction is submitted through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Ledger,
    Contract,
}

struct Prepared {
    route: Route,
    envelope: UnsignedEnvelope,
}

fn invalid(tx_id: TxId, source: ValidationError) -> CoreError {
    CoreError::Validation { tx_id, source }
}

fn rejected(tx_id: TxId, raw: RawError) -> CoreError {
    let error = parse_error(&raw);
    metrics::record_classified_error(error.code);
    CoreError::Rejected { tx_id, error }
}

/// Tie a query failure to the transaction that triggered it
fn attach(tx_id: TxId, err: CoreError) -> CoreError {
    match err {
        CoreError::Gateway(error) => {
            metrics::record_classified_error(error.code);
            CoreError::Rejected { tx_id, error }
        }
        other => other,
    }
}

/// Runs transactions from creation to a terminal status
pub struct TransactionManager {
    ledger: Arc<dyn LedgerGateway>,
    contract: Arc<dyn ContractGateway>,
    signer: Arc<dyn Signer>,
    cache: Arc<TtlCache>,
    query: Arc<QueryService>,
    log: Arc<TransactionLog>,
    tracker: ConfirmationTracker,
    config: ManagerConfig,
    next_id: AtomicU64,
}

impl TransactionManager {
    pub fn new(
        ledger: Arc<dyn LedgerGateway>,
        contract: Arc<dyn ContractGateway>,
        signer: Arc<dyn Signer>,
        cache: Arc<TtlCache>,
        query: Arc<QueryService>,
        log: Arc<TransactionLog>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            ledger,
            contract,
            signer,
            cache,
            query,
            log,
            tracker: ConfirmationTracker::new(config.confirmation),
            config,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn log(&self) -> &Arc<TransactionLog> {
        &self.log
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Run `operation` to a terminal status.
    ///
    /// Returns the final record on success. On failure the record carries the
    /// status, message and code, and the error is returned.
    pub async fn execute(&self, operation: Operation) -> CoreResult<Transaction> {
        let id = TxId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut tx = Transaction::new(id, operation);

        info!("Transaction {} created ({} from {})", id, tx.kind, tx.operation.source());
        metrics::record_tx_created(tx.kind.as_str());
        self.log.insert(tx.clone()).await;

        match self.run(&mut tx).await {
            Ok(()) => {
                metrics::record_tx_completed(tx.kind.as_str(), tx.status.as_str(), tx.elapsed_secs());
                Ok(tx)
            }
            Err(err) => {
                self.fail(&mut tx, &err).await;
                Err(err)
            }
        }
    }

    /// Run `operation` on its own task
    pub fn spawn(self: &Arc<Self>, operation: Operation) -> JoinHandle<CoreResult<Transaction>> {
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.execute(operation).await })
    }

    pub async fn send_native(&self, from: &str, to: &str, amount: i128) -> CoreResult<Transaction> {
        self.execute(Operation::native_payment(from, to, amount)).await
    }

    pub async fn swap(
        &self,
        user: &str,
        direction: SwapDirection,
        amount_in: i128,
        slippage_percent: Option<f64>,
    ) -> CoreResult<Transaction> {
        let slippage = slippage_percent.unwrap_or(self.config.default_slippage_percent);
        self.execute(Operation::swap(user, direction, amount_in, slippage))
            .await
    }

    pub async fn add_liquidity(
        &self,
        provider: &str,
        amount_a: i128,
        amount_b: i128,
        slippage_percent: Option<f64>,
    ) -> CoreResult<Transaction> {
        let slippage = slippage_percent.unwrap_or(self.config.default_slippage_percent);
        self.execute(Operation::add_liquidity(provider, amount_a, amount_b, slippage))
            .await
    }

    pub async fn remove_liquidity(
        &self,
        provider: &str,
        shares: i128,
        slippage_percent: Option<f64>,
    ) -> CoreResult<Transaction> {
        let slippage = slippage_percent.unwrap_or(self.config.default_slippage_percent);
        self.execute(Operation::remove_liquidity(provider, shares, slippage))
            .await
    }

    pub async fn approve(
        &self,
        owner: &str,
        token: &str,
        spender: &str,
        amount: i128,
        expiration_ledger: u32,
    ) -> CoreResult<Transaction> {
        self.execute(Operation::approve(owner, token, spender, amount, expiration_ledger))
            .await
    }

    async fn run(&self, tx: &mut Transaction) -> CoreResult<()> {
        let prepared = self.build(tx).await?;
        self.publish(tx).await;

        self.advance(tx, TxStatus::Signing).await?;
        let signed = self
            .signer
            .sign(&prepared.envelope, &self.config.network_passphrase)
            .await
            .map_err(|raw| rejected(tx.id, raw))?;

        self.advance(tx, TxStatus::Submitting).await?;
        let closed_in = self.submit(tx, prepared.route, &signed).await?;

        self.advance(tx, TxStatus::Pending).await?;
        let hash = tx.hash.clone().unwrap_or_default();
        let confirmation = match (prepared.route, closed_in) {
            (Route::Ledger, Some(ledger)) => Confirmation::Success { ledger },
            (Route::Ledger, None) => self.tracker.await_ledger(self.ledger.as_ref(), &hash).await,
            (Route::Contract, _) => {
                self.tracker
                    .await_contract(self.contract.as_ref(), &hash)
                    .await
            }
        };

        match confirmation {
            Confirmation::Success { ledger } => {
                tx.ledger_seq = Some(ledger);
                self.advance(tx, TxStatus::Success).await?;
                info!("Transaction {} succeeded in ledger {} ({})", tx.id, ledger, hash);
                self.invalidate(tx);
                Ok(())
            }
            Confirmation::Failed { ledger } => Err(CoreError::OnChainFailure {
                tx_id: tx.id,
                hash,
                ledger,
            }),
            Confirmation::TimedOut { attempts } => Err(CoreError::ConfirmationTimeout {
                tx_id: tx.id,
                hash,
                attempts,
            }),
        }
    }

    /// Validate locally, fill in quote-derived fields and produce an envelope
    async fn build(&self, tx: &mut Transaction) -> CoreResult<Prepared> {
        let id = tx.id;
        let pool = self.config.pool_contract.clone();

        match &mut tx.operation {
            Operation::NativePayment { from, to, amount } => {
                validation::require_account("sender", from).map_err(|e| invalid(id, e))?;
                validation::require_account("recipient", to).map_err(|e| invalid(id, e))?;
                validation::require_positive("amount", *amount).map_err(|e| invalid(id, e))?;

                let source = self
                    .ledger
                    .load_account(from)
                    .await
                    .map_err(|raw| rejected(id, raw))?;
                validation::require_spendable(*amount, source.native_balance(), self.config.native_reserve)
                    .map_err(|e| invalid(id, e))?;

                let envelope = self
                    .ledger
                    .build_native_payment(&source, to, *amount)
                    .await
                    .map_err(|raw| rejected(id, raw))?;
                Ok(Prepared {
                    route: Route::Ledger,
                    envelope,
                })
            }

            Operation::Swap {
                user,
                direction,
                amount_in,
                slippage_percent,
                quoted_out,
                min_amount_out,
            } => {
                validation::require_account("account", user).map_err(|e| invalid(id, e))?;
                validation::require_positive("amount", *amount_in).map_err(|e| invalid(id, e))?;
                validation::require_slippage(*slippage_percent).map_err(|e| invalid(id, e))?;

                let (reserve_a, reserve_b) = self
                    .query
                    .fresh_pool_reserves()
                    .await
                    .map_err(|e| attach(id, e))?;
                if reserve_a <= 0 || reserve_b <= 0 {
                    return Err(invalid(id, ValidationError::NoLiquidity));
                }
                let fee_bps = self.query.pool_fee().await.map_err(|e| attach(id, e))?;

                let (reserve_in, reserve_out) = direction.orient(reserve_a, reserve_b);
                let out = quote::get_amount_out(*amount_in, reserve_in, reserve_out, fee_bps);
                if out <= 0 {
                    return Err(invalid(id, ValidationError::ZeroOutput));
                }
                let min_out = quote::calc_min_amount_out(out, *slippage_percent);
                *quoted_out = Some(out);
                *min_amount_out = Some(min_out);
                debug!(
                    "Transaction {} quoted {} -> {} (min {}, fee {} bps)",
                    id, amount_in, out, min_out, fee_bps
                );

                let call = ContractCall::new(
                    pool,
                    direction.contract_function(),
                    vec![
                        ScValue::address(user.as_str()),
                        ScValue::I128(*amount_in),
                        ScValue::I128(min_out),
                    ],
                );
                let user = user.clone();
                self.prepare_invocation(id, &user, &call).await
            }

            Operation::AddLiquidity {
                provider,
                amount_a,
                amount_b,
                slippage_percent,
                estimated_shares,
                min_shares,
            } => {
                validation::require_account("provider", provider).map_err(|e| invalid(id, e))?;
                validation::require_positive("token A amount", *amount_a)
                    .map_err(|e| invalid(id, e))?;
                validation::require_positive("token B amount", *amount_b)
                    .map_err(|e| invalid(id, e))?;
                validation::require_slippage(*slippage_percent).map_err(|e| invalid(id, e))?;

                let (reserve_a, reserve_b) = self
                    .query
                    .fresh_pool_reserves()
                    .await
                    .map_err(|e| attach(id, e))?;
                let total = self
                    .query
                    .fresh_total_shares()
                    .await
                    .map_err(|e| attach(id, e))?;

                let estimate =
                    quote::estimate_lp_shares(*amount_a, *amount_b, reserve_a, reserve_b, total);
                if estimate <= 0 {
                    return Err(invalid(id, ValidationError::ZeroOutput));
                }
                let min = quote::calc_min_amount_out(estimate, *slippage_percent);
                *estimated_shares = Some(estimate);
                *min_shares = Some(min);
                debug!("Transaction {} expects {} LP shares (min {})", id, estimate, min);

                let call = ContractCall::new(
                    pool,
                    "add_liquidity",
                    vec![
                        ScValue::address(provider.as_str()),
                        ScValue::I128(*amount_a),
                        ScValue::I128(*amount_b),
                        ScValue::I128(min),
                    ],
                );
                let provider = provider.clone();
                self.prepare_invocation(id, &provider, &call).await
            }

            Operation::RemoveLiquidity {
                provider,
                shares,
                slippage_percent,
                min_amount_a,
                min_amount_b,
            } => {
                validation::require_account("provider", provider).map_err(|e| invalid(id, e))?;
                validation::require_positive("share amount", *shares).map_err(|e| invalid(id, e))?;
                validation::require_slippage(*slippage_percent).map_err(|e| invalid(id, e))?;

                let owned = self
                    .query
                    .fresh_lp_shares(provider)
                    .await
                    .map_err(|e| attach(id, e))?;
                if *shares > owned {
                    return Err(invalid(
                        id,
                        ValidationError::InsufficientShares {
                            owned,
                            requested: *shares,
                        },
                    ));
                }

                let (reserve_a, reserve_b) = self
                    .query
                    .fresh_pool_reserves()
                    .await
                    .map_err(|e| attach(id, e))?;
                let total = self
                    .query
                    .fresh_total_shares()
                    .await
                    .map_err(|e| attach(id, e))?;

                let (out_a, out_b) = quote::estimate_withdrawal(*shares, reserve_a, reserve_b, total);
                let min_a = quote::calc_min_amount_out(out_a, *slippage_percent);
                let min_b = quote::calc_min_amount_out(out_b, *slippage_percent);
                *min_amount_a = Some(min_a);
                *min_amount_b = Some(min_b);
                debug!(
                    "Transaction {} expects {}/{} back (min {}/{})",
                    id, out_a, out_b, min_a, min_b
                );

                let call = ContractCall::new(
                    pool,
                    "remove_liquidity",
                    vec![
                        ScValue::address(provider.as_str()),
                        ScValue::I128(*shares),
                        ScValue::I128(min_a),
                        ScValue::I128(min_b),
                    ],
                );
                let provider = provider.clone();
                self.prepare_invocation(id, &provider, &call).await
            }

            Operation::Approve {
                owner,
                token,
                spender,
                amount,
                expiration_ledger,
            } => {
                validation::require_account("owner", owner).map_err(|e| invalid(id, e))?;
                validation::require_contract("token", token).map_err(|e| invalid(id, e))?;
                validation::require_address("spender", spender).map_err(|e| invalid(id, e))?;
                validation::require_non_negative("allowance", *amount)
                    .map_err(|e| invalid(id, e))?;

                let call = ContractCall::new(
                    token.as_str(),
                    "approve",
                    vec![
                        ScValue::address(owner.as_str()),
                        ScValue::address(spender.as_str()),
                        ScValue::I128(*amount),
                        ScValue::U32(*expiration_ledger),
                    ],
                );
                let owner = owner.clone();
                self.prepare_invocation(id, &owner, &call).await
            }
        }
    }

    /// Load the source, simulate and assemble a contract invocation
    async fn prepare_invocation(
        &self,
        id: TxId,
        source: &str,
        call: &ContractCall,
    ) -> CoreResult<Prepared> {
        let account = self
            .contract
            .load_account(source)
            .await
            .map_err(|raw| rejected(id, raw))?;
        let envelope = self
            .contract
            .build_invocation(&account, call)
            .await
            .map_err(|raw| rejected(id, raw))?;
        let simulation = self
            .contract
            .simulate(&envelope)
            .await
            .map_err(|raw| rejected(id, raw))?;
        debug!(
            "Transaction {} simulated {}.{} (resource fee {})",
            id, call.contract, call.function, simulation.min_resource_fee
        );
        let envelope = self
            .contract
            .assemble(&envelope, &simulation)
            .await
            .map_err(|raw| rejected(id, raw))?;

        Ok(Prepared {
            route: Route::Contract,
            envelope,
        })
    }

    /// Submit and record the hash. Returns the ledger when the gateway
    /// already reports the transaction closed.
    async fn submit(
        &self,
        tx: &mut Transaction,
        route: Route,
        signed: &SignedEnvelope,
    ) -> CoreResult<Option<u32>> {
        match route {
            Route::Ledger => {
                let submission = self
                    .ledger
                    .submit(signed)
                    .await
                    .map_err(|raw| rejected(tx.id, raw))?;
                self.record_hash(tx, submission.hash).await;
                Ok(submission.ledger)
            }
            Route::Contract => {
                let response = self
                    .contract
                    .send_transaction(signed)
                    .await
                    .map_err(|raw| rejected(tx.id, raw))?;
                self.record_hash(tx, response.hash).await;

                if !response.status.is_accepted() {
                    let raw = match response.error_detail {
                        Some(detail) => RawError::message(detail),
                        None => RawError::message(format!(
                            "transaction submission returned {:?}",
                            response.status
                        )),
                    };
                    return Err(rejected(tx.id, raw));
                }
                Ok(None)
            }
        }
    }

    async fn record_hash(&self, tx: &mut Transaction, hash: String) {
        if !validation::is_valid_tx_hash(&hash) {
            warn!("Transaction {} got an unexpected hash format: {:?}", tx.id, hash);
        }
        debug!("Transaction {} submitted as {}", tx.id, hash);
        tx.hash = Some(hash);
        self.publish(tx).await;
    }

    async fn advance(&self, tx: &mut Transaction, next: TxStatus) -> CoreResult<()> {
        tx.transition(next)?;
        metrics::record_transition(next.as_str());
        debug!("Transaction {} -> {}", tx.id, next);
        self.publish(tx).await;
        Ok(())
    }

    /// Mirror the working copy into the log
    async fn publish(&self, tx: &Transaction) {
        let snapshot = tx.clone();
        if let Err(e) = self.log.update(tx.id, move |entry| *entry = snapshot).await {
            debug!("Transaction {} is no longer logged: {}", tx.id, e);
        }
    }

    async fn fail(&self, tx: &mut Transaction, err: &CoreError) {
        let target = match err {
            CoreError::ConfirmationTimeout { .. } => TxStatus::TimedOut,
            _ => TxStatus::Error,
        };

        if let Err(e) = tx.transition(target) {
            error!("Transaction {} could not record its failure: {}", tx.id, e);
        } else {
            metrics::record_transition(target.as_str());
        }
        tx.error_message = Some(err.user_message());
        tx.error_code = Some(err.code());
        if let CoreError::OnChainFailure { ledger, .. } = err {
            tx.ledger_seq = *ledger;
        }
        self.publish(tx).await;
        metrics::record_tx_completed(tx.kind.as_str(), tx.status.as_str(), tx.elapsed_secs());

        match err {
            CoreError::Validation { source, .. } => {
                info!("Transaction {} rejected locally: {}", tx.id, source)
            }
            CoreError::Rejected { error, .. } => {
                warn!("Transaction {} failed [{}]: {}", tx.id, error.code, error.details)
            }
            other => warn!("Transaction {} ended as {}: {}", tx.id, tx.status, other),
        }
    }

    /// Drop every cached read the finished transaction made stale
    fn invalidate(&self, tx: &Transaction) {
        for scope in tx.operation.touched_scopes(&self.config.pool_contract) {
            let removed = self.cache.invalidate_prefix(&scope);
            debug!("Transaction {} invalidated {} entries under {}", tx.id, removed, scope);
        }
    }
}
