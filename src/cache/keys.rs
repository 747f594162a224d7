//! Cache key layout
//!
//! Every key lives under exactly one scope, either an account (`acct:<G…>:`)
//! or a pool contract (`pool:<C…>:`), so a finished transaction can drop
//! everything it may have changed with one prefix invalidation per scope.
//! The trailing `:` keeps `acct:GABC:` from matching `acct:GABCD:`.

pub fn account_scope(account: &str) -> String {
    format!("acct:{}:", account)
}

pub fn pool_scope(contract: &str) -> String {
    format!("pool:{}:", contract)
}

pub fn account_info(account: &str) -> String {
    format!("{}info", account_scope(account))
}

pub fn native_balance(account: &str) -> String {
    format!("{}native", account_scope(account))
}

pub fn token_balance(account: &str, token: &str) -> String {
    format!("{}token:{}", account_scope(account), token)
}

pub fn allowance(owner: &str, token: &str, spender: &str) -> String {
    format!("{}allowance:{}:{}", account_scope(owner), token, spender)
}

pub fn pool_reserves(contract: &str) -> String {
    format!("{}reserves", pool_scope(contract))
}

pub fn pool_fee(contract: &str) -> String {
    format!("{}fee", pool_scope(contract))
}

pub fn total_shares(contract: &str) -> String {
    format!("{}total_shares", pool_scope(contract))
}

pub fn lp_shares(contract: &str, provider: &str) -> String {
    format!("{}shares:{}", pool_scope(contract), provider)
}

pub fn pool_events(contract: &str, start_ledger: u32) -> String {
    format!("{}events:{}", pool_scope(contract), start_ledger)
}
