//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Cache hit rate and evictions
//! - Transaction lifecycle progress and outcomes
//! - Confirmation polling
//! - Classified error codes

use crate::error::{CoreError, CoreResult, WalletErrorCode};

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    // Cache metrics
    pub static ref CACHE_LOOKUPS: CounterVec = register_counter_vec!(
        "stellar_swap_cache_lookups_total",
        "Cache lookups by result",
        &["result"]
    ).unwrap();

    pub static ref CACHE_EVICTIONS: CounterVec = register_counter_vec!(
        "stellar_swap_cache_evictions_total",
        "Expired cache entries removed",
        &[]
    ).unwrap();

    // Transaction metrics
    pub static ref TX_CREATED: CounterVec = register_counter_vec!(
        "stellar_swap_transactions_created_total",
        "Transactions created by kind",
        &["kind"]
    ).unwrap();

    pub static ref TX_TRANSITIONS: CounterVec = register_counter_vec!(
        "stellar_swap_transaction_transitions_total",
        "Lifecycle transitions by target status",
        &["status"]
    ).unwrap();

    pub static ref TX_COMPLETED: CounterVec = register_counter_vec!(
        "stellar_swap_transactions_completed_total",
        "Transactions reaching a terminal status",
        &["kind", "status"]
    ).unwrap();

    pub static ref TX_LATENCY: HistogramVec = register_histogram_vec!(
        "stellar_swap_transaction_latency_seconds",
        "Time from creation to terminal status",
        &["kind"],
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    ).unwrap();

    pub static ref POLL_ATTEMPTS: HistogramVec = register_histogram_vec!(
        "stellar_swap_confirmation_poll_attempts",
        "Poll attempts needed to reach a definite answer",
        &["gateway"],
        vec![1.0, 2.0, 3.0, 5.0, 10.0, 20.0, 30.0]
    ).unwrap();

    // Error metrics
    pub static ref CLASSIFIED_ERRORS: CounterVec = register_counter_vec!(
        "stellar_swap_classified_errors_total",
        "Gateway and signer failures by taxonomy code",
        &["code"]
    ).unwrap();
}

/// Render every registered metric in the Prometheus text format
pub fn gather() -> CoreResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| CoreError::Internal(format!("metrics encoding failed: {}", e)))?;
    String::from_utf8(buffer).map_err(|e| CoreError::Internal(e.to_string()))
}

// Helper functions to record metrics

pub fn record_cache_hit() {
    CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
}

pub fn record_cache_miss() {
    CACHE_LOOKUPS.with_label_values(&["miss"]).inc();
}

pub fn record_cache_eviction(count: usize) {
    CACHE_EVICTIONS.with_label_values(&[]).inc_by(count as f64);
}

pub fn record_tx_created(kind: &str) {
    TX_CREATED.with_label_values(&[kind]).inc();
}

pub fn record_transition(status: &str) {
    TX_TRANSITIONS.with_label_values(&[status]).inc();
}

pub fn record_tx_completed(kind: &str, status: &str, latency_secs: f64) {
    TX_COMPLETED.with_label_values(&[kind, status]).inc();
    TX_LATENCY.with_label_values(&[kind]).observe(latency_secs);
}

pub fn record_poll_attempts(gateway: &str, attempts: u32) {
    POLL_ATTEMPTS
        .with_label_values(&[gateway])
        .observe(f64::from(attempts));
}

pub fn record_classified_error(code: WalletErrorCode) {
    CLASSIFIED_ERRORS.with_label_values(&[code.as_str()]).inc();
}
