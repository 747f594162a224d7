//! Read-only HTTP status API: health, transaction log, cache and quotes

use crate::cache::TtlCache;
use crate::config::ApiConfig;
use crate::error::{error_label, CoreError, CoreResult};
use crate::metrics;
use crate::query::QueryService;
use crate::quote::SwapDirection;
use crate::tx::{TransactionLog, TxId};

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub log: Arc<TransactionLog>,
    pub cache: Arc<TtlCache>,
    pub query: Arc<QueryService>,
    pub default_slippage_percent: f64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/transactions", get(list_transactions))
        .route("/transactions/active", get(active_transaction))
        .route("/transactions/:id", get(get_transaction))
        .route("/cache/stats", get(cache_stats))
        .route("/quote", get(get_quote))
        .route("/events", get(get_events))
        .route("/metrics", get(get_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP API server until it fails
pub async fn serve(config: &ApiConfig, state: AppState) -> CoreResult<()> {
    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CoreError::Internal(format!("failed to bind {}: {}", addr, e)))?;
    axum::serve(listener, router(state))
        .await
        .map_err(|e| CoreError::Internal(format!("API server error: {}", e)))
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            code: None,
        }),
    )
        .into_response()
}

/// Gateway failures surface as 502 with their classified code
fn core_error_response(err: CoreError) -> Response {
    warn!("API request failed: {}", err);
    let code = err.code();
    (
        StatusCode::BAD_GATEWAY,
        Json(ErrorResponse {
            error: err.user_message(),
            code: Some(error_label(code).to_string()),
        }),
    )
        .into_response()
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        logged_transactions: state.log.len().await,
        in_flight: state.log.in_flight().await.len(),
        cached_entries: state.cache.stats().size,
    })
}

async fn list_transactions(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.log.list().await)
}

async fn active_transaction(State(state): State<AppState>) -> Response {
    match state.log.active().await {
        Some(tx) => Json(tx).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn get_transaction(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    match state.log.get(TxId(id)).await {
        Some(tx) => Json(tx).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("transaction {} not found", TxId(id))),
    }
}

async fn cache_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.cache.stats())
}

#[derive(Debug, Deserialize)]
struct QuoteParams {
    direction: String,
    /// Decimal string; i128 does not survive query-string decoding
    amount_in: String,
    slippage: Option<f64>,
}

async fn get_quote(State(state): State<AppState>, Query(params): Query<QuoteParams>) -> Response {
    let direction: SwapDirection = match params.direction.parse() {
        Ok(direction) => direction,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    let amount_in: i128 = match params.amount_in.parse() {
        Ok(amount) if amount > 0 => amount,
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "amount_in must be a positive integer",
            )
        }
    };
    let slippage = params.slippage.unwrap_or(state.default_slippage_percent);
    if !(0.0..=100.0).contains(&slippage) {
        return error_response(StatusCode::BAD_REQUEST, "slippage must be within 0..=100");
    }

    match state.query.quote(direction, amount_in, slippage).await {
        Ok(quote) => Json(quote).into_response(),
        Err(e) => core_error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct EventParams {
    #[serde(default)]
    from_ledger: u32,
}

async fn get_events(State(state): State<AppState>, Query(params): Query<EventParams>) -> Response {
    match state.query.pool_events(params.from_ledger).await {
        Ok(events) => Json(events).into_response(),
        Err(e) => core_error_response(e),
    }
}

async fn get_metrics() -> Response {
    match metrics::gather() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    logged_transactions: usize,
    in_flight: usize,
    cached_entries: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}
