//! API route handlers

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

use super::AppState;
use crate::api::CacheTarget;
use crate::gateway::{GatewayError, Resolved, Source};
use crate::refresh::refresh_all;
use crate::upstream::RequestError;

pub const DEFAULT_TOPIC: &str = "hot";
pub const DEFAULT_INTERVAL: &str = "1d";
pub const DEFAULT_KLINE_LIMIT: u32 = 100;
pub const MAX_KLINE_LIMIT: u32 = 1000;

type ApiResponse = (StatusCode, Json<Value>);

// ── Query Params ────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct TokensQuery {
    /// Topic id, or "topics" for the topic list (default: "hot")
    topic: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    keyword: Option<String>,
    chain: Option<String>,
}

#[derive(Deserialize)]
pub struct TokenQuery {
    address: Option<String>,
    chain: Option<String>,
}

#[derive(Deserialize)]
pub struct KlineQuery {
    address: Option<String>,
    chain: Option<String>,
    /// Interval label (default: "1d")
    interval: Option<String>,
    /// Number of candles, 1..=1000 (default: 100)
    limit: Option<String>,
}

#[derive(Deserialize)]
pub struct RefreshQuery {
    /// Cache key to refresh; absent or "all" refreshes the scheduled keys
    key: Option<String>,
}

#[derive(Deserialize)]
pub struct RecordBody {
    chain: Option<String>,
    address: Option<String>,
}

// ── Helpers ─────────────────────────────────────────────────────────

fn ok(body: Value) -> ApiResponse {
    (StatusCode::OK, Json(body))
}

fn bad_request(message: &str) -> ApiResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": message })),
    )
}

/// `Unavailable` asks the caller to retry later
fn gateway_failure(err: GatewayError) -> ApiResponse {
    match err {
        GatewayError::Unavailable { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "success": false, "error": err.to_string(), "retry": true })),
        ),
        GatewayError::InvalidRequest(e @ RequestError::InvalidParam { .. }) => bad_request(&e.to_string()),
        GatewayError::InvalidRequest(e) => {
            error!(error = %e, "upstream request could not be built");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
        }
    }
}

/// Flattens a resolved object value and adds `success` and `stale`
fn flattened<T: Serialize>(resolved: &Resolved<T>) -> Value {
    let mut body = match serde_json::to_value(&resolved.value) {
        Ok(Value::Object(map)) => Value::Object(map),
        Ok(other) => json!({ "data": other }),
        Err(e) => json!({ "error": e.to_string() }),
    };
    body["success"] = json!(true);
    body["stale"] = json!(resolved.stale);
    body
}

fn required(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parses `limit`; `None` when out of range or not a number
fn parse_limit(raw: Option<&str>) -> Option<u32> {
    match raw {
        None => Some(DEFAULT_KLINE_LIMIT),
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|n| (1..=MAX_KLINE_LIMIT).contains(n)),
    }
}

// ── Route Handlers ──────────────────────────────────────────────────

/// GET /api/health
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "tickergate",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/tokens?topic=
async fn tokens(State(state): State<Arc<AppState>>, Query(q): Query<TokensQuery>) -> ApiResponse {
    let topic = required(q.topic).unwrap_or_else(|| DEFAULT_TOPIC.to_string());

    if topic == "topics" {
        return match state.api.topics().await {
            Ok(resolved) => ok(json!({ "topics": resolved.value, "stale": resolved.stale })),
            Err(e) => gateway_failure(e),
        };
    }

    match state.api.ranks(&topic).await {
        Ok(resolved) => ok(json!({
            "topic": topic,
            "tokens": resolved.value,
            "stale": resolved.stale,
        })),
        Err(e) => gateway_failure(e),
    }
}

/// GET /api/search-tokens?keyword=&chain=
async fn search_tokens(State(state): State<Arc<AppState>>, Query(q): Query<SearchQuery>) -> ApiResponse {
    let Some(keyword) = required(q.keyword) else {
        return bad_request("Missing required parameter: keyword");
    };
    let chain = required(q.chain);

    match state.api.search(&keyword, chain.as_deref()).await {
        Ok(resolved) => ok(flattened(&resolved)),
        Err(e) => gateway_failure(e),
    }
}

/// GET /api/token-details?address=&chain=
async fn token_details(State(state): State<Arc<AppState>>, Query(q): Query<TokenQuery>) -> ApiResponse {
    let (Some(address), Some(chain)) = (required(q.address), required(q.chain)) else {
        return bad_request("Missing required parameters: address and chain");
    };

    match state.api.token_details(&address, &chain).await {
        Ok(resolved) => ok(flattened(&resolved)),
        Err(e) => gateway_failure(e),
    }
}

/// GET /api/token-kline?address=&chain=&interval=&limit=
async fn token_kline(State(state): State<Arc<AppState>>, Query(q): Query<KlineQuery>) -> ApiResponse {
    let (Some(address), Some(chain)) = (required(q.address), required(q.chain)) else {
        return bad_request("Missing required parameters: address and chain");
    };
    let interval = required(q.interval).unwrap_or_else(|| DEFAULT_INTERVAL.to_string());
    let Some(limit) = parse_limit(q.limit.as_deref()) else {
        return bad_request("limit must be between 1 and 1000");
    };

    match state.api.klines(&address, &chain, &interval, limit).await {
        Ok(resolved) => ok(flattened(&resolved)),
        Err(e) => gateway_failure(e),
    }
}

/// GET /api/crypto
async fn crypto(State(state): State<Arc<AppState>>) -> ApiResponse {
    match state.api.market_overview().await {
        Ok(resolved) => {
            let api_status = if resolved.stale || resolved.source == Source::StaticFallback {
                "down"
            } else {
                "up"
            };
            ok(json!({
                "success": true,
                "data": resolved.value,
                "apiStatus": api_status,
            }))
        }
        Err(e) => gateway_failure(e),
    }
}

/// GET /api/token-boosts
async fn token_boosts(State(state): State<Arc<AppState>>) -> ApiResponse {
    match state.api.token_boosts().await {
        Ok(resolved) => ok(flattened(&resolved)),
        Err(e) => gateway_failure(e),
    }
}

/// GET /api/cache/status
async fn cache_status(State(state): State<Arc<AppState>>) -> ApiResponse {
    let caches: serde_json::Map<String, Value> = state
        .api
        .gateway()
        .status()
        .into_iter()
        .map(|status| {
            let key = status.key.clone();
            (key, serde_json::to_value(status).unwrap_or(Value::Null))
        })
        .collect();
    ok(json!({
        "success": true,
        "timestamp": chrono::Utc::now(),
        "caches": caches,
    }))
}

/// POST /api/cache/refresh?key=
async fn cache_refresh(State(state): State<Arc<AppState>>, Query(q): Query<RefreshQuery>) -> ApiResponse {
    match required(q.key) {
        None => refresh_targets(&state, &state.refresh_targets).await,
        Some(key) if key == "all" => refresh_targets(&state, &state.refresh_targets).await,
        Some(key) => {
            let Some(target) = CacheTarget::parse(&key) else {
                return bad_request(&format!("Unknown cache key: {}", key));
            };
            match state.api.refresh(&target).await {
                Ok(report) => ok(json!({ "success": true, "refreshed": [report] })),
                Err(e) => gateway_failure(e),
            }
        }
    }
}

async fn refresh_targets(state: &AppState, targets: &[CacheTarget]) -> ApiResponse {
    let summary = refresh_all(&state.api, targets).await;
    ok(json!({
        "success": summary.failed.is_empty(),
        "refreshed": summary.refreshed,
        "failed": summary.failed,
    }))
}

/// POST /api/search/record
async fn record_search(State(state): State<Arc<AppState>>, Json(body): Json<RecordBody>) -> ApiResponse {
    let (Some(chain), Some(address)) = (required(body.chain), required(body.address)) else {
        return bad_request("Missing chain or address");
    };
    let record = state.api.search_log().record(&chain, &address);
    ok(json!({ "success": true, "count": record.count }))
}

/// GET /api/search/record
async fn search_records(State(state): State<Arc<AppState>>) -> ApiResponse {
    ok(json!({ "success": true, "records": state.api.search_log().all() }))
}

pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/tokens", get(tokens))
        .route("/search-tokens", get(search_tokens))
        .route("/token-details", get(token_details))
        .route("/token-kline", get(token_kline))
        .route("/crypto", get(crypto))
        .route("/token-boosts", get(token_boosts))
        .route("/cache/status", get(cache_status))
        .route("/cache/refresh", post(cache_refresh))
        .route("/search/record", get(search_records).post(record_search))
}
