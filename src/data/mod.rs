//! Market data models and upstream API clients
//!
//! The clients only know how to build a request and shape the response; they
//! return a [`CallOutcome`](crate::upstream::CallOutcome) and leave caching to
//! the gateway.

pub mod ave;
pub mod coingecko;
pub mod dexscreener;
pub mod fallback;
pub mod search_log;

pub use ave::AveClient;
pub use coingecko::CoinGeckoClient;
pub use dexscreener::DexScreenerClient;
pub use search_log::{SearchLog, SearchRecord};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::upstream::RequestError;

/// Longest address, chain or interval accepted in an upstream path
const MAX_PARAM_LEN: usize = 128;

/// A ranking category offered by Ave.ai (e.g. "hot", "meme")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    #[serde(default)]
    pub name_en: String,
    #[serde(default)]
    pub name_zh: String,
}

/// A token row in a ranking or search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedToken {
    /// Contract address
    pub token: String,
    pub chain: String,
    pub symbol: String,
    pub name: String,
    pub logo_url: String,
    pub current_price_usd: f64,
    /// 24h price change in percent
    pub price_change_24h: f64,
    /// 24h traded volume in USD
    pub tx_volume_u_24h: f64,
    pub holders: u64,
    pub market_cap: String,
    pub fdv: String,
    pub risk_score: String,
}

/// Tokens matching a keyword search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub tokens: Vec<RankedToken>,
    pub count: usize,
    pub keyword: String,
    /// Chain filter, or "all"
    pub chain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Detail view of a single token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDetails {
    pub symbol: String,
    pub name: String,
    pub address: String,
    pub logo: String,
    pub price: f64,
    pub price_change: f64,
    pub volume_24h: f64,
    pub market_cap: f64,
    pub total_supply: f64,
    pub holders: u64,
    pub lp_amount: f64,
    pub lock_percent: f64,
    pub chain: String,
}

/// One candle of a K-line series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KlinePoint {
    /// Unix timestamp in seconds
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// K-line candles for a token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KlineSeries {
    #[serde(rename = "klineData")]
    pub points: Vec<KlinePoint>,
    pub token_id: String,
    /// Interval label as requested (e.g. "1h")
    pub interval: String,
    pub limit: u32,
}

/// A token tile in the market overview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketToken {
    /// CoinGecko coin id
    pub id: String,
    pub name: String,
    /// Upper-case ticker
    pub symbol: String,
    pub price: f64,
    /// 24h change in percent
    pub change: f64,
    /// Lower-case ticker, used as icon name
    pub icon: String,
    /// `#rrggbb` accent colour
    pub color: String,
}

/// Popular (by market cap) and trending tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketOverview {
    pub popular_tokens: Vec<MarketToken>,
    pub trending_tokens: Vec<MarketToken>,
}

/// A token promoted on DexScreener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedToken {
    pub name: String,
    pub symbol: String,
    pub address: String,
    pub chain: String,
    pub logo: Option<String>,
    /// USD price, when the upstream quotes one
    pub price: Option<f64>,
    /// Total boost amount bought for the token
    #[serde(default)]
    pub boost_amount: f64,
    #[serde(default)]
    pub url: Option<String>,
}

/// Top boosted tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBoosts {
    pub tokens: Vec<BoostedToken>,
    pub count: usize,
}

/// Converts an interval label into Ave.ai minutes; unknown labels mean daily
pub fn interval_minutes(label: &str) -> u32 {
    match label {
        "1m" => 1,
        "5m" => 5,
        "15m" => 15,
        "30m" => 30,
        "1h" => 60,
        "2h" => 120,
        "4h" => 240,
        "1d" => 1440,
        "3d" => 4320,
        "1w" => 10080,
        "1M" => 43200,
        "1y" => 525600,
        _ => 1440,
    }
}

/// Stable `#rrggbb` colour derived from a token id (FNV-1a)
pub fn token_color(id: &str) -> String {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in id.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    format!("#{:06x}", hash & 0x00ff_ffff)
}

// ── Path parameters ─────────────────────────────────────────────────

/// Accepts ASCII alphanumeric contract addresses (hex or base58)
pub fn check_address(address: &str) -> Result<(), RequestError> {
    check_param("address", address, |c| c.is_ascii_alphanumeric())
}

/// Accepts chain ids such as `bsc` or `binance-smart-chain`
pub fn check_chain(chain: &str) -> Result<(), RequestError> {
    check_param("chain", chain, |c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn check_interval(interval: &str) -> Result<(), RequestError> {
    check_param("interval", interval, |c| c.is_ascii_alphanumeric())
}

fn check_param(name: &'static str, value: &str, allowed: impl Fn(char) -> bool) -> Result<(), RequestError> {
    if value.is_empty() || value.len() > MAX_PARAM_LEN || !value.chars().all(allowed) {
        return Err(RequestError::InvalidParam {
            name,
            value: value.to_string(),
        });
    }
    Ok(())
}

// ── Lenient JSON fields ─────────────────────────────────────────────

/// Number from a JSON number or numeric string; anything else is 0
pub(crate) fn num(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Non-negative integer, truncating fractional input
pub(crate) fn int(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u64))
                .unwrap_or(0)
        }
        _ => 0,
    }
}

pub(crate) fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

pub(crate) fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
