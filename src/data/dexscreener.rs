//! DexScreener token boosts client
//!
//! `/token-boosts/top/v1` answers with a bare array of boost rows. Older
//! deployments wrapped the rows in `{"data": [...]}`; both shapes are read.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::{non_empty, num, text, BoostedToken, TokenBoosts};
use crate::upstream::{
    CallOutcome, RequestError, Target, Transport, UpstreamClient, UpstreamEndpoint, UpstreamError,
    UpstreamRequest,
};

pub const DEXSCREENER_BASE_URL: &str = "https://api.dexscreener.com";

const DEFAULT_CHAIN: &str = "ethereum";

/// Builds the DexScreener endpoint: 10s timeout, 1 retry after 1s
pub fn endpoint(base_url: &str) -> UpstreamEndpoint {
    UpstreamEndpoint::new(Target::new(base_url).with_header("Accept", "*/*"))
        .with_timeout(Duration::from_secs(10))
        .with_retries(1, Duration::from_millis(1000))
}

#[derive(Clone)]
pub struct DexScreenerClient {
    upstream: UpstreamClient,
}

impl DexScreenerClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_upstream(UpstreamClient::new(endpoint(base_url)))
    }

    pub fn with_transport(base_url: &str, transport: Arc<dyn Transport>) -> Self {
        Self::with_upstream(UpstreamClient::with_transport(endpoint(base_url), transport))
    }

    pub fn with_upstream(upstream: UpstreamClient) -> Self {
        Self { upstream }
    }

    /// Most boosted tokens (`GET /token-boosts/top/v1`)
    pub async fn top_boosts(&self) -> Result<CallOutcome<TokenBoosts>, RequestError> {
        let outcome = self
            .upstream
            .call(&UpstreamRequest::get("/token-boosts/top/v1"))
            .await?;
        Ok(outcome.json::<Value>().and_then(|body| {
            let rows = match &body {
                Value::Array(rows) => rows,
                Value::Object(map) => match map.get("data") {
                    Some(Value::Array(rows)) => rows,
                    _ => return Err(UpstreamError::Malformed("boosts response has no rows".into())),
                },
                _ => return Err(UpstreamError::Malformed("boosts response is not a list".into())),
            };
            let tokens: Vec<BoostedToken> = rows.iter().map(boosted_token).collect();
            Ok(TokenBoosts {
                count: tokens.len(),
                tokens,
            })
        }))
    }
}

/// First non-empty field among `names`
fn first(row: &Value, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| non_empty(text(&row[*name])))
}

fn boosted_token(row: &Value) -> BoostedToken {
    BoostedToken {
        name: first(row, &["name"]).unwrap_or_else(|| "Unknown".into()),
        symbol: first(row, &["symbol"]).unwrap_or_else(|| "Unknown".into()),
        address: first(row, &["address", "tokenAddress"]).unwrap_or_default(),
        chain: first(row, &["chain", "chainId"]).unwrap_or_else(|| DEFAULT_CHAIN.into()),
        logo: first(row, &["logo", "icon"]),
        price: row["price"]["usd"].as_f64().or_else(|| {
            row["price"]["usd"]
                .as_str()
                .and_then(|s| s.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
        }),
        boost_amount: num(&row["totalAmount"]),
        url: first(row, &["url"]),
    }
}
