//! CoinGecko market overview client

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::{token_color, MarketOverview, MarketToken};
use crate::upstream::{
    CallOutcome, RequestError, Target, Transport, UpstreamClient, UpstreamEndpoint, UpstreamRequest,
};

/// Public CoinGecko API
pub const COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Pro API, used as the backup host
pub const COINGECKO_BACKUP_URL: &str = "https://pro-api.coingecko.com/api/v3";

const USER_AGENT: &str = concat!("tickergate/", env!("CARGO_PKG_VERSION"));

/// Number of coins in the popular list
const POPULAR_COUNT: &str = "5";

/// Builds the CoinGecko endpoint: 5s timeout, 3 retries 1s apart
///
/// The backup host gets the pro API key when one is configured.
pub fn endpoint(base_url: &str, backup_url: &str, pro_api_key: Option<&str>) -> UpstreamEndpoint {
    let mut backup = Target::new(backup_url).with_header("User-Agent", USER_AGENT);
    if let Some(key) = pro_api_key {
        backup = backup.with_header("x-cg-pro-api-key", key);
    }
    UpstreamEndpoint::new(Target::new(base_url).with_header("User-Agent", USER_AGENT))
        .with_secondary(backup)
        .with_timeout(Duration::from_secs(5))
        .with_retries(3, Duration::from_millis(1000))
        .with_backoff_multiplier(1.0)
}

#[derive(Debug, Deserialize)]
struct MarketCoin {
    id: String,
    symbol: String,
    name: String,
    #[serde(default)]
    current_price: Option<f64>,
    #[serde(default)]
    price_change_percentage_24h: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Trending {
    coins: Vec<TrendingCoin>,
}

#[derive(Debug, Deserialize)]
struct TrendingCoin {
    item: TrendingItem,
}

#[derive(Debug, Deserialize)]
struct TrendingItem {
    id: String,
    symbol: String,
    name: String,
    #[serde(default)]
    price_btc: Option<f64>,
    #[serde(default)]
    data: Option<TrendingData>,
}

#[derive(Debug, Deserialize)]
struct TrendingData {
    #[serde(default)]
    price_change_percentage_24h: Option<UsdQuote>,
}

#[derive(Debug, Deserialize)]
struct UsdQuote {
    #[serde(default)]
    usd: Option<f64>,
}

fn market_token(id: String, symbol: &str, name: String, price: f64, change: f64) -> MarketToken {
    MarketToken {
        color: token_color(&id),
        id,
        name,
        symbol: symbol.to_uppercase(),
        price,
        change,
        icon: symbol.to_lowercase(),
    }
}

#[derive(Clone)]
pub struct CoinGeckoClient {
    upstream: UpstreamClient,
}

impl CoinGeckoClient {
    pub fn new(base_url: &str, backup_url: &str, pro_api_key: Option<&str>) -> Self {
        Self::with_upstream(UpstreamClient::new(endpoint(base_url, backup_url, pro_api_key)))
    }

    pub fn with_transport(
        base_url: &str,
        backup_url: &str,
        pro_api_key: Option<&str>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::with_upstream(UpstreamClient::with_transport(
            endpoint(base_url, backup_url, pro_api_key),
            transport,
        ))
    }

    pub fn with_upstream(upstream: UpstreamClient) -> Self {
        Self { upstream }
    }

    /// Top coins by market cap
    pub async fn markets(&self) -> Result<CallOutcome<Vec<MarketToken>>, RequestError> {
        let request = UpstreamRequest::get("/coins/markets")
            .query("vs_currency", "usd")
            .query("order", "market_cap_desc")
            .query("per_page", POPULAR_COUNT)
            .query("page", "1")
            .query("sparkline", "false")
            .query("locale", "en");
        let outcome = self.upstream.call(&request).await?;
        Ok(outcome.json::<Vec<MarketCoin>>().map(|coins| {
            coins
                .into_iter()
                .map(|c| {
                    market_token(
                        c.id,
                        &c.symbol,
                        c.name,
                        c.current_price.unwrap_or(0.0),
                        c.price_change_percentage_24h.unwrap_or(0.0),
                    )
                })
                .collect()
        }))
    }

    /// Trending searches; `price` is quoted in BTC
    pub async fn trending(&self) -> Result<CallOutcome<Vec<MarketToken>>, RequestError> {
        let outcome = self.upstream.call(&UpstreamRequest::get("/search/trending")).await?;
        Ok(outcome.json::<Trending>().map(|trending| {
            trending
                .coins
                .into_iter()
                .map(|TrendingCoin { item }| {
                    let change = item
                        .data
                        .and_then(|d| d.price_change_percentage_24h)
                        .and_then(|q| q.usd)
                        .unwrap_or(0.0);
                    market_token(item.id, &item.symbol, item.name, item.price_btc.unwrap_or(0.0), change)
                })
                .collect()
        }))
    }

    /// Popular and trending lists, fetched concurrently
    ///
    /// Any rate limit makes the whole overview `RateLimited`; otherwise the
    /// first failure wins.
    pub async fn overview(&self) -> Result<CallOutcome<MarketOverview>, RequestError> {
        let (popular, trending) = futures::future::try_join(self.markets(), self.trending()).await?;
        Ok(match (popular, trending) {
            (CallOutcome::RateLimited, _) | (_, CallOutcome::RateLimited) => CallOutcome::RateLimited,
            (CallOutcome::Failed(e), _) | (_, CallOutcome::Failed(e)) => CallOutcome::Failed(e),
            (CallOutcome::Success(popular_tokens), CallOutcome::Success(trending_tokens)) => {
                CallOutcome::Success(MarketOverview {
                    popular_tokens,
                    trending_tokens,
                })
            }
        })
    }
}
