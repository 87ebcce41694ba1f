//! Ave.ai token data client
//!
//! Every Ave.ai response is wrapped in `{"status": 1, "data": ...}`. Numeric
//! fields come back as strings or numbers depending on the endpoint, so rows
//! are shaped from raw JSON with lenient helpers rather than derived structs.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{
    check_address, check_chain, check_interval, int, interval_minutes, non_empty, num, text, KlinePoint,
    KlineSeries, RankedToken, SearchResults, Topic, TokenDetails,
};
use crate::upstream::{
    CallOutcome, RequestError, Target, Transport, UpstreamClient, UpstreamEndpoint, UpstreamError,
    UpstreamRequest,
};

/// Production Ave.ai API
pub const AVE_BASE_URL: &str = "https://prod.ave-api.com";

/// Searches are interactive; cap them tighter than the endpoint default
const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

const NO_SEARCH_RESULTS: &str = "No tokens found matching your search";

/// Builds the Ave.ai endpoint: 15s timeout, 2 retries starting at 1s, x1.5
pub fn endpoint(base_url: &str, api_key: &str) -> UpstreamEndpoint {
    UpstreamEndpoint::new(Target::new(base_url).with_header("X-API-KEY", api_key))
        .with_timeout(Duration::from_secs(15))
        .with_retries(2, Duration::from_millis(1000))
        .with_backoff_multiplier(1.5)
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: Value,
    #[serde(default)]
    data: Option<Value>,
}

impl Envelope {
    /// `data` when the envelope reports success
    fn into_data(self) -> Option<Value> {
        let ok = self.status.as_i64() == Some(1) || self.status.as_str() == Some("1");
        match self.data {
            Some(data) if ok && !data.is_null() => Some(data),
            _ => None,
        }
    }
}

/// Client for the Ave.ai ranking, search, detail and K-line endpoints
#[derive(Clone)]
pub struct AveClient {
    upstream: UpstreamClient,
}

impl AveClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self::with_upstream(UpstreamClient::new(endpoint(base_url, api_key)))
    }

    pub fn with_transport(base_url: &str, api_key: &str, transport: Arc<dyn Transport>) -> Self {
        Self::with_upstream(UpstreamClient::with_transport(endpoint(base_url, api_key), transport))
    }

    pub fn with_upstream(upstream: UpstreamClient) -> Self {
        Self { upstream }
    }

    /// Ranking topics (`GET /v2/ranks/topics`)
    pub async fn topics(&self) -> Result<CallOutcome<Vec<Topic>>, RequestError> {
        let outcome = self.upstream.call(&UpstreamRequest::get("/v2/ranks/topics")).await?;
        Ok(outcome.and_then(|body| {
            let data = envelope_data(&body)?;
            serde_json::from_value(data).map_err(|e| UpstreamError::Malformed(e.to_string()))
        }))
    }

    /// Ranked tokens for `topic` (`GET /v2/ranks?topic=`)
    pub async fn ranks(&self, topic: &str) -> Result<CallOutcome<Vec<RankedToken>>, RequestError> {
        let request = UpstreamRequest::get("/v2/ranks").query("topic", topic);
        let outcome = self.upstream.call(&request).await?;
        Ok(outcome.and_then(|body| {
            let data = envelope_data(&body)?;
            Ok(rows(&data).iter().map(ranked_token).collect())
        }))
    }

    /// Keyword search, optionally restricted to one chain
    ///
    /// An envelope without data is an empty result, not a failure.
    pub async fn search(
        &self,
        keyword: &str,
        chain: Option<&str>,
    ) -> Result<CallOutcome<SearchResults>, RequestError> {
        let chain = chain.filter(|c| !c.is_empty());
        if let Some(chain) = chain {
            check_chain(chain)?;
        }
        let mut request = UpstreamRequest::get("/v2/tokens")
            .query("keyword", keyword)
            .timeout(SEARCH_TIMEOUT);
        if let Some(chain) = chain {
            request = request.query("chain", chain);
        }

        let outcome = self.upstream.call(&request).await?;
        let keyword = keyword.to_string();
        let chain = chain.unwrap_or("all").to_string();
        Ok(outcome.and_then(|body| {
            let envelope: Envelope = serde_json::from_slice(&body)
                .map_err(|e| UpstreamError::Malformed(e.to_string()))?;
            let Some(data) = envelope.into_data() else {
                debug!(%keyword, "search returned no data");
                return Ok(SearchResults {
                    tokens: Vec::new(),
                    count: 0,
                    keyword,
                    chain,
                    message: Some(NO_SEARCH_RESULTS.to_string()),
                });
            };
            let tokens: Vec<RankedToken> = rows(&data).iter().map(search_token).collect();
            Ok(SearchResults {
                count: tokens.len(),
                tokens,
                keyword,
                chain,
                message: None,
            })
        }))
    }

    /// Detail of one token (`GET /v2/tokens/{address}?chain=`)
    ///
    /// `address` and `chain` become part of the URL path and are checked first.
    pub async fn token_details(
        &self,
        address: &str,
        chain: &str,
    ) -> Result<CallOutcome<TokenDetails>, RequestError> {
        check_address(address)?;
        check_chain(chain)?;
        let request = UpstreamRequest::get(format!("/v2/tokens/{}", address)).query("chain", chain);
        let outcome = self.upstream.call(&request).await?;
        Ok(outcome.and_then(|body| {
            let data = envelope_data(&body)?;
            let data = match data {
                Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
                other => other,
            };
            if !data.is_object() {
                return Err(UpstreamError::Malformed("token detail is not an object".into()));
            }
            Ok(TokenDetails {
                symbol: text(&data["symbol"]),
                name: text(&data["name"]),
                address: text(&data["token"]),
                logo: text(&data["logo_url"]),
                price: num(&data["current_price_usd"]),
                price_change: num(&data["price_change_24h"]),
                volume_24h: num(&data["tx_volume_u_24h"]),
                market_cap: num(&data["market_cap"]),
                total_supply: num(&data["total_supply"]),
                holders: int(&data["holders"]),
                lp_amount: num(&data["lp_amount"]),
                lock_percent: num(&data["lock_percent"]),
                chain: non_empty(text(&data["chain"])).unwrap_or_else(|| chain.to_string()),
            })
        }))
    }

    /// K-line candles (`GET /v2/klines/token/{address}-{chain}`)
    pub async fn klines(
        &self,
        address: &str,
        chain: &str,
        interval: &str,
        limit: u32,
    ) -> Result<CallOutcome<KlineSeries>, RequestError> {
        check_address(address)?;
        check_chain(chain)?;
        check_interval(interval)?;
        let token_id = format!("{}-{}", address, chain);
        let request = UpstreamRequest::get(format!("/v2/klines/token/{}", token_id))
            .query("interval", interval_minutes(interval).to_string())
            .query("size", limit.to_string());
        let outcome = self.upstream.call(&request).await?;
        Ok(outcome.and_then(|body| {
            let data = envelope_data(&body)?;
            let Some(points) = data["points"].as_array() else {
                return Err(UpstreamError::Malformed("kline data has no points".into()));
            };
            let points = points
                .iter()
                .map(|p| KlinePoint {
                    time: int(&p["time"]) as i64,
                    open: num(&p["open"]),
                    high: num(&p["high"]),
                    low: num(&p["low"]),
                    close: num(&p["close"]),
                    volume: num(&p["volume"]),
                })
                .collect();
            Ok(KlineSeries {
                points,
                token_id: non_empty(text(&data["pair_id"])).unwrap_or(token_id),
                interval: interval.to_string(),
                limit,
            })
        }))
    }
}

fn envelope_data(body: &[u8]) -> Result<Value, UpstreamError> {
    let envelope: Envelope =
        serde_json::from_slice(body).map_err(|e| UpstreamError::Malformed(e.to_string()))?;
    envelope
        .into_data()
        .ok_or_else(|| UpstreamError::Malformed("unsuccessful Ave.ai response".into()))
}

fn rows(data: &Value) -> &[Value] {
    data.as_array().map(Vec::as_slice).unwrap_or_default()
}

fn ranked_token(row: &Value) -> RankedToken {
    let symbol = text(&row["symbol"]);
    let name = appendix_name(row)
        .or_else(|| non_empty(symbol.clone()))
        .unwrap_or_else(|| "Unknown Token".to_string());
    shape_token(row, symbol, name)
}

/// Search rows carry their own `name`, preferred over the appendix
fn search_token(row: &Value) -> RankedToken {
    let symbol = text(&row["symbol"]);
    let name = non_empty(text(&row["name"]))
        .or_else(|| appendix_name(row))
        .or_else(|| non_empty(symbol.clone()))
        .unwrap_or_else(|| "Unknown Token".to_string());
    shape_token(row, symbol, name)
}

fn shape_token(row: &Value, symbol: String, name: String) -> RankedToken {
    RankedToken {
        token: text(&row["token"]),
        chain: text(&row["chain"]),
        symbol,
        name,
        logo_url: text(&row["logo_url"]),
        current_price_usd: num(&row["current_price_usd"]),
        price_change_24h: num(&row["price_change_24h"]),
        tx_volume_u_24h: num(&row["tx_volume_u_24h"]),
        holders: int(&row["holders"]),
        market_cap: non_empty(text(&row["market_cap"])).unwrap_or_else(|| "0".into()),
        fdv: non_empty(text(&row["fdv"])).unwrap_or_else(|| "0".into()),
        risk_score: non_empty(text(&row["risk_score"])).unwrap_or_else(|| "0".into()),
    }
}

/// `tokenName` from the JSON-encoded `appendix` string, if any
fn appendix_name(row: &Value) -> Option<String> {
    let raw = row["appendix"].as_str()?;
    match serde_json::from_str::<Value>(raw) {
        Ok(appendix) => non_empty(text(&appendix["tokenName"])),
        Err(e) => {
            debug!(error = %e, "unparsable appendix");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::fake::FakeTransport;
    use serde_json::json;

    const BASE: &str = "http://ave.test";

    fn client(transport: FakeTransport) -> (AveClient, Arc<FakeTransport>) {
        let transport = Arc::new(transport);
        let upstream = UpstreamClient::with_transport(
            endpoint(BASE, "test-key").with_retries(0, Duration::from_millis(1)),
            transport.clone(),
        );
        (AveClient::with_upstream(upstream), transport)
    }

    #[tokio::test]
    async fn test_topics_unwraps_envelope() {
        let body = r#"{"status":1,"data":[{"id":"hot","name_en":"Hot","name_zh":"热门"}]}"#;
        let (ave, transport) = client(FakeTransport::new().route("ave.test/v2/ranks/topics", 200, body));

        let topics = ave.topics().await.unwrap().success().unwrap();

        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].id, "hot");
        assert_eq!(topics[0].name_zh, "热门");
        let requests = transport.requests();
        assert!(requests[0].headers.contains(&("X-API-KEY".to_string(), "test-key".to_string())));
    }

    #[tokio::test]
    async fn test_failed_envelope_is_malformed() {
        let body = r#"{"status":0,"msg":"bad key"}"#;
        let (ave, _) = client(FakeTransport::new().route("ave.test/v2/ranks/topics", 200, body));

        let outcome = ave.topics().await.unwrap();

        assert!(matches!(outcome, CallOutcome::Failed(UpstreamError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_ranks_parses_strings_leniently() {
        let body = json!({
            "status": 1,
            "data": [{
                "token": "0xabc",
                "chain": "bsc",
                "symbol": "PEPE",
                "appendix": "{\"tokenName\":\"Pepe Coin\"}",
                "current_price_usd": "0.0000012",
                "price_change_24h": -3.5,
                "tx_volume_u_24h": "oops",
                "holders": "1200",
                "market_cap": 5000000
            }]
        })
        .to_string();
        let (ave, transport) = client(FakeTransport::new().route("ave.test/v2/ranks", 200, &body));

        let tokens = ave.ranks("meme").await.unwrap().success().unwrap();

        let token = &tokens[0];
        assert_eq!(token.name, "Pepe Coin");
        assert_eq!(token.current_price_usd, 0.0000012);
        assert_eq!(token.price_change_24h, -3.5);
        assert_eq!(token.tx_volume_u_24h, 0.0);
        assert_eq!(token.holders, 1200);
        assert_eq!(token.market_cap, "5000000");
        assert_eq!(token.fdv, "0");
        assert_eq!(transport.requests()[0].url.query(), Some("topic=meme"));
    }

    #[test]
    fn test_ranked_token_name_fallbacks() {
        let with_symbol = ranked_token(&json!({"symbol": "DOGE", "appendix": "not json"}));
        assert_eq!(with_symbol.name, "DOGE");

        let bare = ranked_token(&json!({}));
        assert_eq!(bare.name, "Unknown Token");
        assert_eq!(bare.risk_score, "0");
    }

    #[tokio::test]
    async fn test_search_without_data_is_empty_result() {
        let body = r#"{"status":1,"data":null}"#;
        let (ave, transport) = client(FakeTransport::new().route("ave.test/v2/tokens", 200, body));

        let results = ave.search("nothing", None).await.unwrap().success().unwrap();

        assert!(results.tokens.is_empty());
        assert_eq!(results.count, 0);
        assert_eq!(results.chain, "all");
        assert_eq!(results.message.as_deref(), Some(NO_SEARCH_RESULTS));
        assert_eq!(transport.requests()[0].url.query(), Some("keyword=nothing"));
    }

    #[tokio::test]
    async fn test_search_prefers_row_name() {
        let body = json!({
            "status": 1,
            "data": [
                {"token": "0x1", "symbol": "A", "name": "Alpha", "appendix": "{\"tokenName\":\"Other\"}"},
                {"token": "0x2", "symbol": "B", "appendix": "{\"tokenName\":\"Beta\"}"}
            ]
        })
        .to_string();
        let (ave, transport) = client(FakeTransport::new().route("ave.test/v2/tokens", 200, &body));

        let results = ave.search("a", Some("eth")).await.unwrap().success().unwrap();

        assert_eq!(results.count, 2);
        assert_eq!(results.tokens[0].name, "Alpha");
        assert_eq!(results.tokens[1].name, "Beta");
        assert_eq!(results.chain, "eth");
        assert_eq!(transport.requests()[0].url.query(), Some("keyword=a&chain=eth"));
    }

    #[tokio::test]
    async fn test_token_details_maps_fields() {
        let body = json!({
            "status": 1,
            "data": {
                "symbol": "BL", "name": "Blast", "token": "0xdef", "logo_url": "https://logo",
                "current_price_usd": "0.5", "price_change_24h": "1.25", "tx_volume_u_24h": 10,
                "market_cap": "100", "total_supply": "1000", "holders": 42,
                "lp_amount": "7", "lock_percent": "99.5", "chain": "eth"
            }
        })
        .to_string();
        let (ave, transport) = client(FakeTransport::new().route("ave.test/v2/tokens/0xdef", 200, &body));

        let details = ave.token_details("0xdef", "eth").await.unwrap().success().unwrap();

        assert_eq!(details.address, "0xdef");
        assert_eq!(details.price, 0.5);
        assert_eq!(details.holders, 42);
        assert_eq!(details.lock_percent, 99.5);
        assert_eq!(transport.requests()[0].url.query(), Some("chain=eth"));
    }

    #[tokio::test]
    async fn test_klines_converts_interval_and_points() {
        let body = json!({
            "status": 1,
            "data": {
                "pair_id": "0xabc-bsc",
                "points": [
                    {"time": 1700000000, "open": "1.0", "high": "2.0", "low": "0.5", "close": "1.5", "volume": "300"}
                ]
            }
        })
        .to_string();
        let (ave, transport) =
            client(FakeTransport::new().route("ave.test/v2/klines/token/0xabc-bsc", 200, &body));

        let series = ave.klines("0xabc", "bsc", "4h", 50).await.unwrap().success().unwrap();

        assert_eq!(series.points.len(), 1);
        assert_eq!(series.points[0].time, 1_700_000_000);
        assert_eq!(series.points[0].close, 1.5);
        assert_eq!(series.token_id, "0xabc-bsc");
        assert_eq!(series.interval, "4h");
        assert_eq!(transport.requests()[0].url.query(), Some("interval=240&size=50"));
    }

    #[tokio::test]
    async fn test_klines_without_points_is_malformed() {
        let body = r#"{"status":1,"data":{"pair_id":"x"}}"#;
        let (ave, _) = client(FakeTransport::new().route("ave.test/v2/klines/token/0xabc-bsc", 200, body));

        let outcome = ave.klines("0xabc", "bsc", "1d", 100).await.unwrap();

        assert!(matches!(outcome, CallOutcome::Failed(UpstreamError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_token_details_rejects_address_with_path_syntax() {
        let (ave, transport) = client(FakeTransport::new().route("ave.test/v2/ranks", 200, "{}"));

        let err = ave.token_details("../ranks?topic=hot#", "eth").await.unwrap_err();

        assert_eq!(
            err,
            RequestError::InvalidParam {
                name: "address",
                value: "../ranks?topic=hot#".into()
            }
        );
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_klines_rejects_traversal_before_sending() {
        let (ave, transport) = client(FakeTransport::new());

        let bad_address = ave.klines("0x1/../../ranks/topics?", "bsc", "1d", 10).await;
        let bad_chain = ave.klines("0x1", "bsc#", "1d", 10).await;
        let bad_interval = ave.klines("0x1", "bsc", "1d&size=1", 10).await;

        assert!(matches!(bad_address, Err(RequestError::InvalidParam { name: "address", .. })));
        assert!(matches!(bad_chain, Err(RequestError::InvalidParam { name: "chain", .. })));
        assert!(matches!(bad_interval, Err(RequestError::InvalidParam { name: "interval", .. })));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_search_treats_empty_chain_as_all() {
        let body = r#"{"status":1,"data":[]}"#;
        let (ave, transport) = client(FakeTransport::new().route("ave.test/v2/tokens", 200, body));

        let results = ave.search("pepe", Some("")).await.unwrap().success().unwrap();

        assert_eq!(results.chain, "all");
        assert_eq!(transport.requests()[0].url.query(), Some("keyword=pepe"));
    }

    #[tokio::test]
    async fn test_http_error_surfaces_as_failed() {
        let (ave, _) = client(FakeTransport::new().route("ave.test/v2/ranks", 500, "down"));

        let outcome = ave.ranks("hot").await.unwrap();

        assert!(matches!(outcome, CallOutcome::Failed(UpstreamError::Status { status: 500, .. })));
    }
}
