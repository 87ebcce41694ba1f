//! Market data call sites
//!
//! Each method pairs one upstream fetch with its cache key, TTL and static
//! fallback, and hands the lot to the [`FetchCacheGateway`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{CacheStore, DiskStore, MemoryStore};
use crate::config::Config;
use crate::data::{
    fallback, AveClient, CoinGeckoClient, DexScreenerClient, KlineSeries, MarketOverview, RankedToken,
    SearchLog, SearchResults, Topic, TokenBoosts, TokenDetails,
};
use crate::gateway::{FetchCacheGateway, GatewayError, ResolveOptions, Resolved, Source};

/// Cache lifetimes per call site
pub struct CacheTtl;

impl CacheTtl {
    /// Ranking topics: 1h.
    pub const TOPICS: Duration = Duration::from_secs(60 * 60);
    /// Ranked tokens per topic: 1h.
    pub const RANKS: Duration = Duration::from_secs(60 * 60);
    /// Keyword search: 5min.
    pub const SEARCH: Duration = Duration::from_secs(5 * 60);
    /// Token detail: 60s.
    pub const TOKEN_DETAILS: Duration = Duration::from_secs(60);
    /// K-line candles: 60s.
    pub const KLINE: Duration = Duration::from_secs(60);
    /// CoinGecko overview: 60s.
    pub const MARKET_OVERVIEW: Duration = Duration::from_secs(60);
    /// DexScreener boosts: 15min.
    pub const TOKEN_BOOSTS: Duration = Duration::from_secs(15 * 60);
}

/// Chain segment of a search key without a chain filter
const ANY_CHAIN: &str = "*";

pub const TOPICS_KEY: &str = "topics";
pub const MARKET_OVERVIEW_KEY: &str = "crypto_overview";
pub const TOKEN_BOOSTS_KEY: &str = "token_boosts";

pub fn ranks_key(topic: &str) -> String {
    format!("tokens:{}", topic)
}

/// `search_tokens:{chain|*}:{keyword}`; the keyword is last so it may hold `:`
pub fn search_key(keyword: &str, chain: Option<&str>) -> String {
    let chain = chain.filter(|c| !c.is_empty()).unwrap_or(ANY_CHAIN);
    format!("search_tokens:{}:{}", chain, keyword.to_lowercase())
}

pub fn token_details_key(chain: &str, address: &str) -> String {
    format!("token_details:{}:{}", chain, address)
}

pub fn kline_key(chain: &str, address: &str, interval: &str, limit: u32) -> String {
    format!("kline:{}:{}:{}:{}", chain, address, interval, limit)
}

/// A cacheable call, recoverable from its cache key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheTarget {
    Topics,
    Ranks { topic: String },
    Search { keyword: String, chain: Option<String> },
    TokenDetails { address: String, chain: String },
    Kline { address: String, chain: String, interval: String, limit: u32 },
    MarketOverview,
    TokenBoosts,
}

impl CacheTarget {
    pub fn key(&self) -> String {
        match self {
            CacheTarget::Topics => TOPICS_KEY.to_string(),
            CacheTarget::Ranks { topic } => ranks_key(topic),
            CacheTarget::Search { keyword, chain } => search_key(keyword, chain.as_deref()),
            CacheTarget::TokenDetails { address, chain } => token_details_key(chain, address),
            CacheTarget::Kline {
                address,
                chain,
                interval,
                limit,
            } => kline_key(chain, address, interval, *limit),
            CacheTarget::MarketOverview => MARKET_OVERVIEW_KEY.to_string(),
            CacheTarget::TokenBoosts => TOKEN_BOOSTS_KEY.to_string(),
        }
    }

    /// Inverse of [`CacheTarget::key`]; `None` for keys no call site writes
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            TOPICS_KEY => return Some(CacheTarget::Topics),
            MARKET_OVERVIEW_KEY => return Some(CacheTarget::MarketOverview),
            TOKEN_BOOSTS_KEY => return Some(CacheTarget::TokenBoosts),
            _ => {}
        }

        let (prefix, rest) = key.split_once(':')?;
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        match prefix {
            "tokens" => Some(CacheTarget::Ranks {
                topic: non_empty(rest)?,
            }),
            "search_tokens" => {
                let (chain, keyword) = rest.split_once(':')?;
                Some(CacheTarget::Search {
                    keyword: non_empty(keyword)?,
                    chain: if chain == ANY_CHAIN { None } else { Some(non_empty(chain)?) },
                })
            }
            "token_details" => {
                let (chain, address) = rest.split_once(':')?;
                Some(CacheTarget::TokenDetails {
                    address: non_empty(address)?,
                    chain: non_empty(chain)?,
                })
            }
            "kline" => {
                let mut parts = rest.splitn(4, ':');
                let chain = non_empty(parts.next()?)?;
                let address = non_empty(parts.next()?)?;
                let interval = non_empty(parts.next()?)?;
                let limit = parts.next()?.parse().ok()?;
                Some(CacheTarget::Kline {
                    address,
                    chain,
                    interval,
                    limit,
                })
            }
            _ => None,
        }
    }
}

/// Outcome of a forced refresh
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub key: String,
    pub source: Source,
    pub stale: bool,
    pub stored_at: Option<DateTime<Utc>>,
}

/// Gateway plus upstream clients, shared by the CLI and the server
pub struct MarketApi {
    gateway: Arc<FetchCacheGateway>,
    ave: AveClient,
    coingecko: CoinGeckoClient,
    dexscreener: DexScreenerClient,
    search_log: SearchLog,
}

fn options<T>(ttl: Duration, force: bool) -> ResolveOptions<T> {
    ResolveOptions::new(ttl).forced(force)
}

impl MarketApi {
    pub fn new(
        gateway: Arc<FetchCacheGateway>,
        ave: AveClient,
        coingecko: CoinGeckoClient,
        dexscreener: DexScreenerClient,
    ) -> Self {
        Self {
            gateway,
            ave,
            coingecko,
            dexscreener,
            search_log: SearchLog::new(),
        }
    }

    /// Wires real clients and cache tiers from `config`
    ///
    /// The disk tier is skipped when disabled or when no cache directory can
    /// be determined.
    pub fn from_config(config: &Config) -> Self {
        let durable: Option<Arc<dyn CacheStore>> = if config.disk_cache {
            let store = match &config.cache_dir {
                Some(dir) => Some(DiskStore::with_dir(dir.clone())),
                None => DiskStore::new(),
            };
            match store {
                Some(store) => {
                    debug!(dir = %store.dir().display(), "disk cache enabled");
                    Some(Arc::new(store) as Arc<dyn CacheStore>)
                }
                None => {
                    warn!("no cache directory available, running memory-only");
                    None
                }
            }
        } else {
            None
        };

        let gateway = FetchCacheGateway::new(Arc::new(MemoryStore::new()), durable);
        let ave = AveClient::new(&config.ave_base_url, &config.ave_api_key);
        let coingecko = CoinGeckoClient::new(
            &config.coingecko_base_url,
            &config.coingecko_backup_url,
            config.coingecko_pro_api_key.as_deref(),
        );
        let dexscreener = DexScreenerClient::new(&config.dexscreener_base_url);
        Self::new(Arc::new(gateway), ave, coingecko, dexscreener)
    }

    pub fn gateway(&self) -> &Arc<FetchCacheGateway> {
        &self.gateway
    }

    pub fn search_log(&self) -> &SearchLog {
        &self.search_log
    }

    pub async fn topics(&self) -> Result<Resolved<Vec<Topic>>, GatewayError> {
        self.resolve_topics(false).await
    }

    pub async fn ranks(&self, topic: &str) -> Result<Resolved<Vec<RankedToken>>, GatewayError> {
        self.resolve_ranks(topic, false).await
    }

    /// Keyword search; there is no placeholder for search results
    pub async fn search(
        &self,
        keyword: &str,
        chain: Option<&str>,
    ) -> Result<Resolved<SearchResults>, GatewayError> {
        self.resolve_search(keyword, chain, false).await
    }

    pub async fn token_details(
        &self,
        address: &str,
        chain: &str,
    ) -> Result<Resolved<TokenDetails>, GatewayError> {
        self.resolve_token_details(address, chain, false).await
    }

    pub async fn klines(
        &self,
        address: &str,
        chain: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Resolved<KlineSeries>, GatewayError> {
        self.resolve_klines(address, chain, interval, limit, false).await
    }

    pub async fn market_overview(&self) -> Result<Resolved<MarketOverview>, GatewayError> {
        self.resolve_market_overview(false).await
    }

    pub async fn token_boosts(&self) -> Result<Resolved<TokenBoosts>, GatewayError> {
        self.resolve_token_boosts(false).await
    }

    /// Fetches `target` from upstream even if its cache entry is fresh
    ///
    /// A failed fetch still falls back to cached or placeholder data, so the
    /// report says where the value now being served came from.
    pub async fn refresh(&self, target: &CacheTarget) -> Result<RefreshReport, GatewayError> {
        let resolved = match target {
            CacheTarget::Topics => self.resolve_topics(true).await?.map(drop),
            CacheTarget::Ranks { topic } => self.resolve_ranks(topic, true).await?.map(drop),
            CacheTarget::Search { keyword, chain } => {
                self.resolve_search(keyword, chain.as_deref(), true).await?.map(drop)
            }
            CacheTarget::TokenDetails { address, chain } => {
                self.resolve_token_details(address, chain, true).await?.map(drop)
            }
            CacheTarget::Kline {
                address,
                chain,
                interval,
                limit,
            } => self
                .resolve_klines(address, chain, interval, *limit, true)
                .await?
                .map(drop),
            CacheTarget::MarketOverview => self.resolve_market_overview(true).await?.map(drop),
            CacheTarget::TokenBoosts => self.resolve_token_boosts(true).await?.map(drop),
        };
        Ok(RefreshReport {
            key: target.key(),
            source: resolved.source,
            stale: resolved.stale,
            stored_at: resolved.stored_at,
        })
    }

    // ── Call sites ──────────────────────────────────────────────────

    async fn resolve_topics(&self, force: bool) -> Result<Resolved<Vec<Topic>>, GatewayError> {
        self.gateway
            .resolve(
                TOPICS_KEY,
                || self.ave.topics(),
                options(CacheTtl::TOPICS, force).with_fallback(fallback::topics()),
            )
            .await
    }

    async fn resolve_ranks(&self, topic: &str, force: bool) -> Result<Resolved<Vec<RankedToken>>, GatewayError> {
        self.gateway
            .resolve(
                &ranks_key(topic),
                || self.ave.ranks(topic),
                options(CacheTtl::RANKS, force).with_fallback(fallback::ranked_tokens()),
            )
            .await
    }

    async fn resolve_search(
        &self,
        keyword: &str,
        chain: Option<&str>,
        force: bool,
    ) -> Result<Resolved<SearchResults>, GatewayError> {
        self.gateway
            .resolve(
                &search_key(keyword, chain),
                || self.ave.search(keyword, chain),
                options(CacheTtl::SEARCH, force),
            )
            .await
    }

    async fn resolve_token_details(
        &self,
        address: &str,
        chain: &str,
        force: bool,
    ) -> Result<Resolved<TokenDetails>, GatewayError> {
        self.gateway
            .resolve(
                &token_details_key(chain, address),
                || self.ave.token_details(address, chain),
                options(CacheTtl::TOKEN_DETAILS, force).with_fallback(fallback::token_details(address, chain)),
            )
            .await
    }

    async fn resolve_klines(
        &self,
        address: &str,
        chain: &str,
        interval: &str,
        limit: u32,
        force: bool,
    ) -> Result<Resolved<KlineSeries>, GatewayError> {
        let placeholder = fallback::kline_series(address, chain, interval, limit, Utc::now().timestamp());
        self.gateway
            .resolve(
                &kline_key(chain, address, interval, limit),
                || self.ave.klines(address, chain, interval, limit),
                options(CacheTtl::KLINE, force).with_fallback(placeholder),
            )
            .await
    }

    async fn resolve_market_overview(&self, force: bool) -> Result<Resolved<MarketOverview>, GatewayError> {
        self.gateway
            .resolve(
                MARKET_OVERVIEW_KEY,
                || self.coingecko.overview(),
                options(CacheTtl::MARKET_OVERVIEW, force).with_fallback(fallback::market_overview()),
            )
            .await
    }

    async fn resolve_token_boosts(&self, force: bool) -> Result<Resolved<TokenBoosts>, GatewayError> {
        self.gateway
            .resolve(
                TOKEN_BOOSTS_KEY,
                || self.dexscreener.top_boosts(),
                options(CacheTtl::TOKEN_BOOSTS, force).with_fallback(fallback::token_boosts()),
            )
            .await
    }
}
