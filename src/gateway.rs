//! Fetch-cache-fallback orchestration
//!
//! [`FetchCacheGateway::resolve`] walks the states
//! `CHECK_VOLATILE -> CHECK_DURABLE -> FETCH_UPSTREAM` and ends in exactly one of
//! `STORE_AND_RETURN`, `RETURN_STALE`, `RETURN_STATIC_FALLBACK` or `ERROR`.
//! Any previously seen value beats an error: a stale price list is more
//! useful to the caller than an empty one.
//!
//! There is no request coalescing. Two concurrent misses for the same key
//! both go upstream and the last write wins; entries are replaced whole, so
//! that race never produces a torn read.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheStore, MemoryStore};
use crate::upstream::{CallOutcome, RequestError, UpstreamError};

/// Errors surfaced to gateway callers
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No fresh data, no stale data and no fallback
    #[error("data unavailable for '{key}'")]
    Unavailable {
        key: String,
        /// Why the upstream refresh failed; `None` when it was rate limited
        cause: Option<UpstreamError>,
    },

    /// The fetch function could not even build its request
    #[error(transparent)]
    InvalidRequest(#[from] RequestError),
}

/// Where a resolved value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Fresh entry in the in-process tier
    Volatile,
    /// Fresh entry in the disk tier, now promoted to the in-process tier
    Durable,
    /// Fetched just now and written through to every tier
    Upstream,
    /// Expired entry returned because the refresh failed
    StaleCache,
    /// Caller-supplied placeholder; nothing was cached
    StaticFallback,
}

/// A value returned by [`FetchCacheGateway::resolve`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolved<T> {
    pub value: T,
    /// `true` unless the value is within its TTL
    pub stale: bool,
    pub source: Source,
    /// When the value was fetched; `None` for static fallbacks
    pub stored_at: Option<DateTime<Utc>>,
}

impl<T> Resolved<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolved<U> {
        Resolved {
            value: f(self.value),
            stale: self.stale,
            source: self.source,
            stored_at: self.stored_at,
        }
    }
}

/// Per-call cache policy
#[derive(Debug, Clone)]
pub struct ResolveOptions<T> {
    pub ttl: Duration,
    pub static_fallback: Option<T>,
    /// Fetch even when a fresh entry exists
    pub force_refresh: bool,
}

impl<T> ResolveOptions<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            static_fallback: None,
            force_refresh: false,
        }
    }

    pub fn with_fallback(mut self, fallback: T) -> Self {
        self.static_fallback = Some(fallback);
        self
    }

    pub fn forced(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }
}

/// Snapshot of one cached key, newest entry across both tiers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub key: String,
    pub fresh: bool,
    pub age_seconds: u64,
    /// Seconds until the entry turns stale; negative once it has
    pub expires_in: i64,
    pub has_data: bool,
    /// Length of a list payload, or of its `tokens` list
    pub item_count: Option<usize>,
    pub stored_at: DateTime<Utc>,
    pub in_memory: bool,
    pub on_disk: bool,
}

impl CacheStatus {
    fn new(entry: &CacheEntry, now: DateTime<Utc>, in_memory: bool, on_disk: bool) -> Self {
        let age = entry.age_at(now);
        let secs = |d: Duration| i64::try_from(d.as_secs()).unwrap_or(i64::MAX);
        let item_count = entry
            .value
            .as_array()
            .or_else(|| entry.value["tokens"].as_array())
            .map(Vec::len);
        Self {
            key: entry.key.clone(),
            fresh: entry.is_fresh_at(now),
            age_seconds: age.as_secs(),
            expires_in: secs(entry.ttl).saturating_sub(secs(age)),
            has_data: !entry.value.is_null(),
            item_count,
            stored_at: entry.stored_at,
            in_memory,
            on_disk,
        }
    }
}

/// Cache-aside front for upstream fetches
///
/// Owns a volatile tier and, optionally, a durable tier. Construct one per
/// process and share it behind an `Arc`; tests build a fresh one each.
pub struct FetchCacheGateway {
    volatile: Arc<dyn CacheStore>,
    durable: Option<Arc<dyn CacheStore>>,
}

impl Default for FetchCacheGateway {
    fn default() -> Self {
        Self::new(Arc::new(MemoryStore::new()), None)
    }
}

impl FetchCacheGateway {
    pub fn new(volatile: Arc<dyn CacheStore>, durable: Option<Arc<dyn CacheStore>>) -> Self {
        Self { volatile, durable }
    }

    pub fn volatile(&self) -> &Arc<dyn CacheStore> {
        &self.volatile
    }

    pub fn durable(&self) -> Option<&Arc<dyn CacheStore>> {
        self.durable.as_ref()
    }

    /// Resolves `key` from cache or upstream
    ///
    /// `fetch` runs only when neither tier holds a fresh entry. On success the
    /// value is written through to both tiers before it is returned. When the
    /// refresh fails or is rate limited the newest cached entry is returned
    /// with `stale = true`; failing that, the static fallback; failing that,
    /// [`GatewayError::Unavailable`].
    pub async fn resolve<T, F, Fut>(
        &self,
        key: &str,
        fetch: F,
        options: ResolveOptions<T>,
    ) -> Result<Resolved<T>, GatewayError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CallOutcome<T>, RequestError>>,
    {
        let volatile_entry = self.volatile.get(key);
        let mut durable_entry = None;

        if options.force_refresh {
            debug!(key, "forced refresh, skipping cache lookup");
        } else {
            // CHECK_VOLATILE
            if let Some(entry) = volatile_entry.as_ref().filter(|e| e.is_fresh()) {
                if let Some(value) = decode::<T>(entry) {
                    debug!(key, "cache hit (memory)");
                    return Ok(fresh(value, Source::Volatile, entry));
                }
            }

            // CHECK_DURABLE
            if volatile_entry.is_none() {
                durable_entry = self.durable.as_ref().and_then(|durable| durable.get(key));
            }
            if let Some(entry) = durable_entry.as_ref().filter(|e| e.is_fresh()) {
                if let Some(value) = decode::<T>(entry) {
                    debug!(key, "cache hit (disk), promoting to memory");
                    self.volatile.insert(Arc::clone(entry));
                    return Ok(fresh(value, Source::Durable, entry));
                }
            }
        }

        // FETCH_UPSTREAM
        let cause = match fetch().await? {
            CallOutcome::Success(value) => return Ok(self.store(key, value, options.ttl)),
            CallOutcome::RateLimited => {
                warn!(key, "upstream rate limited");
                None
            }
            CallOutcome::Failed(e) => {
                warn!(key, error = %e, "upstream refresh failed");
                Some(e)
            }
        };

        // RETURN_STALE
        if let Some((value, entry, tier)) = self.newest_cached::<T>(key, volatile_entry, durable_entry) {
            // A failed forced refresh can leave a fresh entry here.
            if entry.is_fresh() {
                debug!(key, "refresh failed, keeping fresh entry");
                return Ok(fresh(value, tier, &entry));
            }
            warn!(key, age = ?entry.age(), "serving stale cache");
            return Ok(Resolved {
                value,
                stale: true,
                source: Source::StaleCache,
                stored_at: Some(entry.stored_at),
            });
        }

        // RETURN_STATIC_FALLBACK
        if let Some(value) = options.static_fallback {
            warn!(key, "no cached data, serving static fallback");
            return Ok(Resolved {
                value,
                stale: true,
                source: Source::StaticFallback,
                stored_at: None,
            });
        }

        // ERROR
        warn!(key, "no data available");
        Err(GatewayError::Unavailable {
            key: key.to_string(),
            cause,
        })
    }

    /// Every cached key with its freshness, sorted by key
    ///
    /// A key held by both tiers is reported from its newest entry.
    pub fn status(&self) -> Vec<CacheStatus> {
        let now = Utc::now();
        let mut newest: BTreeMap<String, (Arc<CacheEntry>, bool, bool)> = BTreeMap::new();

        let tiers = std::iter::once((self.volatile.entries(), true))
            .chain(self.durable.iter().map(|durable| (durable.entries(), false)));
        for (entries, is_memory) in tiers {
            for entry in entries {
                let slot = newest
                    .entry(entry.key.clone())
                    .or_insert_with(|| (Arc::clone(&entry), false, false));
                if entry.stored_at > slot.0.stored_at {
                    slot.0 = Arc::clone(&entry);
                }
                if is_memory {
                    slot.1 = true;
                } else {
                    slot.2 = true;
                }
            }
        }

        newest
            .values()
            .map(|(entry, in_memory, on_disk)| CacheStatus::new(entry, now, *in_memory, *on_disk))
            .collect()
    }

    /// STORE_AND_RETURN: writes `value` through both tiers
    fn store<T: Serialize>(&self, key: &str, value: T, ttl: Duration) -> Resolved<T> {
        match serde_json::to_value(&value) {
            Ok(json) => {
                let entry = Arc::new(CacheEntry::new(key, json, ttl));
                self.volatile.insert(Arc::clone(&entry));
                if let Some(durable) = &self.durable {
                    durable.insert(Arc::clone(&entry));
                }
                info!(key, ttl = ?ttl, "cache refreshed from upstream");
                Resolved {
                    value,
                    stale: false,
                    source: Source::Upstream,
                    stored_at: Some(entry.stored_at),
                }
            }
            Err(e) => {
                warn!(key, error = %e, "value not serializable, returning uncached");
                Resolved {
                    value,
                    stale: false,
                    source: Source::Upstream,
                    stored_at: Some(Utc::now()),
                }
            }
        }
    }

    /// Newest decodable entry across both tiers, whatever its age
    fn newest_cached<T: DeserializeOwned>(
        &self,
        key: &str,
        volatile_entry: Option<Arc<CacheEntry>>,
        durable_entry: Option<Arc<CacheEntry>>,
    ) -> Option<(T, Arc<CacheEntry>, Source)> {
        let durable_entry = durable_entry.or_else(|| self.durable.as_ref().and_then(|d| d.get(key)));

        let mut candidates: Vec<(Arc<CacheEntry>, Source)> = volatile_entry
            .map(|e| (e, Source::Volatile))
            .into_iter()
            .chain(durable_entry.map(|e| (e, Source::Durable)))
            .collect();
        candidates.sort_by(|a, b| b.0.stored_at.cmp(&a.0.stored_at));

        candidates
            .into_iter()
            .find_map(|(entry, tier)| decode::<T>(&entry).map(|value| (value, entry, tier)))
    }
}

fn fresh<T>(value: T, source: Source, entry: &CacheEntry) -> Resolved<T> {
    Resolved {
        value,
        stale: false,
        source,
        stored_at: Some(entry.stored_at),
    }
}

fn decode<T: DeserializeOwned>(entry: &CacheEntry) -> Option<T> {
    match serde_json::from_value(entry.value.clone()) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key = %entry.key, error = %e, "cached value has unexpected shape, ignoring");
            None
        }
    }
}
