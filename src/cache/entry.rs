use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A cached payload together with the time it was written
///
/// Serialized as `{"key", "value", "storedAt", "ttlMs"}` in the disk tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Key the entry was stored under
    pub key: String,
    /// Opaque payload
    pub value: Value,
    /// When the payload was written
    pub stored_at: DateTime<Utc>,
    /// How long the payload counts as fresh
    #[serde(rename = "ttlMs", with = "ttl_millis")]
    pub ttl: Duration,
}

impl CacheEntry {
    /// Creates an entry stamped with the current time
    pub fn new(key: impl Into<String>, value: Value, ttl: Duration) -> Self {
        Self::with_stored_at(key, value, ttl, Utc::now())
    }

    /// Creates an entry with an explicit write time
    pub fn with_stored_at(
        key: impl Into<String>,
        value: Value,
        ttl: Duration,
        stored_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            value,
            stored_at,
            ttl,
        }
    }

    /// Time elapsed since the entry was written, zero if `stored_at` is in the future
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.stored_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Time elapsed since the entry was written
    pub fn age(&self) -> Duration {
        self.age_at(Utc::now())
    }

    /// Whether `now - stored_at < ttl`
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.age_at(now) < self.ttl
    }

    /// Whether the entry is still within its TTL
    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Utc::now())
    }
}

mod ttl_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(ttl: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
