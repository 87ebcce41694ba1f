//! Two-tier cache for upstream payloads
//!
//! A [`MemoryStore`] serves hot reads for the lifetime of the process and a
//! [`DiskStore`] keeps JSON snapshots across restarts. Both sit behind the
//! [`CacheStore`] trait so the gateway can be handed any combination of tiers.
//!
//! Entries are never expired by TTL. Freshness is decided at read time, and a
//! stale entry stays around as the fallback value for when upstream fails.

mod disk;
mod entry;
mod memory;

pub use disk::{sanitize_key, CacheError, DiskStore};
pub use entry::CacheEntry;
pub use memory::MemoryStore;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

/// Key/value store holding immutable [`CacheEntry`] snapshots
///
/// Implementations must not perform network I/O. A write replaces the whole
/// entry so concurrent readers see either the old or the new snapshot.
pub trait CacheStore: Send + Sync {
    /// Returns the entry for `key`, fresh or stale
    fn get(&self, key: &str) -> Option<Arc<CacheEntry>>;

    /// Stores `entry` unchanged, keeping its `stored_at` and `ttl`
    fn insert(&self, entry: Arc<CacheEntry>);

    /// Every entry currently held, in no particular order
    fn entries(&self) -> Vec<Arc<CacheEntry>>;

    /// Stamps `value` with the current time and stores it under `key`
    fn put(&self, key: &str, value: Value, ttl: Duration) -> Arc<CacheEntry> {
        let entry = Arc::new(CacheEntry::new(key, value, ttl));
        self.insert(Arc::clone(&entry));
        entry
    }
}
