use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::{CacheEntry, CacheStore};

/// Process-lifetime cache tier
///
/// Holds `Arc<CacheEntry>` snapshots; a write swaps the pointer so a reader
/// holding the previous `Arc` keeps a consistent value/`stored_at` pair.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Arc<CacheEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn insert(&self, entry: Arc<CacheEntry>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.key.clone(), entry);
    }

    fn entries(&self) -> Vec<Arc<CacheEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_get_returns_none_for_missing_key() {
        let store = MemoryStore::new();
        assert!(store.get("missing").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_then_get_returns_entry() {
        let store = MemoryStore::new();
        store.put("topics", json!(["hot"]), Duration::from_secs(60));

        let entry = store.get("topics").expect("entry should exist");
        assert_eq!(entry.value, json!(["hot"]));
        assert_eq!(entry.ttl, Duration::from_secs(60));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_put_replaces_entry_without_touching_old_snapshot() {
        let store = MemoryStore::new();
        store.put("k", json!(1), Duration::from_secs(60));
        let before = store.get("k").unwrap();

        store.put("k", json!(2), Duration::from_secs(60));
        let after = store.get("k").unwrap();

        assert_eq!(before.value, json!(1));
        assert_eq!(after.value, json!(2));
        assert!(after.stored_at >= before.stored_at);
    }

    #[test]
    fn test_insert_preserves_stored_at() {
        let store = MemoryStore::new();
        let entry = Arc::new(CacheEntry::new("k", json!("v"), Duration::from_secs(5)));
        store.insert(Arc::clone(&entry));

        assert_eq!(store.get("k").unwrap().stored_at, entry.stored_at);
    }

    #[test]
    fn test_entries_lists_every_key() {
        let store = MemoryStore::new();
        store.put("a", json!(1), Duration::from_secs(60));
        store.put("b", json!(2), Duration::from_secs(60));
        store.put("a", json!(3), Duration::from_secs(60));

        let mut keys: Vec<String> = store.entries().iter().map(|e| e.key.clone()).collect();
        keys.sort();

        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_concurrent_writers_never_tear_entries() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();

        for writer in 0..8u64 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                for i in 0..200u64 {
                    let n = writer * 1_000 + i;
                    store.put("shared", json!({ "n": n, "echo": n }), Duration::from_secs(60));
                    let seen = store.get("shared").unwrap();
                    assert_eq!(seen.value["n"], seen.value["echo"]);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 1);
    }
}
