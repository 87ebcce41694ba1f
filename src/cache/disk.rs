//! Disk-backed cache tier
//!
//! Stores each entry as a JSON file in an XDG-compliant cache directory
//! (`~/.cache/tickergate/` on Linux). File names are derived from the cache
//! key with [`sanitize_key`]. I/O failures degrade to a miss so that a broken
//! cache directory never takes the gateway down with it.

use directories::ProjectDirs;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use super::{CacheEntry, CacheStore};

/// Errors raised by the disk tier
///
/// These never leave the cache layer through [`CacheStore`]; they are logged
/// and the operation is treated as a miss or a dropped write.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing the cache file failed
    #[error("cache I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The cache file exists but is not a valid entry
    #[error("corrupt cache file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The entry could not be encoded
    #[error("failed to encode cache entry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Maps an arbitrary cache key to a file-name-safe string
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte becomes
/// `~XX` (uppercase hex), so two distinct keys never share a file.
pub fn sanitize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("~{:02X}", byte));
        }
    }
    if out.is_empty() {
        out.push('~');
    }
    out
}

/// Distinguishes temporary files of concurrent writers in one process
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Persists cache entries as JSON files
#[derive(Debug, Clone)]
pub struct DiskStore {
    /// Directory where cache files are stored
    cache_dir: PathBuf,
}

impl DiskStore {
    /// Creates a DiskStore in the XDG cache directory
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "tickergate")?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a DiskStore rooted at a custom directory
    pub fn with_dir(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the path of the cache file for `key`
    pub fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", sanitize_key(key)))
    }

    /// Reads the entry for `key`
    ///
    /// A missing file is `Ok(None)`; unreadable or unparsable files are errors.
    pub fn try_get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        read_entry(self.cache_path(key))
    }

    /// Reads every entry file in the cache directory
    ///
    /// Temporary files are skipped. A missing directory holds no entries.
    pub fn try_entries(&self) -> Result<Vec<Result<CacheEntry, CacheError>>, CacheError> {
        let dir = match fs::read_dir(&self.cache_dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.cache_dir.clone(),
                    source,
                })
            }
        };

        let mut entries = Vec::new();
        for item in dir {
            let path = match item {
                Ok(item) => item.path(),
                Err(source) => {
                    entries.push(Err(CacheError::Io {
                        path: self.cache_dir.clone(),
                        source,
                    }));
                    continue;
                }
            };
            let is_entry_file = path.extension().is_some_and(|ext| ext == "json")
                && !path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with('.'));
            if !is_entry_file {
                continue;
            }
            match read_entry(path) {
                Ok(Some(entry)) => entries.push(Ok(entry)),
                // Removed between listing and reading.
                Ok(None) => {}
                Err(e) => entries.push(Err(e)),
            }
        }
        Ok(entries)
    }

    /// Writes `entry` to disk
    ///
    /// The JSON is written to a temporary sibling and renamed into place, so a
    /// concurrent reader sees either the old file or the new one.
    pub fn try_put(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        fs::create_dir_all(&self.cache_dir).map_err(|source| CacheError::Io {
            path: self.cache_dir.clone(),
            source,
        })?;

        let json = serde_json::to_string_pretty(entry)?;
        let path = self.cache_path(&entry.key);
        let tmp = self.cache_dir.join(format!(
            ".{}.{}.{}.tmp",
            sanitize_key(&entry.key),
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));

        fs::write(&tmp, json).map_err(|source| CacheError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| {
            let _ = fs::remove_file(&tmp);
            CacheError::Io { path, source }
        })
    }
}

fn read_entry(path: PathBuf) -> Result<Option<CacheEntry>, CacheError> {
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(CacheError::Io { path, source }),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| CacheError::Corrupt { path, source })
}

impl CacheStore for DiskStore {
    fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        match self.try_get(key) {
            Ok(entry) => entry.map(Arc::new),
            Err(e) => {
                warn!(key, error = %e, "disk cache read failed, treating as miss");
                None
            }
        }
    }

    fn insert(&self, entry: Arc<CacheEntry>) {
        if let Err(e) = self.try_put(&entry) {
            warn!(key = %entry.key, error = %e, "disk cache write failed");
        }
    }

    fn entries(&self) -> Vec<Arc<CacheEntry>> {
        let listed = match self.try_entries() {
            Ok(listed) => listed,
            Err(e) => {
                warn!(error = %e, "disk cache listing failed");
                return Vec::new();
            }
        };
        listed
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(Arc::new(entry)),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable cache file");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_test_cache() -> (DiskStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let cache = DiskStore::with_dir(temp_dir.path().to_path_buf());
        (cache, temp_dir)
    }

    #[test]
    fn test_put_creates_file_in_cache_directory() {
        let (cache, temp_dir) = create_test_cache();

        cache.put("tokens_hot", json!([{"symbol": "BTC", "price": 65000}]), Duration::from_secs(3600));

        let expected_path = temp_dir.path().join("tokens_hot.json");
        assert!(expected_path.exists(), "Cache file should exist");

        let content = fs::read_to_string(&expected_path).expect("Should read file");
        assert!(content.contains("\"storedAt\""));
        assert!(content.contains("\"BTC\""));
        assert!(content.contains("65000"));
    }

    #[test]
    fn test_get_returns_none_for_missing_key() {
        let (cache, _temp_dir) = create_test_cache();
        assert!(cache.get("nonexistent_key").is_none());
        assert!(matches!(cache.try_get("nonexistent_key"), Ok(None)));
    }

    #[test]
    fn test_entry_survives_new_store_instance() {
        let (cache, temp_dir) = create_test_cache();
        let written = cache.put("topics", json!(["hot", "new"]), Duration::from_secs(60));

        let reopened = DiskStore::with_dir(temp_dir.path().to_path_buf());
        let read = reopened.get("topics").expect("Should read persisted entry");

        assert_eq!(read.value, json!(["hot", "new"]));
        assert_eq!(read.stored_at, written.stored_at);
        assert_eq!(read.ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_insert_keeps_original_timestamp() {
        let (cache, _temp_dir) = create_test_cache();
        let stored_at = Utc::now() - chrono::Duration::hours(3);
        let entry = CacheEntry::with_stored_at("old", json!(1), Duration::from_secs(60), stored_at);

        cache.insert(Arc::new(entry));

        let read = cache.get("old").unwrap();
        assert_eq!(read.stored_at, stored_at);
        assert!(!read.is_fresh());
    }

    #[test]
    fn test_corrupt_file_is_treated_as_miss() {
        let (cache, temp_dir) = create_test_cache();
        fs::write(temp_dir.path().join("broken.json"), "{not json").unwrap();

        assert!(matches!(cache.try_get("broken"), Err(CacheError::Corrupt { .. })));
        assert!(cache.get("broken").is_none());
    }

    #[test]
    fn test_unwritable_directory_drops_write_silently() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        // A regular file where the directory should be makes every write fail.
        let cache = DiskStore::with_dir(blocker.join("nested"));

        cache.put("k", json!(1), Duration::from_secs(60));

        assert!(cache.get("k").is_none());
        assert!(cache.try_put(&CacheEntry::new("k", json!(1), Duration::ZERO)).is_err());
    }

    #[test]
    fn test_put_creates_directory_if_missing() {
        let temp_dir = TempDir::new().unwrap();
        let nested_path = temp_dir.path().join("nested").join("cache").join("dir");
        let cache = DiskStore::with_dir(nested_path.clone());

        cache.put("nested_key", json!({"a": 1}), Duration::from_secs(60));

        assert!(nested_path.join("nested_key.json").exists());
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let (cache, temp_dir) = create_test_cache();
        cache.put("k", json!("first"), Duration::from_secs(60));
        cache.put("k", json!("second"), Duration::from_secs(60));

        assert_eq!(cache.get("k").unwrap().value, json!("second"));
        let names: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["k.json".to_string()]);
    }

    #[test]
    fn test_entries_reads_keys_back_from_files() {
        let (cache, temp_dir) = create_test_cache();
        cache.put("tokens:hot", json!([1]), Duration::from_secs(60));
        cache.put("topics", json!([2]), Duration::from_secs(60));
        fs::write(temp_dir.path().join("broken.json"), "{not json").unwrap();
        fs::write(temp_dir.path().join(".topics.1.0.tmp"), "{}").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "x").unwrap();

        let mut keys: Vec<String> = cache.entries().iter().map(|e| e.key.clone()).collect();
        keys.sort();

        assert_eq!(keys, vec!["tokens:hot", "topics"]);
        assert_eq!(cache.try_entries().unwrap().len(), 3);
    }

    #[test]
    fn test_entries_of_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskStore::with_dir(temp_dir.path().join("never-created"));
        assert!(cache.entries().is_empty());
    }

    #[test]
    fn test_sanitize_key_keeps_safe_characters() {
        assert_eq!(sanitize_key("search_tokens_pepe_all"), "search_tokens_pepe_all");
        assert_eq!(sanitize_key("kline-eth"), "kline-eth");
    }

    #[test]
    fn test_sanitize_key_escapes_path_characters() {
        assert_eq!(sanitize_key("../etc/passwd"), "~2E~2E~2Fetc~2Fpasswd");
        assert_eq!(sanitize_key("a b"), "a~20b");
        assert_eq!(sanitize_key(""), "~");
    }

    #[test]
    fn test_sanitize_key_distinguishes_similar_keys() {
        assert_ne!(sanitize_key("a:b"), sanitize_key("a_b"));
        assert_ne!(sanitize_key("a~3Ab"), sanitize_key("a:b"));
    }

    #[test]
    fn test_new_creates_xdg_compliant_path() {
        if let Some(cache) = DiskStore::new() {
            let path_str = cache.dir().to_string_lossy();
            assert!(path_str.contains("tickergate"), "Cache path should contain project name");
        }
        // Test passes if new() returns None (e.g., no home directory in CI)
    }
}
