use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How often one token has been looked up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRecord {
    pub chain: String,
    pub address: String,
    pub count: u64,
    pub last_searched: DateTime<Utc>,
}

/// In-memory search hit counter keyed by `chain:address`
#[derive(Debug, Default)]
pub struct SearchLog {
    records: Mutex<HashMap<String, SearchRecord>>,
}

fn record_key(chain: &str, address: &str) -> String {
    format!("{}:{}", chain, address)
}

impl SearchLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one lookup and returns the updated record
    pub fn record(&self, chain: &str, address: &str) -> SearchRecord {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        let record = records
            .entry(record_key(chain, address))
            .and_modify(|r| {
                r.count += 1;
                r.last_searched = now;
            })
            .or_insert_with(|| SearchRecord {
                chain: chain.to_string(),
                address: address.to_string(),
                count: 1,
                last_searched: now,
            });
        record.clone()
    }

    pub fn count(&self, chain: &str, address: &str) -> u64 {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.get(&record_key(chain, address)).map_or(0, |r| r.count)
    }

    /// All records, most searched first
    pub fn all(&self) -> Vec<SearchRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<SearchRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| b.last_searched.cmp(&a.last_searched)));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_increments_count() {
        let log = SearchLog::new();
        log.record("bsc", "0xabc");
        let record = log.record("bsc", "0xabc");

        assert_eq!(record.count, 2);
        assert_eq!(log.count("bsc", "0xabc"), 2);
        assert_eq!(log.count("eth", "0xabc"), 0);
    }

    #[test]
    fn test_all_sorts_by_count_descending() {
        let log = SearchLog::new();
        log.record("eth", "0x1");
        for _ in 0..3 {
            log.record("bsc", "0x2");
        }
        log.record("eth", "0x3");
        log.record("eth", "0x3");

        let counts: Vec<_> = log.all().iter().map(|r| (r.address.clone(), r.count)).collect();
        assert_eq!(
            counts,
            vec![("0x2".to_string(), 3), ("0x3".to_string(), 2), ("0x1".to_string(), 1)]
        );
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let log = SearchLog::new();
        let json = serde_json::to_value(log.record("bsc", "0x1")).unwrap();
        assert!(json.get("lastSearched").is_some());
    }
}
