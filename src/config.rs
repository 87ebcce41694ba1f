//! Runtime configuration
//!
//! Loaded from environment variables, after an optional `.env` file in the
//! working directory. CLI flags override the result in `main`.
//!
//! Environment variables:
//! - `AVE_API_KEY`: Ave.ai API key (default: empty, requests are rejected upstream)
//! - `AVE_BASE_URL`: Ave.ai base URL (default: `https://prod.ave-api.com`)
//! - `COINGECKO_BASE_URL`: CoinGecko primary base URL
//! - `COINGECKO_BACKUP_URL`: CoinGecko backup base URL
//! - `COINGECKO_PRO_API_KEY`: key sent to the backup host
//! - `DEXSCREENER_BASE_URL`: DexScreener base URL
//! - `TICKERGATE_BACKGROUND_REFRESH`: `false`/`0`/`off` stops `serve` from
//!   refreshing popular keys on a timer (default: on)
//! - `TICKERGATE_CACHE_DIR`: disk cache directory (default: XDG cache dir)
//! - `TICKERGATE_ADDR`: listen address for `serve` (default: `127.0.0.1:3001`)

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::data::ave::AVE_BASE_URL;
use crate::data::coingecko::{COINGECKO_BACKUP_URL, COINGECKO_BASE_URL};
use crate::data::dexscreener::DEXSCREENER_BASE_URL;

pub const DEFAULT_ADDR: &str = "127.0.0.1:3001";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {var} '{value}': {source}")]
    InvalidAddr {
        var: &'static str,
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("invalid {var} '{value}': expected true/false")]
    InvalidBool { var: &'static str, value: String },
}

#[derive(Clone)]
pub struct Config {
    pub ave_api_key: String,
    pub ave_base_url: String,
    pub coingecko_base_url: String,
    pub coingecko_backup_url: String,
    pub coingecko_pro_api_key: Option<String>,
    pub dexscreener_base_url: String,
    /// `None` means the platform cache directory
    pub cache_dir: Option<PathBuf>,
    /// Disable the disk tier entirely
    pub disk_cache: bool,
    pub addr: SocketAddr,
    /// Periodic refresh of popular keys while serving
    pub background_refresh: bool,
}

// Keys stay out of Debug output.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("ave_base_url", &self.ave_base_url)
            .field("coingecko_base_url", &self.coingecko_base_url)
            .field("coingecko_backup_url", &self.coingecko_backup_url)
            .field("dexscreener_base_url", &self.dexscreener_base_url)
            .field("cache_dir", &self.cache_dir)
            .field("disk_cache", &self.disk_cache)
            .field("addr", &self.addr)
            .field("background_refresh", &self.background_refresh)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ave_api_key: String::new(),
            ave_base_url: AVE_BASE_URL.to_string(),
            coingecko_base_url: COINGECKO_BASE_URL.to_string(),
            coingecko_backup_url: COINGECKO_BACKUP_URL.to_string(),
            coingecko_pro_api_key: None,
            dexscreener_base_url: DEXSCREENER_BASE_URL.to_string(),
            cache_dir: None,
            disk_cache: true,
            addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            background_refresh: true,
        }
    }
}

impl Config {
    /// Reads `.env` (if present) and then the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is the normal case.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let addr = match get("TICKERGATE_ADDR") {
            Some(value) => value.parse().map_err(|source| ConfigError::InvalidAddr {
                var: "TICKERGATE_ADDR",
                value,
                source,
            })?,
            None => defaults.addr,
        };

        let background_refresh = match get("TICKERGATE_BACKGROUND_REFRESH") {
            Some(value) => parse_bool(&value).ok_or(ConfigError::InvalidBool {
                var: "TICKERGATE_BACKGROUND_REFRESH",
                value,
            })?,
            None => defaults.background_refresh,
        };

        Ok(Self {
            ave_api_key: get("AVE_API_KEY").unwrap_or(defaults.ave_api_key),
            ave_base_url: get("AVE_BASE_URL").unwrap_or(defaults.ave_base_url),
            coingecko_base_url: get("COINGECKO_BASE_URL").unwrap_or(defaults.coingecko_base_url),
            coingecko_backup_url: get("COINGECKO_BACKUP_URL").unwrap_or(defaults.coingecko_backup_url),
            coingecko_pro_api_key: get("COINGECKO_PRO_API_KEY"),
            dexscreener_base_url: get("DEXSCREENER_BASE_URL").unwrap_or(defaults.dexscreener_base_url),
            cache_dir: get("TICKERGATE_CACHE_DIR").map(PathBuf::from),
            disk_cache: defaults.disk_cache,
            addr,
            background_refresh,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_set() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.ave_base_url, "https://prod.ave-api.com");
        assert_eq!(config.coingecko_base_url, "https://api.coingecko.com/api/v3");
        assert_eq!(config.addr.to_string(), DEFAULT_ADDR);
        assert!(config.cache_dir.is_none());
        assert!(config.coingecko_pro_api_key.is_none());
        assert!(config.disk_cache);
    }

    #[test]
    fn test_values_override_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("AVE_API_KEY", "ave-key"),
            ("AVE_BASE_URL", "http://localhost:9000"),
            ("COINGECKO_PRO_API_KEY", "cg-key"),
            ("TICKERGATE_CACHE_DIR", "/tmp/tg"),
            ("TICKERGATE_ADDR", "0.0.0.0:8080"),
        ]))
        .unwrap();

        assert_eq!(config.ave_api_key, "ave-key");
        assert_eq!(config.ave_base_url, "http://localhost:9000");
        assert_eq!(config.coingecko_pro_api_key.as_deref(), Some("cg-key"));
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/tg")));
        assert_eq!(config.addr.port(), 8080);
    }

    #[test]
    fn test_blank_values_count_as_unset() {
        let config = Config::from_lookup(lookup(&[("AVE_BASE_URL", "  "), ("COINGECKO_PRO_API_KEY", "")])).unwrap();

        assert_eq!(config.ave_base_url, AVE_BASE_URL);
        assert!(config.coingecko_pro_api_key.is_none());
    }

    #[test]
    fn test_invalid_addr_is_rejected() {
        let result = Config::from_lookup(lookup(&[("TICKERGATE_ADDR", "not-an-addr")]));
        assert!(matches!(result, Err(ConfigError::InvalidAddr { .. })));
    }

    #[test]
    fn test_background_refresh_switch() {
        assert!(Config::from_lookup(lookup(&[])).unwrap().background_refresh);

        let off = Config::from_lookup(lookup(&[("TICKERGATE_BACKGROUND_REFRESH", "Off")])).unwrap();
        assert!(!off.background_refresh);

        let bad = Config::from_lookup(lookup(&[("TICKERGATE_BACKGROUND_REFRESH", "sometimes")]));
        assert!(matches!(bad, Err(ConfigError::InvalidBool { .. })));
    }

    #[test]
    fn test_dexscreener_url_override() {
        let config = Config::from_lookup(lookup(&[("DEXSCREENER_BASE_URL", "http://localhost:7000")])).unwrap();
        assert_eq!(config.dexscreener_base_url, "http://localhost:7000");
    }

    #[test]
    fn test_debug_hides_keys() {
        let config = Config::from_lookup(lookup(&[("AVE_API_KEY", "super-secret")])).unwrap();
        assert!(!format!("{:?}", config).contains("super-secret"));
    }
}
