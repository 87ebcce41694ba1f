//! Command-line interface parsing for tickergate
//!
//! One subcommand per market call site, `cache` for inspecting and
//! refreshing entries, and `serve`. Global flags override the environment
//! configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::config::Config;

/// Largest K-line page accepted from the command line
pub const MAX_LIMIT: u32 = 1000;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// `--limit` is not a number in 1..=1000
    #[error("Invalid limit: '{0}'. Expected a number between 1 and 1000")]
    InvalidLimit(String),
}

/// tickergate - cached crypto market data from Ave.ai and CoinGecko
#[derive(Parser, Debug)]
#[command(name = "tickergate")]
#[command(about = "Cached crypto market data with stale and placeholder fallback")]
#[command(version)]
pub struct Cli {
    /// Directory for the disk cache (default: platform cache dir)
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Keep the cache in memory only
    #[arg(long, global = true)]
    pub no_disk_cache: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List ranking topics
    Topics,

    /// Ranked tokens for a topic
    Ranks {
        #[arg(long, default_value = "hot")]
        topic: String,
    },

    /// Search tokens by keyword
    Search {
        keyword: String,
        /// Restrict to one chain (e.g. bsc, eth)
        #[arg(long)]
        chain: Option<String>,
    },

    /// Details of one token
    Token {
        address: String,
        #[arg(long)]
        chain: String,
    },

    /// K-line candles for a token
    Kline {
        address: String,
        #[arg(long)]
        chain: String,
        /// Interval label: 1m, 5m, 15m, 30m, 1h, 2h, 4h, 1d, 3d, 1w, 1M, 1y
        #[arg(long, default_value = "1d")]
        interval: String,
        /// Number of candles (1-1000)
        #[arg(long, default_value = "100", value_parser = parse_limit_arg)]
        limit: u32,
    },

    /// CoinGecko market overview
    Crypto,

    /// Most boosted tokens on DexScreener
    Boosts,

    /// Inspect or refresh cache entries
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },

    /// Run the JSON API server
    Serve {
        /// Listen address (default: TICKERGATE_ADDR or 127.0.0.1:3001)
        #[arg(long, value_name = "HOST:PORT")]
        addr: Option<SocketAddr>,
        /// Do not refresh popular keys in the background
        #[arg(long)]
        no_refresh: bool,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CacheCommand {
    /// Freshness of every cached key
    Status,

    /// Fetch a key again even if it is fresh
    Refresh {
        /// Cache key as shown by `cache status` (default: the scheduled keys)
        key: Option<String>,
    },
}

/// Parses a `--limit` value.
///
/// # Returns
/// * `Ok(n)` for 1 <= n <= 1000
/// * `Err(CliError::InvalidLimit)` otherwise
pub fn parse_limit_arg(s: &str) -> Result<u32, CliError> {
    s.trim()
        .parse::<u32>()
        .ok()
        .filter(|n| (1..=MAX_LIMIT).contains(n))
        .ok_or_else(|| CliError::InvalidLimit(s.to_string()))
}

impl Cli {
    /// Applies command-line overrides on top of `config`
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(dir) = &self.cache_dir {
            config.cache_dir = Some(dir.clone());
        }
        if self.no_disk_cache {
            config.disk_cache = false;
        }
        if let Command::Serve { addr, no_refresh } = &self.command {
            if let Some(addr) = addr {
                config.addr = *addr;
            }
            if *no_refresh {
                config.background_refresh = false;
            }
        }
        config
    }
}

impl Command {
    /// Long-running commands log at `info` by default
    pub fn is_server(&self) -> bool {
        matches!(self, Command::Serve { .. })
    }
}
