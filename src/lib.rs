//! tickergate library
//!
//! A two-tier fetch-cache-fallback gateway in front of the Ave.ai and
//! CoinGecko market APIs. The binary and the integration tests both build on
//! these modules.

pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod gateway;
pub mod refresh;
pub mod server;
pub mod upstream;
