//! Integration tests for CLI argument handling
//!
//! Runs the binary against an upstream that refuses connections, so every
//! command exercises its fallback path.

use std::path::Path;
use std::process::Command;

use std::time::Duration;

use chrono::{DateTime, Utc};
use tempfile::TempDir;
use tickergate::api::search_key;
use tickergate::cache::{CacheEntry, DiskStore};

/// Nothing listens on port 1 in the test environment
const DEAD_UPSTREAM: &str = "http://127.0.0.1:1";

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str], cache_dir: &Path) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_tickergate"))
        .args(args)
        .arg("--cache-dir")
        .arg(cache_dir)
        .env("AVE_BASE_URL", DEAD_UPSTREAM)
        .env("COINGECKO_BASE_URL", DEAD_UPSTREAM)
        .env("COINGECKO_BACKUP_URL", DEAD_UPSTREAM)
        .env("DEXSCREENER_BASE_URL", DEAD_UPSTREAM)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute tickergate")
}

#[test]
fn test_help_flag_exits_successfully() {
    let temp_dir = TempDir::new().unwrap();
    let output = run_cli(&["--help"], temp_dir.path());
    assert!(output.status.success(), "Expected --help to exit successfully");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("tickergate"), "Help should mention tickergate");
    assert!(stdout.contains("kline"), "Help should list the kline command");
    assert!(stdout.contains("serve"), "Help should list the serve command");
}

#[test]
fn test_invalid_limit_prints_error_and_exits() {
    let temp_dir = TempDir::new().unwrap();
    let output = run_cli(&["kline", "0xabc", "--chain", "bsc", "--limit", "0"], temp_dir.path());
    assert!(!output.status.success(), "Expected invalid limit to fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Invalid limit"),
        "Should print error message about invalid limit: {}",
        stderr
    );
}

#[test]
fn test_topics_falls_back_when_upstream_is_down() {
    let temp_dir = TempDir::new().unwrap();
    let output = run_cli(&["topics"], temp_dir.path());

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let topics: serde_json::Value = serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(topics[0]["id"], "hot");
    assert!(String::from_utf8_lossy(&output.stderr).contains("placeholder"));
    // Placeholders are never written to the cache.
    assert!(!temp_dir.path().join("topics.json").exists());
}

#[test]
fn test_search_without_data_reports_unavailable() {
    let temp_dir = TempDir::new().unwrap();
    let output = run_cli(&["search", "pepe"], temp_dir.path());

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("data unavailable, retry"), "stderr: {}", stderr);
    assert!(output.stdout.is_empty());
}

#[test]
fn test_stale_disk_entry_is_served_when_upstream_is_down() {
    let temp_dir = TempDir::new().unwrap();
    let stored_at: DateTime<Utc> = "2020-01-01T00:00:00Z".parse().unwrap();
    let stale = CacheEntry::with_stored_at(
        search_key("pepe", None),
        serde_json::json!({"tokens": [], "count": 0, "keyword": "pepe", "chain": "all"}),
        Duration::from_secs(300),
        stored_at,
    );
    DiskStore::with_dir(temp_dir.path().to_path_buf()).try_put(&stale).unwrap();

    let output = run_cli(&["search", "PEPE"], temp_dir.path());

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let results: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(results["keyword"], "pepe");
    assert!(String::from_utf8_lossy(&output.stderr).contains("cached data"));
}

#[test]
fn test_boosts_falls_back_when_upstream_is_down() {
    let temp_dir = TempDir::new().unwrap();
    let output = run_cli(&["boosts"], temp_dir.path());

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let boosts: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(boosts["count"], 5);
    assert_eq!(boosts["tokens"][0]["symbol"], "BTC");
}

#[test]
fn test_cache_status_reads_disk_entries() {
    let temp_dir = TempDir::new().unwrap();
    let entry = CacheEntry::new("tokens:hot", serde_json::json!([{"token": "0x1"}]), Duration::from_secs(3600));
    DiskStore::with_dir(temp_dir.path().to_path_buf()).try_put(&entry).unwrap();

    let output = run_cli(&["cache", "status"], temp_dir.path());

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status[0]["key"], "tokens:hot");
    assert_eq!(status[0]["fresh"], true);
    assert_eq!(status[0]["onDisk"], true);
    assert_eq!(status[0]["itemCount"], 1);
}

#[test]
fn test_cache_refresh_rejects_unknown_key() {
    let temp_dir = TempDir::new().unwrap();
    let output = run_cli(&["cache", "refresh", "nonsense"], temp_dir.path());

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown cache key"));
}

#[cfg(test)]
mod unit_tests {
    //! Unit tests for CLI parsing that don't require running the binary

    use clap::Parser;
    use tickergate::cli::{parse_limit_arg, Cli, Command};

    #[test]
    fn test_cli_search_with_chain() {
        let cli = Cli::parse_from(["tickergate", "search", "pepe", "--chain", "bsc"]);
        assert_eq!(
            cli.command,
            Command::Search {
                keyword: "pepe".into(),
                chain: Some("bsc".into())
            }
        );
    }

    #[test]
    fn test_cli_serve_without_addr() {
        let cli = Cli::parse_from(["tickergate", "serve"]);
        assert_eq!(
            cli.command,
            Command::Serve {
                addr: None,
                no_refresh: false,
            }
        );
    }

    #[test]
    fn test_parse_limit_arg_rejects_zero() {
        assert!(parse_limit_arg("0").is_err());
    }
}
