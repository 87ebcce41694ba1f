//! tickergate - cached crypto market data
//!
//! One-shot commands print the resolved value as JSON on stdout; `serve`
//! exposes the same call sites over HTTP and keeps popular keys warm.

use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use anyhow::bail;
use tickergate::api::{CacheTarget, MarketApi};
use tickergate::cli::{CacheCommand, Cli, Command};
use tickergate::config::Config;
use tickergate::gateway::{GatewayError, Resolved, Source};
use tickergate::refresh::{refresh_all, RefreshConfig};
use tickergate::server;

/// Exit status when no data could be served at all
const EXIT_UNAVAILABLE: u8 = 2;

fn init_tracing(command: &Command) {
    let default = if command.is_server() { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_resolved<T: Serialize>(resolved: Resolved<T>) -> anyhow::Result<()> {
    match resolved.source {
        Source::StaleCache => eprintln!("note: upstream unavailable, showing cached data"),
        Source::StaticFallback => eprintln!("note: upstream unavailable, showing placeholder data"),
        _ => {}
    }
    print_json(&resolved.value)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_cache(api: &MarketApi, action: CacheCommand) -> anyhow::Result<()> {
    match action {
        CacheCommand::Status => print_json(&api.gateway().status()),
        CacheCommand::Refresh { key: Some(key) } if key != "all" => {
            let Some(target) = CacheTarget::parse(&key) else {
                bail!("unknown cache key '{}'", key);
            };
            print_json(&api.refresh(&target).await?)
        }
        CacheCommand::Refresh { .. } => {
            let summary = refresh_all(api, &RefreshConfig::default().targets()).await;
            print_json(&summary)?;
            if !summary.failed.is_empty() {
                bail!("{} key(s) could not be refreshed", summary.failed.len());
            }
            Ok(())
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.apply(Config::from_env()?);
    tracing::debug!(?config, "configuration loaded");
    let api = MarketApi::from_config(&config);

    match cli.command {
        Command::Topics => print_resolved(api.topics().await?),
        Command::Ranks { topic } => print_resolved(api.ranks(&topic).await?),
        Command::Search { keyword, chain } => print_resolved(api.search(&keyword, chain.as_deref()).await?),
        Command::Token { address, chain } => print_resolved(api.token_details(&address, &chain).await?),
        Command::Kline {
            address,
            chain,
            interval,
            limit,
        } => print_resolved(api.klines(&address, &chain, &interval, limit).await?),
        Command::Crypto => print_resolved(api.market_overview().await?),
        Command::Boosts => print_resolved(api.token_boosts().await?),
        Command::Cache { action } => run_cache(&api, action).await,
        Command::Serve { .. } => {
            let refresh = RefreshConfig::enabled(config.background_refresh);
            server::serve(api, config.addr, refresh).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.command);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(GatewayError::Unavailable { .. }) = e.downcast_ref::<GatewayError>() {
                eprintln!("data unavailable, retry");
                return ExitCode::from(EXIT_UNAVAILABLE);
            }
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
