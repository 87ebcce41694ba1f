//! Background cache refresh
//!
//! While the server runs, popular keys are fetched again on fixed intervals
//! so requests for them rarely wait on an upstream. Each scheduled target gets
//! its own tokio task; the first tick fires immediately and warms the cache.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::api::{CacheTarget, MarketApi, RefreshReport};
use crate::gateway::Source;

/// One target and how often to fetch it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledRefresh {
    pub target: CacheTarget,
    pub every: Duration,
}

/// Configuration for refresh intervals
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub schedule: Vec<ScheduledRefresh>,
    /// Whether auto-refresh is enabled
    pub enabled: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            schedule: vec![
                ScheduledRefresh {
                    target: CacheTarget::TokenBoosts,
                    every: Duration::from_secs(15 * 60),
                },
                ScheduledRefresh {
                    target: CacheTarget::MarketOverview,
                    every: Duration::from_secs(20 * 60),
                },
                ScheduledRefresh {
                    target: CacheTarget::Ranks { topic: "hot".into() },
                    every: Duration::from_secs(30 * 60),
                },
            ],
            enabled: true,
        }
    }
}

impl RefreshConfig {
    /// Default schedule, switched on or off
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled,
            ..Default::default()
        }
    }

    pub fn targets(&self) -> Vec<CacheTarget> {
        self.schedule.iter().map(|s| s.target.clone()).collect()
    }
}

/// A target that produced no data at all
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshFailure {
    pub key: String,
    pub error: String,
}

/// Result of refreshing several targets
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshSummary {
    pub refreshed: Vec<RefreshReport>,
    pub failed: Vec<RefreshFailure>,
}

/// Refreshes `targets` one after another
///
/// A target whose upstream is down still counts as refreshed when stale or
/// placeholder data was served; only a hard failure lands in `failed`.
pub async fn refresh_all(api: &MarketApi, targets: &[CacheTarget]) -> RefreshSummary {
    let mut summary = RefreshSummary::default();
    for target in targets {
        match api.refresh(target).await {
            Ok(report) => summary.refreshed.push(report),
            Err(e) => summary.failed.push(RefreshFailure {
                key: target.key(),
                error: e.to_string(),
            }),
        }
    }
    summary
}

async fn run_once(api: &MarketApi, target: &CacheTarget) {
    match api.refresh(target).await {
        Ok(report) if report.source == Source::Upstream => {
            debug!(key = %report.key, "background refresh stored fresh data");
        }
        Ok(report) => {
            warn!(key = %report.key, source = ?report.source, "background refresh fell back");
        }
        Err(e) => warn!(key = %target.key(), "background refresh failed: {}", e),
    }
}

/// Handle for controlling the background refresh tasks
///
/// Dropping the handle stops the tasks at their next wake-up.
pub struct RefreshHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RefreshHandle {
    /// Spawns one task per scheduled target; none when disabled
    pub fn spawn(api: Arc<MarketApi>, config: RefreshConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        if config.enabled {
            for ScheduledRefresh { target, every } in config.schedule {
                let api = api.clone();
                let mut shutdown_rx = shutdown_rx.clone();
                info!(key = %target.key(), every_secs = every.as_secs(), "scheduling background refresh");

                tasks.push(tokio::spawn(async move {
                    let mut interval = tokio::time::interval(every);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

                    loop {
                        tokio::select! {
                            _ = interval.tick() => run_once(&api, &target).await,
                            _ = shutdown_rx.changed() => break,
                        }
                    }
                }));
            }
        }

        Self { shutdown_tx, tasks }
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stops every task and waits for it to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}
