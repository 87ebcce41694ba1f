//! JSON API server
//!
//! Serves the market call sites under `/api`. Every handler goes through
//! [`MarketApi`], so responses are cached and degrade to stale or placeholder
//! data exactly like the CLI.

mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api::{CacheTarget, MarketApi};
use crate::refresh::{RefreshConfig, RefreshHandle};

/// Shared state for all request handlers
pub struct AppState {
    pub api: Arc<MarketApi>,
    /// Targets refreshed by `POST /api/cache/refresh` without a key
    pub refresh_targets: Vec<CacheTarget>,
}

impl AppState {
    pub fn new(api: MarketApi) -> Self {
        Self::shared(Arc::new(api))
    }

    pub fn shared(api: Arc<MarketApi>) -> Self {
        Self {
            api,
            refresh_targets: RefreshConfig::default().targets(),
        }
    }
}

/// Builds the full application router with open CORS
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", routes::api_router())
        .layer(cors)
        .with_state(state)
}

/// Binds `addr` and serves until the process is stopped
///
/// Background refresh runs for as long as the server does.
pub async fn serve(api: MarketApi, addr: SocketAddr, refresh: RefreshConfig) -> anyhow::Result<()> {
    let api = Arc::new(api);
    let state = Arc::new(AppState {
        api: api.clone(),
        refresh_targets: refresh.targets(),
    });
    let refresher = RefreshHandle::spawn(api, refresh);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    let served = axum::serve(listener, router(state)).await;

    refresher.shutdown().await;
    served?;
    Ok(())
}
