//! HTTP JSON API adapter.
//!
//! Axum router over a shared [`PortfolioStore`]. Store calls are synchronous,
//! so handlers run them on tokio's blocking pool.

mod error;
mod handlers;
mod identity;

pub use error::{WebError, status_from_error};
pub use identity::Caller;

use axum::{
    Router,
    http::HeaderName,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::domain::analytics::DEFAULT_BENCHMARK;
use crate::domain::error::PortfolioError;
use crate::ports::PortfolioStore;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_IDENTITY_HEADER: &str = "x-user-email";
pub const DEFAULT_LISTEN: &str = "127.0.0.1:3000";

#[derive(Debug, Clone)]
pub struct WebSettings {
    pub benchmark: String,
    pub identity_header: HeaderName,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            benchmark: DEFAULT_BENCHMARK.to_string(),
            identity_header: HeaderName::from_static(DEFAULT_IDENTITY_HEADER),
        }
    }
}

impl WebSettings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PortfolioError> {
        let benchmark = config
            .get_string("analytics", "benchmark")
            .map(|s| s.trim().to_uppercase())
            .unwrap_or_else(|| DEFAULT_BENCHMARK.to_string());

        let header = config
            .get_string("web", "identity_header")
            .unwrap_or_else(|| DEFAULT_IDENTITY_HEADER.to_string());
        let identity_header = HeaderName::try_from(header.trim().to_lowercase()).map_err(|e| {
            PortfolioError::ConfigInvalid {
                section: "web".into(),
                key: "identity_header".into(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            benchmark,
            identity_header,
        })
    }
}

pub struct AppState {
    pub store: Arc<dyn PortfolioStore + Send + Sync>,
    pub settings: WebSettings,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/portfolios",
            get(handlers::list_portfolios).post(handlers::create_portfolio),
        )
        .route("/api/portfolios/transfer", post(handlers::transfer))
        .route(
            "/api/portfolios/{pid}",
            get(handlers::portfolio_view).delete(handlers::delete_portfolio),
        )
        .route("/api/portfolios/{pid}/deposit", post(handlers::deposit))
        .route("/api/portfolios/{pid}/withdraw", post(handlers::withdraw))
        .route("/api/portfolios/{pid}/buy", post(handlers::buy))
        .route("/api/portfolios/{pid}/sell", post(handlers::sell))
        .route(
            "/api/portfolios/{pid}/transactions",
            get(handlers::transactions),
        )
        .route(
            "/api/stocklists",
            get(handlers::lists_overview).post(handlers::create_list),
        )
        .route(
            "/api/stocklists/{lid}",
            get(handlers::stock_list_view).delete(handlers::delete_list),
        )
        .route("/api/stocklists/{lid}/items", post(handlers::add_list_item))
        .route("/api/stocklists/{lid}/share", post(handlers::share_list))
        .route(
            "/api/stocklists/{lid}/visibility",
            put(handlers::set_visibility),
        )
        .route("/api/stocks/{symbol}/history", get(handlers::stock_history))
        .route("/api/stocks/predict", post(handlers::predict))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Binds `listen` and serves until Ctrl-C.
pub async fn serve(state: AppState, listen: &str) -> Result<(), PortfolioError> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
