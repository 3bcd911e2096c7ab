//! HTTP server implementation using Axum.

use crate::handler::{handle_health, handle_message, handle_proxy, handle_status};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use screener_cache_core::{ProxyConfig, Registration};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use url::Url;

/// Application state shared across handlers.
pub struct AppState {
    /// Controller versions and the clients they control
    pub registration: Arc<Registration>,
    /// Origin every proxied request is re-targeted at
    pub upstream: Url,
}

/// Build the router: health, control endpoints, and the proxy for the rest.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Dashboard pages on other ports post control messages here.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route(
            &format!("{}/message", ProxyConfig::CONTROL_PREFIX),
            post(handle_message),
        )
        .route(
            &format!("{}/status", ProxyConfig::CONTROL_PREFIX),
            get(handle_status),
        )
        .fallback(handle_proxy)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(ProxyConfig::MAX_REQUEST_BODY_BYTES)),
        )
        .with_state(state)
}

/// Start the proxy.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(
    registration: Arc<Registration>,
    upstream: Url,
    host: &str,
    port: u16,
) -> anyhow::Result<SocketAddr> {
    let state = Arc::new(AppState {
        registration,
        upstream,
    });
    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}
