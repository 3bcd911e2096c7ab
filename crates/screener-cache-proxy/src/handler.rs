//! HTTP handlers: health, control endpoints and the intercepting proxy.

use crate::server::AppState;
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, request::Parts, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use screener_cache_core::controller::ControllerStatus;
use screener_cache_core::network::is_hop_by_hop;
use screener_cache_core::{
    CacheError, ControllerMessage, FetchRequest, ProxyConfig, RequestMode, ServedResponse,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, warn};
use url::Url;

/// Body of the status endpoint.
#[derive(Debug, Serialize)]
pub struct ProxyStatus {
    pub upstream: String,
    pub active: Option<ControllerStatus>,
    pub waiting: Option<String>,
    pub installing: Option<String>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn cache_error_status(err: &CacheError) -> StatusCode {
    match err {
        CacheError::InvalidState { .. } => StatusCode::SERVICE_UNAVAILABLE,
        CacheError::Network { .. } | CacheError::Timeout(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// `POST /__offline-cache/message`
pub async fn handle_message(
    State(state): State<Arc<AppState>>,
    Json(message): Json<ControllerMessage>,
) -> Response {
    debug!("Received page message {:?}", message);
    match state.registration.post_message(message).await {
        Ok(Some(reply)) => Json(reply).into_response(),
        Ok(None) if !message.expects_reply() => StatusCode::NO_CONTENT.into_response(),
        Ok(None) => {
            error!("No reply to {:?}", message);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("No reply to {:?}", message),
            )
        }
        Err(e) => {
            warn!("Message {:?} failed: {}", message, e);
            error_response(cache_error_status(&e), e.to_string())
        }
    }
}

/// `GET /__offline-cache/status`
pub async fn handle_status(State(state): State<Arc<AppState>>) -> Response {
    let registration = &state.registration;

    let active = match registration.active().await {
        Some(controller) => match controller.status() {
            Ok(status) => Some(status),
            Err(e) => {
                error!("Failed to read cache status: {}", e);
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
        },
        None => None,
    };

    Json(ProxyStatus {
        upstream: state.upstream.to_string(),
        active,
        waiting: registration.waiting().await.map(|c| c.version().to_string()),
        installing: registration.installing().await.map(|c| c.version().to_string()),
    })
    .into_response()
}

/// Every other path: run the request through the cache controller.
pub async fn handle_proxy(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let body = match to_bytes(body, ProxyConfig::MAX_REQUEST_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => return error_response(StatusCode::PAYLOAD_TOO_LARGE, e.to_string()),
    };

    let fetch = upstream_request(&state.upstream, &parts).with_body(body);
    debug!("{} {} ({:?})", fetch.method, fetch.url, fetch.mode);

    match state.registration.fetch(&fetch).await {
        Ok(served) => into_response(served),
        Err(e) => {
            warn!("Failed to serve {}: {}", fetch.url, e);
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

/// Re-target an incoming request at the upstream origin.
pub(crate) fn upstream_request(upstream: &Url, parts: &Parts) -> FetchRequest {
    let mut url = upstream.clone();
    url.set_path(parts.uri.path());
    url.set_query(parts.uri.query());

    let mut request = FetchRequest::new(parts.method.clone(), url).with_mode(request_mode(parts));
    for (name, value) in &parts.headers {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }
    request
}

/// `Sec-Fetch-Mode` when the browser sent it; otherwise an HTML GET counts
/// as a navigation.
fn request_mode(parts: &Parts) -> RequestMode {
    let fetch_mode = parts
        .headers
        .get("sec-fetch-mode")
        .and_then(|v| v.to_str().ok())
        .and_then(RequestMode::from_fetch_mode);
    if let Some(mode) = fetch_mode {
        return mode;
    }

    let wants_html = parts
        .headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"));
    if parts.method == Method::GET && wants_html {
        RequestMode::Navigate
    } else {
        RequestMode::default()
    }
}

fn into_response(served: ServedResponse) -> Response {
    let status = match StatusCode::from_u16(served.response.status) {
        Ok(status) => status,
        Err(_) => {
            return error_response(
                StatusCode::BAD_GATEWAY,
                format!("Upstream returned invalid status {}", served.response.status),
            )
        }
    };

    let mut response = Response::new(Body::from(served.response.body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, value) in &served.response.headers {
        if is_hop_by_hop(name) {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => debug!("Dropping malformed response header {}", name),
        }
    }
    headers.insert(
        HeaderName::from_static(ProxyConfig::SOURCE_HEADER),
        HeaderValue::from_static(served.source.as_str()),
    );

    response
}
