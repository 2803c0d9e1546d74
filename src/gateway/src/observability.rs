//! Logging bootstrap and request-id helpers

use axum::body::Body;
use http::{HeaderMap, HeaderName, HeaderValue, Request};
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Header carrying the transaction id between proxy, worker and backend
pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn request_id_header() -> HeaderName {
    HeaderName::from_static(REQUEST_ID_HEADER)
}

/// Install the global `tracing` subscriber
///
/// `RUST_LOG` wins over the configured level; `verbose` forces `debug`.
pub fn init_tracing(level: &str, verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{},warden_gateway={},warden_authz={}", level, level, level).into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Request id carried by the request, if any
pub fn request_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

pub fn set_request_id(headers: &mut HeaderMap, request_id: &str) {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(request_id_header(), value);
    }
}

/// Span for `TraceLayer::make_span_with`, tagged with the request id
pub fn make_span(request: &Request<Body>) -> Span {
    let request_id = request_id(request.headers()).unwrap_or("-");
    tracing::info_span!(
        "http",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}
