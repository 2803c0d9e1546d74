//! Worker authorization API
//!
//! ## Endpoints
//!
//! - `POST /authorize` - Allowed subset of candidate URNs for the caller
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics

use crate::error::{ErrorResponse, GatewayError};
use crate::observability;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::info;
use warden_authz::{Authenticator, AuthzEngine, Repository};

/// `POST /authorize` body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    pub action: String,
    pub resources: Vec<String>,
}

/// `POST /authorize` success body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeResponse {
    pub resources_allowed: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub version: String,
}

/// Shared worker state
pub struct WorkerState<R> {
    engine: Arc<AuthzEngine<R>>,
    authenticator: Arc<Authenticator>,
    started_at: Instant,
}

impl<R> Clone for WorkerState<R> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            authenticator: Arc::clone(&self.authenticator),
            started_at: self.started_at,
        }
    }
}

impl<R: Repository> WorkerState<R> {
    pub fn new(engine: Arc<AuthzEngine<R>>, authenticator: Arc<Authenticator>) -> Self {
        Self {
            engine,
            authenticator,
            started_at: Instant::now(),
        }
    }
}

/// POST /authorize
async fn authorize<R: Repository>(
    State(state): State<WorkerState<R>>,
    headers: HeaderMap,
    payload: Result<Json<AuthorizeRequest>, JsonRejection>,
) -> Result<Json<AuthorizeResponse>, ErrorResponse> {
    let request_id = observability::request_id(&headers)
        .map(str::to_string)
        .unwrap_or_else(observability::new_request_id);
    let fail = |err: GatewayError| {
        err.log(&request_id);
        err.with_request_id(request_id.clone())
    };

    let user = state
        .authenticator
        .authenticate(&headers)
        .await
        .map_err(|e| fail(e.into()))?;

    let Json(request) = payload.map_err(|e| fail(GatewayError::InvalidParameter(e.body_text())))?;

    let allowed = state
        .engine
        .get_authorized_resources(&user, &request.action, &request.resources)
        .await
        .map_err(|e| fail(e.into()))?;

    info!(
        request_id = %request_id,
        identity = %user.identity,
        action = %request.action,
        requested = request.resources.len(),
        allowed = allowed.len(),
        "Authorization evaluated"
    );

    Ok(Json(AuthorizeResponse {
        resources_allowed: allowed,
    }))
}

/// GET /health
async fn health<R: Repository>(State(state): State<WorkerState<R>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        version: warden_authz::VERSION.to_string(),
    })
}

/// GET /metrics
async fn metrics<R: Repository>(State(state): State<WorkerState<R>>) -> Response {
    let mut body = format!(
        "# HELP warden_uptime_seconds Worker uptime in seconds\n\
         # TYPE warden_uptime_seconds gauge\n\
         warden_uptime_seconds {}\n\n",
        state.started_at.elapsed().as_secs()
    );
    if let Some(engine_metrics) = state.engine.export_metrics().await {
        body.push_str(&engine_metrics);
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

/// Build the worker router
pub fn router<R: Repository>(state: WorkerState<R>) -> Router {
    Router::new()
        .route("/authorize", post(authorize::<R>))
        .route("/health", get(health::<R>))
        .route("/metrics", get(metrics::<R>))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(
                    observability::request_id_header(),
                    MakeRequestUuid,
                ))
                .layer(TraceLayer::new_for_http().make_span_with(observability::make_span))
                .layer(PropagateRequestIdLayer::new(
                    observability::request_id_header(),
                )),
        )
        .with_state(state)
}
