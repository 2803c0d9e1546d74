//! Enforcement Handler
//!
//! Per request, terminal on the first failing step:
//!
//! ```text
//! route (404) → resolve URN → authorize ──denied/error──> 403 + request id
//!                                 │
//!                                 └─allowed──> forward to resource host
//! ```

pub mod authorizer;
pub mod forward;
pub mod template;

pub use authorizer::{Authorizer, LocalAuthorizer, WorkerClient};
pub use forward::Forwarder;
pub use template::resolve_urn;

use crate::error::GatewayError;
use crate::observability;
use crate::routing::{RouteMatch, TableHandle};
use axum::{
    extract::{Request, State},
    response::{IntoResponse, Response},
    Router,
};
use http::HeaderMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, Instrument};
use warden_authz::AuthzError;

/// Shared enforcement state
#[derive(Clone)]
pub struct ProxyState {
    table: TableHandle,
    authorizer: Arc<dyn Authorizer>,
    forwarder: Arc<Forwarder>,
}

impl ProxyState {
    pub fn new(table: TableHandle, authorizer: Arc<dyn Authorizer>, forwarder: Arc<Forwarder>) -> Self {
        Self {
            table,
            authorizer,
            forwarder,
        }
    }
}

/// Build the proxy router: every method and path goes through the routing table
pub fn router(state: ProxyState) -> Router {
    Router::new()
        .fallback(enforce)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn enforce(State(state): State<ProxyState>, request: Request) -> Response {
    let request_id = observability::new_request_id();
    let span = tracing::info_span!(
        "enforce",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let mut response = handle(&state, &request_id, request)
        .instrument(span)
        .await
        .unwrap_or_else(|err| {
            err.log(&request_id);
            err.with_request_id(request_id.clone()).into_response()
        });

    observability::set_request_id(response.headers_mut(), &request_id);
    response
}

async fn handle(
    state: &ProxyState,
    request_id: &str,
    request: Request,
) -> Result<Response, GatewayError> {
    let table = state.table.snapshot();

    let Some(route) = table.lookup(request.method(), request.uri().path()) else {
        return Err(GatewayError::NotFound(format!(
            "no route for {} {}",
            request.method(),
            request.uri().path()
        )));
    };

    authorize(state, request_id, &route, request.headers())
        .await
        .map_err(GatewayError::rejected)?;

    state
        .forwarder
        .forward(&route.resource.resource.host, request, request_id)
        .await
}

/// Resolve the route's URN and ask the authorizer about it
async fn authorize(
    state: &ProxyState,
    request_id: &str,
    route: &RouteMatch,
    headers: &HeaderMap,
) -> Result<(), AuthzError> {
    let resource = &route.resource;
    let action = resource.resource.action.as_str();
    let urn = resolve_urn(&resource.urn, &route.params)?;

    let allowed = state
        .authorizer
        .authorize(headers, request_id, action, std::slice::from_ref(&urn))
        .await?;

    if allowed.is_empty() {
        return Err(AuthzError::Unauthorized(format!(
            "action '{}' denied on '{}'",
            action, urn
        )));
    }

    info!(
        resource = %resource.name,
        org = %resource.org,
        action,
        urn = %urn,
        "Authorized"
    );
    Ok(())
}
