//! Authorization backends for the enforcement handler

use crate::observability::{self, REQUEST_ID_HEADER};
use crate::worker::{AuthorizeRequest, AuthorizeResponse};
use async_trait::async_trait;
use http::header::AUTHORIZATION;
use http::{HeaderMap, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use warden_authz::{Authenticator, AuthzEngine, AuthzError, Repository, Result};

/// Decides which of `resources` the caller behind `headers` may act on
#[async_trait]
pub trait Authorizer: Send + Sync + 'static {
    async fn authorize(
        &self,
        headers: &HeaderMap,
        request_id: &str,
        action: &str,
        resources: &[String],
    ) -> Result<Vec<String>>;
}

/// In-process authenticator + decision engine
///
/// Each decision is bounded by `timeout`; a repository that stops answering
/// surfaces as `Internal` instead of holding the request.
pub struct LocalAuthorizer<R> {
    authenticator: Arc<Authenticator>,
    engine: Arc<AuthzEngine<R>>,
    timeout: Duration,
}

impl<R: Repository> LocalAuthorizer<R> {
    pub fn new(
        authenticator: Arc<Authenticator>,
        engine: Arc<AuthzEngine<R>>,
        timeout: Duration,
    ) -> Self {
        Self {
            authenticator,
            engine,
            timeout,
        }
    }
}

#[async_trait]
impl<R: Repository> Authorizer for LocalAuthorizer<R> {
    async fn authorize(
        &self,
        headers: &HeaderMap,
        _request_id: &str,
        action: &str,
        resources: &[String],
    ) -> Result<Vec<String>> {
        let decide = async {
            let user = self.authenticator.authenticate(headers).await?;
            self.engine
                .get_authorized_resources(&user, action, resources)
                .await
        };

        tokio::time::timeout(self.timeout, decide)
            .await
            .map_err(|_| {
                AuthzError::Internal(format!(
                    "authorization did not complete within {:?}",
                    self.timeout
                ))
            })?
    }
}

/// HTTP client for a remote worker's `POST /authorize`
pub struct WorkerClient {
    client: reqwest::Client,
    endpoint: String,
}

impl WorkerClient {
    pub fn new(worker_url: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/authorize", worker_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Authorizer for WorkerClient {
    async fn authorize(
        &self,
        headers: &HeaderMap,
        request_id: &str,
        action: &str,
        resources: &[String],
    ) -> Result<Vec<String>> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(REQUEST_ID_HEADER, request_id)
            .json(&AuthorizeRequest {
                action: action.to_string(),
                resources: resources.to_vec(),
            });
        if let Some(credentials) = headers.get(AUTHORIZATION) {
            request = request.header(AUTHORIZATION, credentials.clone());
        }

        let response = request.send().await.map_err(|e| {
            let kind = if e.is_timeout() { "timed out" } else { "failed" };
            AuthzError::Internal(format!("worker call {}: {}", kind, e))
        })?;

        let status = response.status();
        debug!(
            request_id = %request_id,
            status = %status,
            "Worker answered"
        );

        match status {
            StatusCode::OK => {
                let body: AuthorizeResponse = response.json().await.map_err(|e| {
                    AuthzError::Internal(format!("invalid worker response: {}", e))
                })?;
                // Only candidates we asked about can come back allowed
                Ok(body
                    .resources_allowed
                    .into_iter()
                    .filter(|urn| resources.contains(urn))
                    .collect())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AuthzError::Unauthorized(
                format!("worker refused caller with {}", status),
            )),
            StatusCode::BAD_REQUEST => Err(AuthzError::InvalidParameter(format!(
                "worker rejected parameters with {}",
                status
            ))),
            other => Err(AuthzError::Internal(format!(
                "worker answered {} ({})",
                other,
                observability::request_id(response.headers()).unwrap_or("-")
            ))),
        }
    }
}
