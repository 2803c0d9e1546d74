//! Backend forwarding

use crate::error::GatewayError;
use crate::observability;
use axum::body::Body;
use axum::extract::Request;
use axum::response::Response;
use http::header::{self, HeaderMap, HeaderName, CONTENT_LENGTH, HOST};
use std::time::Duration;
use tracing::debug;

/// Hop-by-hop headers never cross the proxy
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_HOST: &str = "x-forwarded-host";

pub struct Forwarder {
    client: reqwest::Client,
    max_body_bytes: usize,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(timeout: Duration, max_body_bytes: usize) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            max_body_bytes,
            timeout,
        })
    }

    /// Send `request` to `host`, keeping its path and query, and stream the
    /// backend's answer back unchanged
    pub async fn forward(
        &self,
        host: &str,
        request: Request,
        request_id: &str,
    ) -> Result<Response, GatewayError> {
        let (parts, body) = request.into_parts();

        let declared = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > self.max_body_bytes) {
            return Err(GatewayError::PayloadTooLarge(format!(
                "declared length {:?} exceeds {}",
                declared, self.max_body_bytes
            )));
        }
        // The client's upload shares the backend deadline
        let body = tokio::time::timeout(self.timeout, axum::body::to_bytes(body, self.max_body_bytes))
            .await
            .map_err(|_| {
                GatewayError::RequestTimeout(format!(
                    "request body not received within {:?}",
                    self.timeout
                ))
            })?
            .map_err(|e| GatewayError::PayloadTooLarge(e.to_string()))?;

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", host.trim_end_matches('/'), path_and_query);

        let mut headers = parts.headers.clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(CONTENT_LENGTH);
        if let Some(original_host) = headers.remove(HOST) {
            headers.insert(HeaderName::from_static(X_FORWARDED_HOST), original_host);
        }
        observability::set_request_id(&mut headers, request_id);

        debug!(request_id = %request_id, method = %parts.method, url = %url, "Forwarding");

        let upstream = self
            .client
            .request(parts.method, &url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::GatewayTimeout(format!("{}: {}", url, e))
                } else {
                    GatewayError::BadGateway(format!("{}: {}", url, e))
                }
            })?;

        let status = upstream.status();
        let mut response_headers = upstream.headers().clone();
        strip_hop_by_hop(&mut response_headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

/// Drop hop-by-hop headers, including any listed in `Connection`
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in &listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}
