//! Gateway HTTP errors
//!
//! Bodies are always `{ "code", "message", "requestId" }`. The message is a
//! fixed, generic sentence per variant; the detail carried by each variant is
//! only ever logged.

use crate::observability;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};
use warden_authz::AuthzError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("unauthenticated: {0}")]
    Unauthorized(String),

    /// Enforcement refused the request; `code` is the coarse cause
    #[error("rejected ({code}): {cause}")]
    Rejected { code: &'static str, cause: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request timeout: {0}")]
    RequestTimeout(String),

    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("bad gateway: {0}")]
    BadGateway(String),

    #[error("gateway timeout: {0}")]
    GatewayTimeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Enforcement-time failure: always a 403, whatever the cause
    pub fn rejected(err: AuthzError) -> Self {
        GatewayError::Rejected {
            code: err.code(),
            cause: err.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Rejected { .. } => StatusCode::FORBIDDEN,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::RequestTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            GatewayError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::InvalidParameter(_) => "INVALID_PARAMETER",
            GatewayError::Unauthorized(_) => "UNAUTHORIZED",
            GatewayError::Rejected { code, .. } => *code,
            GatewayError::NotFound(_) => "NOT_FOUND",
            GatewayError::RequestTimeout(_) => "REQUEST_TIMEOUT",
            GatewayError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            GatewayError::BadGateway(_) => "BAD_GATEWAY",
            GatewayError::GatewayTimeout(_) => "GATEWAY_TIMEOUT",
            GatewayError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            GatewayError::InvalidParameter(_) => "The request parameters are invalid",
            GatewayError::Unauthorized(_) => "Authentication is required",
            GatewayError::Rejected { .. } => {
                "Forbidden resource. If you need access, contact the administrator"
            }
            GatewayError::NotFound(_) => "Resource not found",
            GatewayError::RequestTimeout(_) => "The request body was not received in time",
            GatewayError::PayloadTooLarge(_) => "Request body too large",
            GatewayError::BadGateway(_) => "The upstream service is unavailable",
            GatewayError::GatewayTimeout(_) => "The upstream service did not respond in time",
            GatewayError::Internal(_) => "Internal server error",
        }
    }

    /// Internal failures are operator-facing; everything else is routine
    pub fn is_expected(&self) -> bool {
        match self {
            GatewayError::Rejected { code, .. } => *code != "INTERNAL_ERROR",
            GatewayError::Internal(_) | GatewayError::BadGateway(_) | GatewayError::GatewayTimeout(_) => false,
            _ => true,
        }
    }

    /// Log the full cause against the transaction id
    pub fn log(&self, request_id: &str) {
        if self.is_expected() {
            warn!(request_id = %request_id, code = self.code(), error = %self, "Request failed");
        } else {
            error!(request_id = %request_id, code = self.code(), error = %self, "Request failed");
        }
    }

    pub fn with_request_id(self, request_id: impl Into<String>) -> ErrorResponse {
        ErrorResponse {
            request_id: request_id.into(),
            error: self,
        }
    }
}

impl From<AuthzError> for GatewayError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::InvalidParameter(msg) => GatewayError::InvalidParameter(msg),
            AuthzError::Unauthorized(msg) => GatewayError::Unauthorized(msg),
            AuthzError::NotFound(msg) => GatewayError::NotFound(msg),
            AuthzError::Internal(msg) => GatewayError::Internal(msg),
        }
    }
}

/// Wire shape of every error body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub request_id: String,
}

/// A [`GatewayError`] bound to the transaction it failed
#[derive(Debug)]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: GatewayError,
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            code: self.error.code().to_string(),
            message: self.error.message().to_string(),
            request_id: self.request_id.clone(),
        });

        let mut response = (self.error.status(), body).into_response();
        observability::set_request_id(response.headers_mut(), &self.request_id);
        response
    }
}
