//! Error types for the authorization engine

use thiserror::Error;

/// Authorization errors
///
/// `InvalidParameter` and `Unauthorized` are expected outcomes and are safe to
/// report to callers with a generic message. `Internal` carries detail meant
/// for server-side logs only.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Malformed or wildcard URN/action supplied at authorization time
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Caller could not be authenticated or was denied
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Referenced entity or route does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Repository, backend or network failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthzError {
    /// Coarse, stable error code suitable for client-facing bodies
    pub fn code(&self) -> &'static str {
        match self {
            AuthzError::InvalidParameter(_) => "INVALID_PARAMETER",
            AuthzError::Unauthorized(_) => "UNAUTHORIZED",
            AuthzError::NotFound(_) => "NOT_FOUND",
            AuthzError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this error is an expected client-side outcome
    pub fn is_expected(&self) -> bool {
        !matches!(self, AuthzError::Internal(_))
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for AuthzError {
    fn from(err: sqlx::Error) -> Self {
        AuthzError::Internal(format!("Database error: {}", err))
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
