//! Request authentication
//!
//! The fixed administrative credential (HTTP Basic) always wins and never
//! reaches the connector. Everything else is delegated to an [`AuthConnector`].

use crate::error::{AuthzError, Result};
use crate::model::AuthenticatedUser;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http::header::AUTHORIZATION;
use http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Resolves request credentials to an external identity
#[async_trait]
pub trait AuthConnector: Send + Sync {
    /// `Ok(None)` when the request carries no credentials this connector
    /// understands; `Err(Unauthorized)` when it does but they are invalid.
    async fn identify(&self, headers: &HeaderMap) -> Result<Option<String>>;
}

/// Administrative username/password pair
#[derive(Clone)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Turns request headers into an [`AuthenticatedUser`]
#[derive(Clone)]
pub struct Authenticator {
    admin: AdminCredentials,
    connector: Option<Arc<dyn AuthConnector>>,
}

impl Authenticator {
    pub fn new(admin: AdminCredentials) -> Self {
        Self {
            admin,
            connector: None,
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn AuthConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthenticatedUser> {
        if let Some((username, password)) = basic_credentials(headers) {
            if username == self.admin.username && password == self.admin.password {
                return Ok(AuthenticatedUser::admin(username));
            }
            debug!(username = %username, "Basic credentials do not match admin");
        }

        let Some(connector) = &self.connector else {
            return Err(AuthzError::Unauthorized("no valid credentials".to_string()));
        };

        match connector.identify(headers).await? {
            Some(identity) => Ok(AuthenticatedUser::user(identity)),
            None => Err(AuthzError::Unauthorized("no valid credentials".to_string())),
        }
    }
}

fn authorization_value(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION)?.to_str().ok()
}

/// Decode `Authorization: Basic ...` into a username/password pair
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = authorization_value(headers)?;
    let encoded = value
        .strip_prefix("Basic ")
        .or_else(|| value.strip_prefix("basic "))?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Extract the token from `Authorization: Bearer ...`
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = authorization_value(headers)?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Bearer-token connector validating signed JWTs
pub struct JwtConnector {
    key: DecodingKey,
    validation: Validation,
    identity_claim: String,
}

impl JwtConnector {
    /// HMAC-SHA256 shared secret
    pub fn hs256(secret: &[u8]) -> Self {
        Self::with_key(DecodingKey::from_secret(secret), Algorithm::HS256)
    }

    /// RSA-SHA256 public key in PEM format
    pub fn rs256_pem(pem: &[u8]) -> Result<Self> {
        let key = DecodingKey::from_rsa_pem(pem)
            .map_err(|e| AuthzError::InvalidParameter(format!("invalid RSA public key: {}", e)))?;
        Ok(Self::with_key(key, Algorithm::RS256))
    }

    fn with_key(key: DecodingKey, algorithm: Algorithm) -> Self {
        let mut validation = Validation::new(algorithm);
        validation.validate_aud = false;
        Self {
            key,
            validation,
            identity_claim: "sub".to_string(),
        }
    }

    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self
    }

    pub fn with_audience(mut self, audience: &str) -> Self {
        self.validation.set_audience(&[audience]);
        self.validation.validate_aud = true;
        self
    }

    pub fn with_identity_claim(mut self, claim: impl Into<String>) -> Self {
        self.identity_claim = claim.into();
        self
    }
}

#[async_trait]
impl AuthConnector for JwtConnector {
    async fn identify(&self, headers: &HeaderMap) -> Result<Option<String>> {
        let Some(token) = bearer_token(headers) else {
            return Ok(None);
        };

        let data = decode::<Map<String, Value>>(token, &self.key, &self.validation)
            .map_err(|e| AuthzError::Unauthorized(format!("invalid token: {}", e)))?;

        match data.claims.get(&self.identity_claim) {
            Some(Value::String(identity)) if !identity.is_empty() => Ok(Some(identity.clone())),
            _ => Err(AuthzError::Unauthorized(format!(
                "token has no '{}' claim",
                self.identity_claim
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &[u8] = b"test-secret";

    fn admin() -> AdminCredentials {
        AdminCredentials {
            username: "admin".to_string(),
            password: "s3cret".to_string(),
        }
    }

    fn basic(user: &str, pass: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("Basic {}", STANDARD.encode(format!("{}:{}", user, pass)));
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
        headers
    }

    fn bearer(claims: serde_json::Value) -> HeaderMap {
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    fn future_exp() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[tokio::test]
    async fn test_admin_credentials_bypass_connector() {
        let authenticator = Authenticator::new(admin());
        let user = authenticator.authenticate(&basic("admin", "s3cret")).await.unwrap();
        assert!(user.is_admin);
        assert_eq!(user.identity, "admin");
    }

    #[tokio::test]
    async fn test_wrong_password_is_unauthorized() {
        let authenticator = Authenticator::new(admin());
        let err = authenticator
            .authenticate(&basic("admin", "nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_missing_credentials_is_unauthorized() {
        let authenticator =
            Authenticator::new(admin()).with_connector(Arc::new(JwtConnector::hs256(SECRET)));
        let err = authenticator.authenticate(&HeaderMap::new()).await.unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_jwt_connector_resolves_subject() {
        let authenticator =
            Authenticator::new(admin()).with_connector(Arc::new(JwtConnector::hs256(SECRET)));
        let headers = bearer(json!({ "sub": "alice", "exp": future_exp() }));

        let user = authenticator.authenticate(&headers).await.unwrap();
        assert_eq!(user, AuthenticatedUser::user("alice"));
    }

    #[tokio::test]
    async fn test_jwt_connector_custom_claim_and_issuer() {
        let connector = JwtConnector::hs256(SECRET)
            .with_issuer("https://issuer.example")
            .with_identity_claim("email");

        let ok = bearer(json!({
            "email": "alice@example.com",
            "iss": "https://issuer.example",
            "exp": future_exp(),
        }));
        assert_eq!(
            connector.identify(&ok).await.unwrap().as_deref(),
            Some("alice@example.com")
        );

        let wrong_issuer = bearer(json!({
            "email": "alice@example.com",
            "iss": "https://other.example",
            "exp": future_exp(),
        }));
        assert!(connector.identify(&wrong_issuer).await.is_err());
    }

    #[tokio::test]
    async fn test_jwt_connector_rejects_expired_and_forged() {
        let connector = JwtConnector::hs256(SECRET);

        let expired = bearer(json!({ "sub": "alice", "exp": 1_000 }));
        assert!(connector.identify(&expired).await.is_err());

        let token = encode(
            &Header::default(),
            &json!({ "sub": "alice", "exp": future_exp() }),
            &EncodingKey::from_secret(b"other-secret"),
        )
        .unwrap();
        let mut forged = HeaderMap::new();
        forged.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        assert!(connector.identify(&forged).await.is_err());
    }

    #[test]
    fn test_header_parsing() {
        assert_eq!(
            basic_credentials(&basic("a", "b:c")),
            Some(("a".to_string(), "b:c".to_string()))
        );
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));
        assert_eq!(basic_credentials(&headers), None);
    }
}
