//! Shared fixtures for gateway integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::Path,
    http::{HeaderMap, Request, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use warden_authz::{
    AdminCredentials, AuthConnector, Authenticator, AuthzEngine, Group, MemoryRepository, Policy,
    ProxyResource, ResourceEntity, Result, Statement, User,
};
use warden_gateway::proxy::Authorizer;

pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASSWORD: &str = "s3cret";
pub const INSTANCE: &str = "urn:ews:example:instance1:resource";

/// Resolves `Authorization: User <name>` to `<name>`
pub struct HeaderConnector;

#[async_trait]
impl AuthConnector for HeaderConnector {
    async fn identify(&self, headers: &HeaderMap) -> Result<Option<String>> {
        Ok(headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("User "))
            .map(str::to_string))
    }
}

pub fn authenticator() -> Arc<Authenticator> {
    Arc::new(
        Authenticator::new(AdminCredentials {
            username: ADMIN_USER.to_string(),
            password: ADMIN_PASSWORD.to_string(),
        })
        .with_connector(Arc::new(HeaderConnector)),
    )
}

pub fn admin_auth() -> String {
    format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", ADMIN_USER, ADMIN_PASSWORD))
    )
}

pub fn user_auth(name: &str) -> String {
    format!("User {}", name)
}

pub fn proxy_resource(name: &str, method: &str, path: &str, urn: &str, action: &str, host: &str) -> ProxyResource {
    ProxyResource::new(
        "org1",
        name,
        urn,
        ResourceEntity {
            host: host.to_string(),
            path: path.to_string(),
            method: method.to_string(),
            action: action.to_string(),
        },
    )
}

/// `alice` may read items except item 13; `bob` exists but has no groups
pub async fn seeded_repository(backend: &str) -> MemoryRepository {
    let repo = MemoryRepository::new();

    let alice = repo.put_user(User::new("alice", "/")).await.unwrap();
    repo.put_user(User::new("bob", "/")).await.unwrap();

    let readers = repo.put_group(Group::new("org1", "readers", "/")).await.unwrap();
    repo.add_member(&readers.id, &alice.id).await.unwrap();

    let items = format!("{}/items/*", INSTANCE);
    let item13 = format!("{}/items/13", INSTANCE);
    let echo = format!("{}/echo", INSTANCE);
    let policy = repo
        .put_policy(Policy::new(
            "org1",
            "item-readers",
            "/",
            vec![
                Statement::allow(&["item:get"], &[items.as_str()]),
                Statement::deny(&["item:get"], &[item13.as_str()]),
                Statement::allow(&["echo:post"], &[echo.as_str()]),
            ],
        ))
        .await
        .unwrap();
    repo.attach_policy(&readers.id, &policy.id).await.unwrap();

    for resource in [
        proxy_resource("get-user", "GET", "/user", &format!("{}/user", INSTANCE), "user:get", backend),
        proxy_resource(
            "get-item",
            "GET",
            "/items/:id",
            &format!("{}/items/{{id}}", INSTANCE),
            "item:get",
            backend,
        ),
        proxy_resource("echo", "POST", "/echo", &format!("{}/echo", INSTANCE), "echo:post", backend),
        proxy_resource(
            "broken",
            "GET",
            "/broken",
            &format!("{}/broken", INSTANCE),
            "broken:get",
            "http://127.0.0.1:1",
        ),
    ] {
        repo.put_proxy_resource(resource).await.unwrap();
    }

    repo
}

pub fn engine(repo: &MemoryRepository) -> Arc<AuthzEngine<MemoryRepository>> {
    Arc::new(AuthzEngine::new(Arc::new(repo.clone())))
}

/// Serve `router` on an ephemeral local port
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn user_handler(headers: HeaderMap) -> impl IntoResponse {
    let seen = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    (StatusCode::OK, [("x-seen-request-id", seen)], "user-body")
}

async fn item_handler(Path(id): Path<String>) -> String {
    format!("item {}", id)
}

async fn echo_handler(body: Bytes) -> Bytes {
    body
}

/// Backend service the proxy forwards to
pub async fn spawn_backend() -> String {
    let router = Router::new()
        .route("/user", get(user_handler))
        .route("/items/:id", get(item_handler))
        .route("/echo", post(echo_handler));
    format!("http://{}", spawn_server(router).await)
}

/// Counts calls before delegating
pub struct CountingAuthorizer {
    inner: Arc<dyn Authorizer>,
    calls: AtomicUsize,
}

impl CountingAuthorizer {
    pub fn new(inner: Arc<dyn Authorizer>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authorizer for CountingAuthorizer {
    async fn authorize(
        &self,
        headers: &HeaderMap,
        request_id: &str,
        action: &str,
        resources: &[String],
    ) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner
            .authorize(headers, request_id, action, resources)
            .await
    }
}

pub fn request(method: &str, uri: &str, auth: Option<&str>, body: Body) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header("authorization", auth);
    }
    builder.body(body).unwrap()
}

pub async fn body_bytes(body: Body) -> Bytes {
    axum::body::to_bytes(body, usize::MAX).await.unwrap()
}
