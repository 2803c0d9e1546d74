//! Gateway configuration loading and validation

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use warden_authz::AdminCredentials;

/// Complete gateway configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub worker: WorkerSection,

    #[serde(default)]
    pub proxy: ProxySection,

    pub admin: AdminSection,

    /// Bearer-token connector; without it only the admin credential authenticates
    pub auth: Option<AuthSection>,

    #[serde(default)]
    pub repository: RepositorySection,

    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_worker_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizerMode {
    /// Authenticate and evaluate in-process
    Local,
    /// Delegate to a worker's `POST /authorize`
    Remote,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxySection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_proxy_port")]
    pub port: u16,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_authorizer")]
    pub authorizer: AuthorizerMode,
    #[serde(default)]
    pub worker_url: Option<String>,
    /// Bound on one authorize step, local or remote
    #[serde(default = "default_worker_timeout")]
    pub worker_timeout_ms: u64,
    #[serde(default = "default_backend_timeout")]
    pub backend_timeout_ms: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct AdminSection {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AdminSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSection")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthSection {
    /// HS256 shared secret
    #[serde(default)]
    pub secret: Option<String>,
    /// RS256 public key, PEM encoded
    #[serde(default)]
    pub rsa_public_key_pem: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default = "default_identity_claim")]
    pub identity_claim: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RepositorySection {
    #[serde(default = "default_backend")]
    pub backend: RepositoryBackend,
    /// JSON or TOML seed document for the memory backend
    #[serde(default)]
    pub seed_file: Option<PathBuf>,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_true() -> bool { true }
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_worker_port() -> u16 { 8000 }
fn default_proxy_port() -> u16 { 8001 }
fn default_refresh_interval() -> u64 { 10 }
fn default_authorizer() -> AuthorizerMode { AuthorizerMode::Local }
fn default_worker_timeout() -> u64 { 5_000 }
fn default_backend_timeout() -> u64 { 30_000 }
fn default_max_body_bytes() -> usize { 10 * 1024 * 1024 }
fn default_identity_claim() -> String { "sub".to_string() }
fn default_backend() -> RepositoryBackend { RepositoryBackend::Memory }
fn default_max_connections() -> u32 { 10 }
fn default_log_level() -> String { "info".to_string() }

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_worker_port(),
        }
    }
}

impl Default for ProxySection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_proxy_port(),
            refresh_interval_secs: default_refresh_interval(),
            authorizer: default_authorizer(),
            worker_url: None,
            worker_timeout_ms: default_worker_timeout(),
            backend_timeout_ms: default_backend_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for RepositorySection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            seed_file: None,
            database_url: None,
            max_connections: default_max_connections(),
            run_migrations: true,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl WorkerSection {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl ProxySection {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_timeout_ms)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }
}

impl AdminSection {
    pub fn credentials(&self) -> AdminCredentials {
        AdminCredentials {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;

        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse configuration file {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: GatewayConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Reject inconsistent settings before anything starts
    pub fn validate(&self) -> Result<()> {
        if self.admin.username.is_empty() || self.admin.password.is_empty() {
            anyhow::bail!("Admin username and password must not be empty");
        }

        if self.proxy.refresh_interval_secs == 0 {
            anyhow::bail!("proxy.refresh_interval_secs must be greater than zero");
        }

        if self.proxy.worker_timeout_ms == 0 || self.proxy.backend_timeout_ms == 0 {
            anyhow::bail!("Proxy timeouts must be greater than zero");
        }

        if self.proxy.authorizer == AuthorizerMode::Remote {
            match &self.proxy.worker_url {
                Some(url) if url.starts_with("http://") || url.starts_with("https://") => {}
                Some(url) => anyhow::bail!("proxy.worker_url '{}' must be an http(s) URL", url),
                None => anyhow::bail!("proxy.worker_url is required with the remote authorizer"),
            }
        }

        if let Some(auth) = &self.auth {
            match (&auth.secret, &auth.rsa_public_key_pem) {
                (Some(_), Some(_)) => {
                    anyhow::bail!("auth.secret and auth.rsa_public_key_pem are mutually exclusive")
                }
                (None, None) => anyhow::bail!("auth requires either secret or rsa_public_key_pem"),
                _ => {}
            }
        }

        match self.repository.backend {
            RepositoryBackend::Postgres if self.repository.database_url.is_none() => {
                anyhow::bail!("repository.database_url is required with the postgres backend");
            }
            RepositoryBackend::Postgres if self.repository.max_connections == 0 => {
                anyhow::bail!("repository.max_connections must be greater than zero");
            }
            _ => {}
        }

        Ok(())
    }
}
