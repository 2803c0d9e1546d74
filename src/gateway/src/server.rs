//! Server lifecycle
//!
//! This module handles:
//! - Repository backend selection
//! - Authenticator construction from configuration
//! - Worker and proxy listeners with graceful shutdown

use crate::config::{AuthorizerMode, GatewayConfig, RepositoryBackend};
use crate::proxy::{self, Authorizer, Forwarder, LocalAuthorizer, ProxyState, WorkerClient};
use crate::routing::RoutingTableManager;
use crate::worker::{self, WorkerState};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use warden_authz::{
    Authenticator, AuthzEngine, JwtConnector, MemoryRepository, Repository, Seed,
};

/// Which server this process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Authorization API backed by the in-process engine
    Worker,
    /// Enforcement proxy in front of the configured backends
    Proxy,
}

/// Open the configured repository and run `role` until `shutdown` fires
pub async fn run(config: GatewayConfig, role: Role, shutdown: CancellationToken) -> Result<()> {
    match config.repository.backend {
        RepositoryBackend::Memory => {
            let repository = open_memory_repository(&config).await?;
            serve(config, role, Arc::new(repository), shutdown).await
        }
        #[cfg(feature = "postgres")]
        RepositoryBackend::Postgres => {
            let repository = open_postgres_repository(&config).await?;
            serve(config, role, Arc::new(repository), shutdown).await
        }
        #[cfg(not(feature = "postgres"))]
        RepositoryBackend::Postgres => {
            anyhow::bail!("This build does not include the postgres backend")
        }
    }
}

async fn open_memory_repository(config: &GatewayConfig) -> Result<MemoryRepository> {
    match &config.repository.seed_file {
        Some(path) => {
            let seed = Seed::load(path)
                .with_context(|| format!("Failed to load seed file {}", path.display()))?;
            let repository = MemoryRepository::from_seed(seed)
                .await
                .context("Invalid seed document")?;
            info!(seed = %path.display(), "Memory repository seeded");
            Ok(repository)
        }
        None => {
            warn!("No seed file configured, memory repository starts empty");
            Ok(MemoryRepository::new())
        }
    }
}

#[cfg(feature = "postgres")]
async fn open_postgres_repository(
    config: &GatewayConfig,
) -> Result<warden_authz::PostgresRepository> {
    let url = config
        .repository
        .database_url
        .as_deref()
        .context("repository.database_url is required with the postgres backend")?;

    let repository =
        warden_authz::PostgresRepository::connect(url, config.repository.max_connections)
            .await
            .context("Failed to connect to database")?;

    if config.repository.run_migrations {
        repository
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    info!("PostgreSQL repository connected");
    Ok(repository)
}

/// Admin credential plus the optional JWT connector
pub fn build_authenticator(config: &GatewayConfig) -> Result<Authenticator> {
    let mut authenticator = Authenticator::new(config.admin.credentials());

    if let Some(auth) = &config.auth {
        let mut connector = match (&auth.secret, &auth.rsa_public_key_pem) {
            (Some(secret), None) => JwtConnector::hs256(secret.as_bytes()),
            (None, Some(pem)) => JwtConnector::rs256_pem(pem.as_bytes())
                .context("Invalid auth.rsa_public_key_pem")?,
            _ => anyhow::bail!("auth requires exactly one of secret or rsa_public_key_pem"),
        };
        if let Some(issuer) = &auth.issuer {
            connector = connector.with_issuer(issuer);
        }
        if let Some(audience) = &auth.audience {
            connector = connector.with_audience(audience);
        }
        connector = connector.with_identity_claim(auth.identity_claim.clone());

        authenticator = authenticator.with_connector(Arc::new(connector));
    }

    Ok(authenticator)
}

async fn serve<R: Repository>(
    config: GatewayConfig,
    role: Role,
    repository: Arc<R>,
    shutdown: CancellationToken,
) -> Result<()> {
    let engine = Arc::new(AuthzEngine::new(Arc::clone(&repository)));
    let authenticator = Arc::new(build_authenticator(&config)?);

    match role {
        Role::Worker => run_worker(&config, engine, authenticator, shutdown).await,
        Role::Proxy => run_proxy(&config, repository, engine, authenticator, shutdown).await,
    }
}

pub async fn run_worker<R: Repository>(
    config: &GatewayConfig,
    engine: Arc<AuthzEngine<R>>,
    authenticator: Arc<Authenticator>,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = config.worker.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind worker to {}", addr))?;
    info!("Worker listening on http://{}", listener.local_addr()?);

    let app = worker::router(WorkerState::new(engine, authenticator));
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Worker server error")?;

    info!("Worker shut down gracefully");
    Ok(())
}

pub async fn run_proxy<R: Repository>(
    config: &GatewayConfig,
    repository: Arc<R>,
    engine: Arc<AuthzEngine<R>>,
    authenticator: Arc<Authenticator>,
    shutdown: CancellationToken,
) -> Result<()> {
    let manager = Arc::new(RoutingTableManager::new(repository));
    if let Err(e) = manager.refresh().await {
        error!(error = %e, "Initial routing table load failed, starting with no routes");
    }
    let refresh_task =
        Arc::clone(&manager).spawn(config.proxy.refresh_interval(), shutdown.clone());

    let authorizer: Arc<dyn Authorizer> = match config.proxy.authorizer {
        AuthorizerMode::Local => Arc::new(LocalAuthorizer::new(
            authenticator,
            engine,
            config.proxy.worker_timeout(),
        )),
        AuthorizerMode::Remote => {
            let url = config
                .proxy
                .worker_url
                .as_deref()
                .context("proxy.worker_url is required with the remote authorizer")?;
            info!(worker = %url, "Delegating authorization to worker");
            Arc::new(
                WorkerClient::new(url, config.proxy.worker_timeout())
                    .context("Failed to build worker client")?,
            )
        }
    };
    let forwarder = Arc::new(
        Forwarder::new(config.proxy.backend_timeout(), config.proxy.max_body_bytes)
            .context("Failed to build backend client")?,
    );

    let addr = config.proxy.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind proxy to {}", addr))?;
    info!("Proxy listening on http://{}", listener.local_addr()?);

    let app = proxy::router(ProxyState::new(manager.handle(), authorizer, forwarder));
    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await
        .context("Proxy server error")?;

    shutdown.cancel();
    if let Err(e) = refresh_task.await {
        warn!(error = %e, "Routing table refresh task ended abnormally");
    }

    info!("Proxy shut down gracefully");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }

    info!("Starting graceful shutdown");
}
