//! # Warden Authorization Core
//!
//! IAM-style authorization decisions over URN-addressed resources.
//!
//! ## Features
//!
//! - **URN matching** with a single trailing `*` wildcard
//! - **Deny overrides allow**, default deny, per candidate resource
//! - **Admin bypass** for the fixed administrative credential
//! - **Repository trait** with in-memory and PostgreSQL backends
//! - **Authenticator** with HTTP Basic admin credentials and a JWT connector
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use warden_authz::{AuthenticatedUser, AuthzEngine, MemoryRepository};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = AuthzEngine::new(Arc::new(MemoryRepository::new()));
//! let admin = AuthenticatedUser::admin("admin");
//!
//! let allowed = engine
//!     .get_authorized_resources(
//!         &admin,
//!         "item:get",
//!         &["urn:ews:example:org1:resource/items/42".to_string()],
//!     )
//!     .await?;
//!
//! assert_eq!(allowed.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod engine;
pub mod error;
pub mod model;
pub mod repository;
pub mod urn;

pub use auth::{AdminCredentials, AuthConnector, Authenticator, JwtConnector};
pub use engine::{AuthzEngine, Decision, EngineConfig, EngineMetrics};
pub use error::{AuthzError, Result};
pub use model::{
    AuthenticatedUser, Effect, Group, Policy, ProxyResource, ResourceEntity, Statement, User,
};
pub use repository::{MemoryRepository, Repository, Seed};

#[cfg(feature = "postgres")]
pub use repository::PostgresRepository;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
