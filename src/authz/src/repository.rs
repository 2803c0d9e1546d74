//! Repository collaborator
//!
//! The decision engine and the routing table manager only read through this
//! trait. Writes happen through administrative mutators on each backend.

use crate::error::Result;
use crate::model::{Group, GroupId, Policy, ProxyResource, User};
use async_trait::async_trait;

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::{MemoryRepository, Seed};

#[cfg(feature = "postgres")]
pub use postgres::PostgresRepository;

/// Read-side storage capabilities consumed by the core
///
/// Every failure surfaces as [`AuthzError::Internal`](crate::AuthzError::Internal);
/// implementations never retry on their own.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
    /// Look up a user by the identity resolved by the authenticator
    async fn get_user_by_external_id(&self, external_id: &str) -> Result<Option<User>>;

    /// Groups the user is a member of, optionally restricted to one org
    async fn get_groups_for_user(&self, user_id: &str, org: Option<&str>) -> Result<Vec<Group>>;

    /// Policies attached to any of the given groups
    async fn get_policies_for_groups(&self, group_ids: &[GroupId]) -> Result<Vec<Policy>>;

    /// Full current set of proxy resources, in a stable order
    async fn get_proxy_resources(&self) -> Result<Vec<ProxyResource>>;
}
