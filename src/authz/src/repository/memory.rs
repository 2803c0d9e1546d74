//! In-memory repository for tests, demos and single-node deployments

use crate::error::{AuthzError, Result};
use crate::model::{
    Group, GroupId, Policy, PolicyId, ProxyResource, ResourceEntity, Statement, User, UserId,
};
use crate::repository::Repository;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<UserId, User>,
    groups: HashMap<GroupId, Group>,
    policies: HashMap<PolicyId, Policy>,
    members: HashMap<GroupId, BTreeSet<UserId>>,
    attachments: HashMap<GroupId, BTreeSet<PolicyId>>,
    proxy_resources: Vec<ProxyResource>,
}

/// Thread-safe in-memory repository
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    inner: Arc<RwLock<Inner>>,
    proxy_resource_reads: Arc<AtomicU64>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a repository from a seed document
    pub async fn from_seed(seed: Seed) -> Result<Self> {
        let repo = Self::new();

        let mut users_by_external = HashMap::new();
        for seed_user in seed.users {
            let user = repo
                .put_user(User::new(seed_user.external_id, seed_user.path))
                .await?;
            users_by_external.insert(user.external_id.clone(), user.id);
        }

        let mut policies_by_name = HashMap::new();
        for seed_policy in seed.policies {
            let policy = repo
                .put_policy(Policy::new(
                    seed_policy.org,
                    seed_policy.name,
                    seed_policy.path,
                    seed_policy.statements,
                ))
                .await?;
            policies_by_name.insert((policy.org.clone(), policy.name.clone()), policy.id);
        }

        for seed_group in seed.groups {
            let group = repo
                .put_group(Group::new(seed_group.org, seed_group.name, seed_group.path))
                .await?;

            for member in &seed_group.members {
                let user_id = users_by_external.get(member).ok_or_else(|| {
                    AuthzError::NotFound(format!("seed user '{}' for group '{}'", member, group.name))
                })?;
                repo.add_member(&group.id, user_id).await?;
            }

            for policy_name in &seed_group.policies {
                let policy_id = policies_by_name
                    .get(&(group.org.clone(), policy_name.clone()))
                    .ok_or_else(|| {
                        AuthzError::NotFound(format!(
                            "seed policy '{}' in org '{}'",
                            policy_name, group.org
                        ))
                    })?;
                repo.attach_policy(&group.id, policy_id).await?;
            }
        }

        for seed_resource in seed.proxy_resources {
            let mut resource = ProxyResource::new(
                seed_resource.org,
                seed_resource.name,
                seed_resource.urn,
                seed_resource.resource,
            );
            resource.path = seed_resource.path;
            repo.put_proxy_resource(resource).await?;
        }

        Ok(repo)
    }

    /// Number of times the proxy resource set has been read
    pub fn proxy_resource_reads(&self) -> u64 {
        self.proxy_resource_reads.load(Ordering::Relaxed)
    }

    /// Insert or replace a user; external ids are unique
    pub async fn put_user(&self, user: User) -> Result<User> {
        let mut inner = self.inner.write().await;
        let clash = inner
            .users
            .values()
            .any(|u| u.external_id == user.external_id && u.id != user.id);
        if clash {
            return Err(AuthzError::InvalidParameter(format!(
                "user with external id '{}' already exists",
                user.external_id
            )));
        }
        inner.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    /// Remove a user and all of its memberships
    pub async fn delete_user(&self, user_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.users.remove(user_id).is_none() {
            return Err(AuthzError::NotFound(format!("user '{}'", user_id)));
        }
        for members in inner.members.values_mut() {
            members.remove(user_id);
        }
        Ok(())
    }

    /// Insert or replace a group; names are unique per org
    pub async fn put_group(&self, group: Group) -> Result<Group> {
        let mut inner = self.inner.write().await;
        let clash = inner
            .groups
            .values()
            .any(|g| g.org == group.org && g.name == group.name && g.id != group.id);
        if clash {
            return Err(AuthzError::InvalidParameter(format!(
                "group '{}' already exists in org '{}'",
                group.name, group.org
            )));
        }
        inner.groups.insert(group.id.clone(), group.clone());
        Ok(group)
    }

    /// Remove a group together with its memberships and attachments
    pub async fn delete_group(&self, group_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.groups.remove(group_id).is_none() {
            return Err(AuthzError::NotFound(format!("group '{}'", group_id)));
        }
        inner.members.remove(group_id);
        inner.attachments.remove(group_id);
        Ok(())
    }

    /// Insert or replace a policy; statements are replaced wholesale
    pub async fn put_policy(&self, policy: Policy) -> Result<Policy> {
        policy.validate()?;
        let mut inner = self.inner.write().await;
        let clash = inner
            .policies
            .values()
            .any(|p| p.org == policy.org && p.name == policy.name && p.id != policy.id);
        if clash {
            return Err(AuthzError::InvalidParameter(format!(
                "policy '{}' already exists in org '{}'",
                policy.name, policy.org
            )));
        }
        inner.policies.insert(policy.id.clone(), policy.clone());
        Ok(policy)
    }

    /// Replace the statements of an existing policy
    pub async fn update_policy_statements(
        &self,
        policy_id: &str,
        statements: Vec<Statement>,
    ) -> Result<Policy> {
        let mut inner = self.inner.write().await;
        let policy = inner
            .policies
            .get_mut(policy_id)
            .ok_or_else(|| AuthzError::NotFound(format!("policy '{}'", policy_id)))?;
        let mut updated = policy.clone();
        updated.replace_statements(statements);
        updated.validate()?;
        *policy = updated.clone();
        Ok(updated)
    }

    /// Remove a policy and detach it from every group
    pub async fn delete_policy(&self, policy_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.policies.remove(policy_id).is_none() {
            return Err(AuthzError::NotFound(format!("policy '{}'", policy_id)));
        }
        let mut detached = 0usize;
        for attached in inner.attachments.values_mut() {
            if attached.remove(policy_id) {
                detached += 1;
            }
        }
        debug!(policy = policy_id, detached, "Deleted policy");
        Ok(())
    }

    pub async fn add_member(&self, group_id: &str, user_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.groups.contains_key(group_id) {
            return Err(AuthzError::NotFound(format!("group '{}'", group_id)));
        }
        if !inner.users.contains_key(user_id) {
            return Err(AuthzError::NotFound(format!("user '{}'", user_id)));
        }
        inner
            .members
            .entry(group_id.to_string())
            .or_default()
            .insert(user_id.to_string());
        Ok(())
    }

    pub async fn remove_member(&self, group_id: &str, user_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let removed = inner
            .members
            .get_mut(group_id)
            .map(|members| members.remove(user_id))
            .unwrap_or(false);
        if !removed {
            return Err(AuthzError::NotFound(format!(
                "user '{}' in group '{}'",
                user_id, group_id
            )));
        }
        Ok(())
    }

    /// Attach a policy to a group of the same org
    pub async fn attach_policy(&self, group_id: &str, policy_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let group_org = inner
            .groups
            .get(group_id)
            .map(|g| g.org.clone())
            .ok_or_else(|| AuthzError::NotFound(format!("group '{}'", group_id)))?;
        let policy_org = inner
            .policies
            .get(policy_id)
            .map(|p| p.org.clone())
            .ok_or_else(|| AuthzError::NotFound(format!("policy '{}'", policy_id)))?;
        if group_org != policy_org {
            return Err(AuthzError::InvalidParameter(format!(
                "policy org '{}' does not match group org '{}'",
                policy_org, group_org
            )));
        }
        inner
            .attachments
            .entry(group_id.to_string())
            .or_default()
            .insert(policy_id.to_string());
        Ok(())
    }

    pub async fn detach_policy(&self, group_id: &str, policy_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let removed = inner
            .attachments
            .get_mut(group_id)
            .map(|attached| attached.remove(policy_id))
            .unwrap_or(false);
        if !removed {
            return Err(AuthzError::NotFound(format!(
                "policy '{}' on group '{}'",
                policy_id, group_id
            )));
        }
        Ok(())
    }

    /// Insert or replace a proxy resource, keeping its position on replace
    pub async fn put_proxy_resource(&self, resource: ProxyResource) -> Result<ProxyResource> {
        resource.validate()?;
        let mut inner = self.inner.write().await;
        match inner.proxy_resources.iter_mut().find(|r| r.id == resource.id) {
            Some(existing) => *existing = resource.clone(),
            None => inner.proxy_resources.push(resource.clone()),
        }
        Ok(resource)
    }

    pub async fn delete_proxy_resource(&self, resource_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let before = inner.proxy_resources.len();
        inner.proxy_resources.retain(|r| r.id != resource_id);
        if inner.proxy_resources.len() == before {
            return Err(AuthzError::NotFound(format!("proxy resource '{}'", resource_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_user_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|u| u.external_id == external_id)
            .cloned())
    }

    async fn get_groups_for_user(&self, user_id: &str, org: Option<&str>) -> Result<Vec<Group>> {
        let inner = self.inner.read().await;
        let mut groups: Vec<Group> = inner
            .members
            .iter()
            .filter(|(_, members)| members.contains(user_id))
            .filter_map(|(group_id, _)| inner.groups.get(group_id))
            .filter(|g| org.map_or(true, |o| g.org == o))
            .cloned()
            .collect();
        groups.sort_by(|a, b| (&a.org, &a.name).cmp(&(&b.org, &b.name)));
        Ok(groups)
    }

    async fn get_policies_for_groups(&self, group_ids: &[GroupId]) -> Result<Vec<Policy>> {
        let inner = self.inner.read().await;
        let mut seen = HashSet::new();
        let mut policies = Vec::new();
        for group_id in group_ids {
            let Some(attached) = inner.attachments.get(group_id) else {
                continue;
            };
            for policy_id in attached {
                if !seen.insert(policy_id.as_str()) {
                    continue;
                }
                if let Some(policy) = inner.policies.get(policy_id) {
                    policies.push(policy.clone());
                }
            }
        }
        Ok(policies)
    }

    async fn get_proxy_resources(&self) -> Result<Vec<ProxyResource>> {
        self.proxy_resource_reads.fetch_add(1, Ordering::Relaxed);
        let inner = self.inner.read().await;
        Ok(inner.proxy_resources.clone())
    }
}

fn default_path() -> String {
    "/".to_string()
}

/// Seed document for [`MemoryRepository::from_seed`]
///
/// Groups reference members by external id and policies by name within the
/// group's org.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub users: Vec<SeedUser>,
    #[serde(default)]
    pub policies: Vec<SeedPolicy>,
    #[serde(default)]
    pub groups: Vec<SeedGroup>,
    #[serde(default)]
    pub proxy_resources: Vec<SeedProxyResource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedUser {
    pub external_id: String,
    #[serde(default = "default_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedPolicy {
    pub org: String,
    pub name: String,
    #[serde(default = "default_path")]
    pub path: String,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedGroup {
    pub org: String,
    pub name: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub policies: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedProxyResource {
    pub org: String,
    pub name: String,
    #[serde(default = "default_path")]
    pub path: String,
    pub urn: String,
    pub resource: ResourceEntity,
}

impl Seed {
    pub fn from_json_str(contents: &str) -> Result<Self> {
        serde_json::from_str(contents)
            .map_err(|e| AuthzError::InvalidParameter(format!("invalid seed json: {}", e)))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| AuthzError::InvalidParameter(format!("invalid seed toml: {}", e)))
    }

    /// Load a seed file; `.json` is parsed as JSON, anything else as TOML
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AuthzError::Internal(format!("failed to read seed file {}: {}", path.display(), e))
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            _ => Self::from_toml_str(&contents),
        }
    }
}
