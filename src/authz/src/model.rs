//! Policy store model
//!
//! In-memory shape of users, groups, policies and proxy resources as delivered
//! by a [`Repository`](crate::repository::Repository). Group membership and
//! policy attachment are relations owned by the repository, not by these types.

use crate::error::{AuthzError, Result};
use crate::urn;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique user identifier
pub type UserId = String;

/// Unique group identifier
pub type GroupId = String;

/// Unique policy identifier
pub type PolicyId = String;

/// Unique proxy resource identifier
pub type ProxyResourceId = String;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Statement effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// Grant the matched actions on the matched resources
    Allow,
    /// Refuse the matched actions on the matched resources
    Deny,
}

/// Effect + action patterns + resource patterns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

impl Statement {
    pub fn new<A: AsRef<str>, R: AsRef<str>>(effect: Effect, actions: &[A], resources: &[R]) -> Self {
        Self {
            effect,
            actions: actions.iter().map(|a| a.as_ref().to_string()).collect(),
            resources: resources.iter().map(|r| r.as_ref().to_string()).collect(),
        }
    }

    pub fn allow<A: AsRef<str>, R: AsRef<str>>(actions: &[A], resources: &[R]) -> Self {
        Self::new(Effect::Allow, actions, resources)
    }

    pub fn deny<A: AsRef<str>, R: AsRef<str>>(actions: &[A], resources: &[R]) -> Self {
        Self::new(Effect::Deny, actions, resources)
    }

    /// A statement applies when one action pattern matches `action` and one
    /// resource pattern matches `urn`
    pub fn applies(&self, action: &str, urn: &str) -> bool {
        self.actions.iter().any(|p| urn::matches(p, action))
            && self.resources.iter().any(|p| urn::matches(p, urn))
    }

    /// Write-time validation of the action and resource patterns
    pub fn validate(&self) -> Result<()> {
        if self.actions.is_empty() {
            return Err(AuthzError::InvalidParameter(
                "statement must declare at least one action".to_string(),
            ));
        }
        if self.resources.is_empty() {
            return Err(AuthzError::InvalidParameter(
                "statement must declare at least one resource".to_string(),
            ));
        }
        urn::is_valid_actions(self.actions.as_slice())?;
        urn::is_valid_resources(self.resources.as_slice())
    }
}

/// Named, org-scoped collection of statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub org: String,
    pub name: String,
    pub path: String,
    pub statements: Vec<Statement>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Policy {
    pub fn new(
        org: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<String>,
        statements: Vec<Statement>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            org: org.into(),
            name: name.into(),
            path: path.into(),
            statements,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace all statements; policies are never partially patched
    pub fn replace_statements(&mut self, statements: Vec<Statement>) {
        self.statements = statements;
        self.updated_at = Utc::now();
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() || self.org.trim().is_empty() {
            return Err(AuthzError::InvalidParameter(
                "policy name and org must not be empty".to_string(),
            ));
        }
        if self.statements.is_empty() {
            return Err(AuthzError::InvalidParameter(format!(
                "policy '{}' has no statements",
                self.name
            )));
        }
        self.statements.iter().try_for_each(Statement::validate)
    }
}

/// Org-scoped set of users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub org: String,
    pub name: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    pub fn new(org: impl Into<String>, name: impl Into<String>, path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            org: org.into(),
            name: name.into(),
            path: path.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Persisted user, keyed by the identity the authenticator resolves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub external_id: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(external_id: impl Into<String>, path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            external_id: external_id.into(),
            path: path.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Caller identity resolved per request; never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub identity: String,
    pub is_admin: bool,
}

impl AuthenticatedUser {
    pub fn admin(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            is_admin: true,
        }
    }

    pub fn user(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            is_admin: false,
        }
    }
}

/// Backend half of a proxy resource: where and how it is reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntity {
    /// Backend base URL, e.g. `http://users.internal:8080`
    pub host: String,
    /// Route template, e.g. `/items/{id}`
    pub path: String,
    pub method: String,
    /// Action required to call this endpoint
    pub action: String,
}

/// Externally routable, authorization-guarded endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyResource {
    pub id: ProxyResourceId,
    pub org: String,
    pub name: String,
    pub path: String,
    /// URN template; may contain `{param}` placeholders bound from the route
    pub urn: String,
    pub resource: ResourceEntity,
}

impl ProxyResource {
    pub fn new(
        org: impl Into<String>,
        name: impl Into<String>,
        urn: impl Into<String>,
        resource: ResourceEntity,
    ) -> Self {
        Self {
            id: new_id(),
            org: org.into(),
            name: name.into(),
            path: "/".to_string(),
            urn: urn.into(),
            resource,
        }
    }

    /// Write-time validation of a proxy resource definition
    pub fn validate(&self) -> Result<()> {
        let entity = &self.resource;

        if http::Method::from_bytes(entity.method.to_ascii_uppercase().as_bytes()).is_err() {
            return Err(AuthzError::InvalidParameter(format!(
                "invalid method '{}'",
                entity.method
            )));
        }

        let host_ok = ["http://", "https://"]
            .iter()
            .any(|scheme| entity.host.len() > scheme.len() && entity.host.starts_with(scheme));
        if !host_ok {
            return Err(AuthzError::InvalidParameter(format!(
                "invalid host '{}'",
                entity.host
            )));
        }

        if entity.path.trim().is_empty() {
            return Err(AuthzError::InvalidParameter(
                "route path must not be empty".to_string(),
            ));
        }

        if !urn::is_valid_action(&entity.action) || !urn::is_full_urn(&entity.action) {
            return Err(AuthzError::InvalidParameter(format!(
                "invalid action '{}'",
                entity.action
            )));
        }

        let placeholders = urn_placeholders(&self.urn)?;
        let route = route_params(&entity.path);
        if let Some(missing) = placeholders.iter().find(|p| !route.contains(p)) {
            return Err(AuthzError::InvalidParameter(format!(
                "urn placeholder '{{{}}}' is not bound by route '{}'",
                missing, entity.path
            )));
        }

        let mut sample = self.urn.clone();
        for name in &placeholders {
            sample = sample.replace(&format!("{{{}}}", name), "x");
        }
        if !urn::is_valid_resource(&sample) {
            return Err(AuthzError::InvalidParameter(format!(
                "invalid urn template '{}'",
                self.urn
            )));
        }

        Ok(())
    }
}

/// Names of the `{param}` placeholders in a URN template
pub fn urn_placeholders(template: &str) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            AuthzError::InvalidParameter(format!("unbalanced placeholder in '{}'", template))
        })?;
        let name = &after[..close];
        if name.is_empty() || name.contains('{') {
            return Err(AuthzError::InvalidParameter(format!(
                "malformed placeholder in '{}'",
                template
            )));
        }
        names.push(name.to_string());
        rest = &after[close + 1..];
    }
    if rest.contains('}') {
        return Err(AuthzError::InvalidParameter(format!(
            "unbalanced placeholder in '{}'",
            template
        )));
    }
    Ok(names)
}

/// Parameter names bound by a route template
///
/// Understands `{name}`, `{*name}`, `:name` and `*name` segments.
pub fn route_params(template: &str) -> Vec<String> {
    template
        .split('/')
        .filter_map(|segment| {
            let name = if let Some(inner) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                inner.trim_start_matches('*')
            } else if let Some(name) = segment.strip_prefix(':') {
                name
            } else if let Some(name) = segment.strip_prefix('*') {
                name
            } else {
                return None;
            };
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}
