//! Immutable method + path-template → proxy resource mapping

use http::Method;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use warden_authz::ProxyResource;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid method '{0}'")]
    InvalidMethod(String),

    #[error("cannot register {method} '{path}': {source}")]
    Insert {
        method: Method,
        path: String,
        #[source]
        source: matchit::InsertError,
    },
}

impl RouteError {
    /// Another registered route already claims this template
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            RouteError::Insert {
                source: matchit::InsertError::Conflict { .. },
                ..
            }
        )
    }
}

/// Successful lookup: the resource plus the captured path parameters
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub resource: Arc<ProxyResource>,
    pub params: Vec<(String, String)>,
}

/// One generation of the proxy's routes
///
/// Built once by the refresh task and never mutated after publication.
#[derive(Default)]
pub struct RoutingTable {
    routes: HashMap<Method, matchit::Router<Arc<ProxyResource>>>,
    entries: Vec<Arc<ProxyResource>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one resource under its method and normalized route template
    ///
    /// A failed registration leaves the table exactly as it was.
    pub fn register(&mut self, resource: ProxyResource) -> Result<(), RouteError> {
        let method = parse_method(&resource.resource.method)?;
        let path = normalize_path(&resource.resource.path);
        let resource = Arc::new(resource);

        let mut router = self.routes.get(&method).cloned().unwrap_or_default();
        router
            .insert(path.clone(), Arc::clone(&resource))
            .map_err(|source| RouteError::Insert {
                method: method.clone(),
                path,
                source,
            })?;

        self.routes.insert(method, router);
        self.entries.push(resource);
        Ok(())
    }

    pub fn lookup(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        let router = self.routes.get(method)?;

        let matched = router.at(path).ok().or_else(|| {
            let trimmed = path.trim_end_matches('/');
            (trimmed.len() != path.len() && !trimmed.is_empty())
                .then(|| router.at(trimmed).ok())
                .flatten()
        })?;

        Some(RouteMatch {
            resource: Arc::clone(matched.value),
            params: matched
                .params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }

    /// Registered resources, in registration order
    pub fn resources(&self) -> impl Iterator<Item = &ProxyResource> {
        self.entries.iter().map(|r| r.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for RoutingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(
                self.entries
                    .iter()
                    .map(|r| format!("{} {}", r.resource.method, r.resource.path)),
            )
            .finish()
    }
}

fn parse_method(method: &str) -> Result<Method, RouteError> {
    Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| RouteError::InvalidMethod(method.to_string()))
}

/// Normalize a route template to the router's syntax
///
/// `:name` becomes `{name}`, `*name` becomes `{*name}`, duplicate slashes
/// collapse, the trailing slash is dropped and a leading slash is ensured.
pub fn normalize_path(template: &str) -> String {
    let segments: Vec<String> = template
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                format!("{{{}}}", name)
            } else if let Some(name) = segment.strip_prefix('*') {
                format!("{{*{}}}", name)
            } else {
                segment.to_string()
            }
        })
        .collect();

    format!("/{}", segments.join("/"))
}
