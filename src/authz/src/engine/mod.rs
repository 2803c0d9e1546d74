//! Authorization decision engine
//!
//! Given an authenticated caller, an action and a list of full candidate URNs,
//! returns the subset the caller may touch.
//!
//! ```text
//! validate → admin bypass → user → groups → policies (dedup) → statements
//!                                                                  ↓
//!                           per candidate: deny overrides allow, default deny
//! ```

pub mod decision;
pub mod metrics;

pub use decision::Decision;
pub use metrics::{EngineMetrics, MetricsCollector};

use crate::error::{AuthzError, Result};
use crate::model::{AuthenticatedUser, GroupId, Statement};
use crate::repository::Repository;
use crate::urn;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Collect counters and latency samples
    pub enable_metrics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
        }
    }
}

/// Decision engine over a concrete repository backend
pub struct AuthzEngine<R> {
    repository: Arc<R>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl<R: Repository> AuthzEngine<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self::with_config(repository, EngineConfig::default())
    }

    pub fn with_config(repository: Arc<R>, config: EngineConfig) -> Self {
        let metrics = config
            .enable_metrics
            .then(|| Arc::new(MetricsCollector::new()));
        Self {
            repository,
            metrics,
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Return the candidates `user` may perform `action` on, in input order
    ///
    /// An empty result is a normal outcome. Errors are raised only for
    /// malformed input (`InvalidParameter`) and repository failures
    /// (`Internal`).
    pub async fn get_authorized_resources(
        &self,
        user: &AuthenticatedUser,
        action: &str,
        candidates: &[String],
    ) -> Result<Vec<String>> {
        let start = Instant::now();
        let result = self.evaluate(user, action, candidates).await;

        if let Some(metrics) = &self.metrics {
            metrics.record_request(user.is_admin).await;
            match &result {
                Ok(allowed) => {
                    metrics
                        .record_outcome(allowed.len(), candidates.len() - allowed.len())
                        .await
                }
                Err(_) => metrics.record_error().await,
            }
            metrics.record_latency(start.elapsed()).await;
        }

        result
    }

    /// Single-resource convenience over [`Self::get_authorized_resources`]
    pub async fn is_authorized(
        &self,
        user: &AuthenticatedUser,
        action: &str,
        urn: &str,
    ) -> Result<bool> {
        let allowed = self
            .get_authorized_resources(user, action, &[urn.to_string()])
            .await?;
        Ok(!allowed.is_empty())
    }

    pub async fn get_metrics(&self) -> Option<EngineMetrics> {
        match &self.metrics {
            Some(metrics) => Some(metrics.get_metrics().await),
            None => None,
        }
    }

    pub async fn export_metrics(&self) -> Option<String> {
        match &self.metrics {
            Some(metrics) => Some(metrics.export_prometheus().await),
            None => None,
        }
    }

    async fn evaluate(
        &self,
        user: &AuthenticatedUser,
        action: &str,
        candidates: &[String],
    ) -> Result<Vec<String>> {
        validate_request(action, candidates)?;

        if user.is_admin {
            debug!(identity = %user.identity, action, "Admin bypass");
            return Ok(candidates.to_vec());
        }

        let statements = self.statements_for(user).await?;
        if statements.is_empty() {
            debug!(identity = %user.identity, "No statements reachable, denying all");
            return Ok(Vec::new());
        }

        let allowed: Vec<String> = candidates
            .iter()
            .filter(|candidate| {
                let decision = decision::evaluate(&statements, action, candidate);
                debug!(identity = %user.identity, action, urn = %candidate, ?decision, "Evaluated");
                decision.is_allowed()
            })
            .cloned()
            .collect();

        Ok(allowed)
    }

    /// Statements of every distinct policy reachable through the user's groups
    async fn statements_for(&self, user: &AuthenticatedUser) -> Result<Vec<Statement>> {
        let Some(record) = self
            .repository
            .get_user_by_external_id(&user.identity)
            .await?
        else {
            debug!(identity = %user.identity, "Unknown identity");
            return Ok(Vec::new());
        };

        let groups = self.repository.get_groups_for_user(&record.id, None).await?;
        if groups.is_empty() {
            return Ok(Vec::new());
        }

        let group_ids: Vec<GroupId> = groups.into_iter().map(|g| g.id).collect();
        let policies = self.repository.get_policies_for_groups(&group_ids).await?;

        let mut seen = HashSet::new();
        let statements = policies
            .into_iter()
            .filter(|policy| seen.insert(policy.id.clone()))
            .flat_map(|policy| policy.statements)
            .collect();

        Ok(statements)
    }
}

/// Authorization always targets a concrete action and full URNs
fn validate_request(action: &str, candidates: &[String]) -> Result<()> {
    if !urn::is_valid_action(action) || !urn::is_full_urn(action) {
        return Err(AuthzError::InvalidParameter(format!(
            "invalid action '{}'",
            action
        )));
    }

    for candidate in candidates {
        if !urn::is_full_urn(candidate) {
            return Err(AuthzError::InvalidParameter(format!(
                "resource '{}' is not a full urn",
                candidate
            )));
        }
        if !urn::is_valid_resource(candidate) {
            return Err(AuthzError::InvalidParameter(format!(
                "invalid resource '{}'",
                candidate
            )));
        }
    }

    Ok(())
}
