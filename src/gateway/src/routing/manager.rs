//! Routing table refresh and hot swap
//!
//! The active table sits behind an [`ArcSwap`]. Request handlers take one
//! snapshot per request; the refresh task builds a complete new table off to
//! the side and publishes it with a single pointer swap.

use super::table::{normalize_path, RoutingTable};
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use warden_authz::{ProxyResource, Repository, Result};

/// Cheap, cloneable read handle on the active routing table
#[derive(Clone)]
pub struct TableHandle {
    inner: Arc<ArcSwap<RoutingTable>>,
}

impl TableHandle {
    pub fn new(table: RoutingTable) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(table)),
        }
    }

    /// Table generation to use for the whole lifetime of one request
    pub fn snapshot(&self) -> Arc<RoutingTable> {
        self.inner.load_full()
    }

    fn publish(&self, table: RoutingTable) {
        self.inner.store(Arc::new(table));
    }
}

impl Default for TableHandle {
    fn default() -> Self {
        Self::new(RoutingTable::new())
    }
}

/// A resource left out of a rebuild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRoute {
    pub name: String,
    pub org: String,
    pub method: String,
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Resource set identical to the last one seen; nothing rebuilt
    Unchanged,
    /// A new table was published
    Rebuilt {
        registered: usize,
        skipped: Vec<SkippedRoute>,
    },
}

/// Keeps the routing table in step with the repository's proxy resources
pub struct RoutingTableManager<R> {
    repository: Arc<R>,
    table: TableHandle,
    last_seen: Mutex<Vec<ProxyResource>>,
}

impl<R: Repository> RoutingTableManager<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            table: TableHandle::default(),
            last_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn handle(&self) -> TableHandle {
        self.table.clone()
    }

    /// Fetch the resource set and rebuild the table if it changed
    ///
    /// Concurrent calls are serialized. On a repository failure the active
    /// table and the change-detection snapshot are left untouched.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let mut last_seen = self.last_seen.lock().await;

        let resources = self.repository.get_proxy_resources().await?;
        if *last_seen == resources {
            return Ok(RefreshOutcome::Unchanged);
        }

        let (table, skipped) = build_table(&resources);
        let registered = table.len();

        self.table.publish(table);
        *last_seen = resources;

        info!(
            registered,
            skipped = skipped.len(),
            "Routing table rebuilt"
        );

        Ok(RefreshOutcome::Rebuilt {
            registered,
            skipped,
        })
    }

    /// Run [`Self::refresh`] every `interval` until `shutdown` is cancelled
    pub fn spawn(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Routing table refresh stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        match self.refresh().await {
                            Ok(RefreshOutcome::Unchanged) => debug!("Routing table unchanged"),
                            Ok(RefreshOutcome::Rebuilt { .. }) => {}
                            Err(e) => error!(error = %e, "Routing table refresh failed, keeping previous table"),
                        }
                    }
                }
            }
        })
    }
}

/// Register every resource into a fresh table, skipping the ones that fail
fn build_table(resources: &[ProxyResource]) -> (RoutingTable, Vec<SkippedRoute>) {
    let mut table = RoutingTable::new();
    let mut skipped = Vec::new();

    for resource in resources {
        if let Err(e) = table.register(resource.clone()) {
            warn!(
                resource = %resource.name,
                org = %resource.org,
                method = %resource.resource.method,
                path = %resource.resource.path,
                error = %e,
                "Skipping proxy resource"
            );
            skipped.push(SkippedRoute {
                name: resource.name.clone(),
                org: resource.org.clone(),
                method: resource.resource.method.clone(),
                path: normalize_path(&resource.resource.path),
                reason: e.to_string(),
            });
        }
    }

    (table, skipped)
}
