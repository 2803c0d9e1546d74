//! Decision engine counters and latency percentiles

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

const MAX_LATENCY_SAMPLES: usize = 10_000;
const SAMPLE_EVICTION: usize = 1_000;

/// Snapshot of engine activity
#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    /// Calls to `get_authorized_resources`
    pub total_requests: u64,

    /// Requests answered through the admin bypass
    pub admin_bypasses: u64,

    /// Candidate URNs accepted
    pub resources_allowed: u64,

    /// Candidate URNs rejected
    pub resources_denied: u64,

    /// Requests that failed (invalid parameter or repository failure)
    pub error_count: u64,

    pub avg_latency_ms: f64,
    pub latency_p50_ms: f64,
    pub latency_p99_ms: f64,
}

impl EngineMetrics {
    /// Share of evaluated candidates that were accepted
    pub fn allow_rate(&self) -> f64 {
        let total = self.resources_allowed + self.resources_denied;
        if total == 0 {
            0.0
        } else {
            self.resources_allowed as f64 / total as f64
        }
    }
}

/// Collector shared by every request going through the engine
pub struct MetricsCollector {
    metrics: Arc<RwLock<EngineMetrics>>,
    latency_samples: Arc<RwLock<Vec<f64>>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(EngineMetrics::default())),
            latency_samples: Arc::new(RwLock::new(Vec::with_capacity(MAX_LATENCY_SAMPLES))),
        }
    }

    pub async fn record_request(&self, admin: bool) {
        let mut metrics = self.metrics.write().await;
        metrics.total_requests += 1;
        if admin {
            metrics.admin_bypasses += 1;
        }
    }

    pub async fn record_outcome(&self, allowed: usize, denied: usize) {
        let mut metrics = self.metrics.write().await;
        metrics.resources_allowed += allowed as u64;
        metrics.resources_denied += denied as u64;
    }

    pub async fn record_error(&self) {
        let mut metrics = self.metrics.write().await;
        metrics.error_count += 1;
    }

    pub async fn record_latency(&self, latency: Duration) {
        let mut samples = self.latency_samples.write().await;
        samples.push(latency.as_secs_f64() * 1000.0);
        if samples.len() > MAX_LATENCY_SAMPLES {
            samples.drain(0..SAMPLE_EVICTION);
        }

        let mut sorted = samples.clone();
        drop(samples);
        sorted.sort_by(|a, b| a.total_cmp(b));

        let mut metrics = self.metrics.write().await;
        metrics.avg_latency_ms = sorted.iter().sum::<f64>() / sorted.len() as f64;
        metrics.latency_p50_ms = percentile(&sorted, 0.50);
        metrics.latency_p99_ms = percentile(&sorted, 0.99);
    }

    pub async fn get_metrics(&self) -> EngineMetrics {
        self.metrics.read().await.clone()
    }

    /// Render the current snapshot in Prometheus text format
    pub async fn export_prometheus(&self) -> String {
        let metrics = self.metrics.read().await;

        format!(
            r#"# HELP warden_authz_requests_total Authorization requests evaluated
# TYPE warden_authz_requests_total counter
warden_authz_requests_total {}

# HELP warden_authz_admin_bypass_total Requests answered by the admin bypass
# TYPE warden_authz_admin_bypass_total counter
warden_authz_admin_bypass_total {}

# HELP warden_authz_resources_allowed_total Candidate resources allowed
# TYPE warden_authz_resources_allowed_total counter
warden_authz_resources_allowed_total {}

# HELP warden_authz_resources_denied_total Candidate resources denied
# TYPE warden_authz_resources_denied_total counter
warden_authz_resources_denied_total {}

# HELP warden_authz_errors_total Failed authorization requests
# TYPE warden_authz_errors_total counter
warden_authz_errors_total {}

# HELP warden_authz_latency_seconds Authorization latency
# TYPE warden_authz_latency_seconds summary
warden_authz_latency_seconds{{quantile="0.5"}} {}
warden_authz_latency_seconds{{quantile="0.99"}} {}
"#,
            metrics.total_requests,
            metrics.admin_bypasses,
            metrics.resources_allowed,
            metrics.resources_denied,
            metrics.error_count,
            metrics.latency_p50_ms / 1000.0,
            metrics.latency_p99_ms / 1000.0,
        )
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64) * p) as usize;
    sorted[idx.min(sorted.len() - 1)]
}
