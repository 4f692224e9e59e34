//! Shared fixtures for the end-to-end runner tests
//!
//! Every external system is an in-memory double. The tracker applies the same
//! transitions as the orchestrator, answering illegal ones with 409.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use slipway_client::testing::{
    InMemoryArtifacts, InMemoryPlatform, InMemorySourceHost, ScriptedBuildStatus, StaticFileSets,
};
use slipway_client::{ClientError, DeploymentExecutionInfo, Result};
use slipway_core::domain::bundle::{Bundle, BundleAsset, BundleModule, JS_MODULE_CONTENT_TYPE};
use slipway_core::domain::deployment::{
    Deployment, DeploymentFailure, DeploymentStatus, FailureKind,
};
use slipway_core::domain::environment::Environment;
use slipway_core::domain::file_set::FileSet;
use slipway_core::domain::identity::NamespaceConfig;
use slipway_core::domain::log::LogEntry;
use slipway_core::domain::tenant::Tenant;
use slipway_core::routing::{HostResolver, ReservedHostnames};
use slipway_edge::{EdgeState, create_router};
use slipway_runner::monitor::{BuildMonitor, MonitorConfig};
use slipway_runner::pipeline::Pipeline;
use slipway_runner::publish::{DEFAULT_SCRIPT_SIZE_LIMIT, Publisher, PublisherConfig};
use slipway_runner::repository::{DeploymentRepository, LogRepository};
use slipway_runner::scheduler::poller::{PollerSettings, ReportRetry};
use slipway_runner::sync::{DEFAULT_SYNC_ATTEMPTS, Synchronizer};

pub const APPS_DOMAIN: &str = "apps.test";

// =============================================================================
// Tracker
// =============================================================================

#[derive(Default)]
pub struct FakeTracker {
    deployments: Mutex<Vec<Deployment>>,
    tenants: Mutex<HashMap<String, Tenant>>,
    logs: Mutex<HashMap<Uuid, Vec<LogEntry>>>,
    /// Final reports still to be answered with 503
    failing_reports: AtomicU32,
    report_calls: AtomicU32,
    heartbeats: AtomicU32,
    log_delay: Mutex<Duration>,
}

impl FakeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tenant(&self, tenant: Tenant) {
        self.tenants.lock().unwrap().insert(tenant.id.clone(), tenant);
    }

    pub fn enqueue(&self, tenant_id: &str, version: &str, environment: Environment) -> Uuid {
        let deployment = Deployment::new(tenant_id, version, environment, None);
        let id = deployment.id;
        self.deployments.lock().unwrap().push(deployment);
        id
    }

    pub fn get(&self, id: Uuid) -> Deployment {
        self.deployments
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .expect("unknown deployment")
    }

    /// Cancels the attempt the way the orchestrator's cancel endpoint does
    pub fn cancel(&self, id: Uuid) {
        self.update(id, |d| d.mark_cancelled().map_err(|e| e.to_string()))
            .expect("attempt is not cancellable");
    }

    /// Fails the attempt the way the orchestrator's lease sweep does
    pub fn expire_lease(&self, id: Uuid) {
        self.update(id, |d| {
            d.mark_failed(DeploymentFailure::new(FailureKind::Timeout, "no heartbeat"))
                .map_err(|e| e.to_string())
        })
        .expect("attempt is not claimed");
    }

    pub fn logs(&self, id: Uuid) -> Vec<LogEntry> {
        self.logs.lock().unwrap().get(&id).cloned().unwrap_or_default()
    }

    /// Answers the next `n` final reports with a 503
    pub fn fail_next_reports(&self, n: u32) {
        self.failing_reports.store(n, Ordering::SeqCst);
    }

    pub fn report_calls(&self) -> u32 {
        self.report_calls.load(Ordering::SeqCst)
    }

    pub fn heartbeats(&self) -> u32 {
        self.heartbeats.load(Ordering::SeqCst)
    }

    /// Makes every log delivery take `delay`
    pub fn slow_log_delivery(&self, delay: Duration) {
        *self.log_delay.lock().unwrap() = delay;
    }

    fn report_outage(&self) -> Result<()> {
        self.report_calls.fetch_add(1, Ordering::SeqCst);
        let outage = self
            .failing_reports
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if outage {
            return Err(ClientError::api_error(503, "orchestrator unavailable"));
        }
        Ok(())
    }

    fn update<T>(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut Deployment) -> std::result::Result<T, String>,
    ) -> Result<T> {
        let mut deployments = self.deployments.lock().unwrap();
        let deployment = deployments
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| ClientError::api_error(404, format!("deployment {} not found", id)))?;
        apply(deployment).map_err(|e| ClientError::api_error(409, e))
    }
}

#[async_trait]
impl DeploymentRepository for FakeTracker {
    async fn fetch_pending(&self) -> Result<Vec<Deployment>> {
        Ok(self
            .deployments
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.status == DeploymentStatus::Pending)
            .cloned()
            .collect())
    }

    async fn claim(&self, id: Uuid) -> Result<DeploymentExecutionInfo> {
        let entry = self.update(id, |d| {
            d.mark_building("test-runner").map_err(|e| e.to_string())
        })?;
        self.logs.lock().unwrap().entry(id).or_default().push(entry);

        let deployment = self.get(id);
        let tenant = self
            .tenants
            .lock()
            .unwrap()
            .get(&deployment.tenant_id)
            .cloned()
            .ok_or_else(|| ClientError::api_error(404, "tenant not found"))?;

        Ok(DeploymentExecutionInfo { deployment, tenant })
    }

    async fn record_commit(&self, id: Uuid, commit_sha: &str) -> Result<()> {
        self.update(id, |d| {
            d.commit_sha = Some(commit_sha.to_string());
            Ok(())
        })
    }

    async fn mark_deploying(&self, id: Uuid) -> Result<()> {
        self.update(id, |d| d.mark_deploying().map_err(|e| e.to_string()))
    }

    async fn complete_success(&self, id: Uuid, url: &str) -> Result<()> {
        self.report_outage()?;
        self.update(id, |d| d.mark_success(url).map_err(|e| e.to_string()))
    }

    async fn complete_failed(&self, id: Uuid, failure: DeploymentFailure) -> Result<()> {
        self.report_outage()?;
        self.update(id, |d| d.mark_failed(failure).map_err(|e| e.to_string()))
    }

    async fn heartbeat(&self, id: Uuid) -> Result<DeploymentStatus> {
        self.heartbeats.fetch_add(1, Ordering::SeqCst);
        self.update(id, |d| {
            if d.is_claimed() {
                d.heartbeat(Utc::now()).map_err(|e| e.to_string())?;
            }
            Ok(d.status)
        })
    }
}

#[async_trait]
impl LogRepository for FakeTracker {
    async fn send_logs(&self, deployment_id: Uuid, entries: Vec<LogEntry>) -> Result<()> {
        let delay = *self.log_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.logs
            .lock()
            .unwrap()
            .entry(deployment_id)
            .or_default()
            .extend(entries);
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Tenant whose repository access settled long ago, so no grace period applies
pub fn tenant(id: &str, subdomain: &str) -> Tenant {
    let long_ago = Utc::now() - chrono::Duration::days(1);
    Tenant {
        id: id.to_string(),
        subdomain: subdomain.to_string(),
        repository: format!("tenants/{}", subdomain),
        repository_permissions_changed_at: long_ago,
        created_at: long_ago,
    }
}

pub fn files(n: usize, version: &str) -> FileSet {
    (0..n)
        .map(|i| {
            (
                format!("src/page_{i}.tsx"),
                format!("export const page = {i}; // {version}\n"),
            )
        })
        .collect()
}

pub fn bundle(code: &str) -> Bundle {
    Bundle {
        entry_module: "index.js".to_string(),
        modules: vec![BundleModule {
            name: "index.js".to_string(),
            content_type: JS_MODULE_CONTENT_TYPE.to_string(),
            content: code.as_bytes().to_vec(),
        }],
        assets: vec![],
    }
}

/// Bundle carrying one `size`-byte asset filled with `fill`
pub fn bundle_with_asset(code: &str, fill: u8, size: usize) -> Bundle {
    Bundle {
        assets: vec![BundleAsset {
            path: "img/hero.png".to_string(),
            content_type: "image/png".to_string(),
            content: vec![fill; size],
        }],
        ..bundle(code)
    }
}

/// Real-time but tiny polling policy
pub fn fast_monitor() -> MonitorConfig {
    MonitorConfig {
        timeout: Duration::from_secs(10),
        poll_interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(5),
        max_attempts: 5_000,
        grace_period: Duration::ZERO,
        recency_window: Duration::from_secs(60),
    }
}

pub fn poller_settings(workspace_base: &Path, max_parallel: usize) -> PollerSettings {
    PollerSettings {
        poll_interval: Duration::from_millis(5),
        log_send_interval: Duration::from_millis(5),
        cancel_check_interval: Duration::from_millis(5),
        max_parallel_deployments: max_parallel,
        workspace_base: workspace_base.to_path_buf(),
        report_retry: ReportRetry {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        },
    }
}

/// Every external system of one deployment environment
pub struct Harness {
    pub source: Arc<InMemorySourceHost>,
    pub files: Arc<StaticFileSets>,
    pub artifacts: Arc<InMemoryArtifacts>,
    pub platform: Arc<InMemoryPlatform>,
    pub tracker: Arc<FakeTracker>,
    pub script_size_limit: usize,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            source: Arc::new(InMemorySourceHost::new()),
            files: Arc::new(StaticFileSets::new()),
            artifacts: Arc::new(InMemoryArtifacts::new()),
            platform: Arc::new(InMemoryPlatform::new()),
            tracker: Arc::new(FakeTracker::new()),
            script_size_limit: DEFAULT_SCRIPT_SIZE_LIMIT,
        }
    }

    /// Harness whose publisher offloads anything over `limit` bytes
    pub fn with_script_size_limit(limit: usize) -> Self {
        Self {
            script_size_limit: limit,
            ..Self::new()
        }
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            apps_domain: APPS_DOMAIN.to_string(),
            assets_public_url: "https://assets.apps.test".to_string(),
            script_size_limit: self.script_size_limit,
            ..PublisherConfig::default()
        }
    }

    /// Pipeline whose builds report what `builds` scripts
    pub fn pipeline(&self, builds: Arc<ScriptedBuildStatus>) -> Pipeline {
        Pipeline::new(
            self.files.clone(),
            Synchronizer::new(self.source.clone(), DEFAULT_SYNC_ATTEMPTS),
            BuildMonitor::new(builds, fast_monitor()),
            self.artifacts.clone(),
            Publisher::new(self.platform.clone(), self.publisher_config()),
            self.tracker.clone(),
        )
    }

    /// Edge router serving whatever the platform holds
    pub fn edge(&self) -> axum::Router {
        let resolver = HostResolver::new(
            APPS_DOMAIN,
            NamespaceConfig::default(),
            ReservedHostnames::new([APPS_DOMAIN, "www.apps.test"]),
        );
        create_router(EdgeState::new(resolver, self.platform.clone(), 1024 * 1024))
    }
}
