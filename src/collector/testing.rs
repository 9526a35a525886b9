//! In-memory `BillingApi` for collector tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use super::descriptor::{MeasurementSink, Snapshot};
use super::{Collector, CollectorConfig};
use crate::error::{Error, Result};
use crate::github::{
    ActionsBilling, BillingApi, PackagesBilling, Repository, StorageBilling, Workflow,
    WorkflowUsage, PER_PAGE,
};

/// Scripted GitHub. Unknown organizations answer 404, organizations marked
/// failing for an endpoint answer 500.
#[derive(Default)]
pub(crate) struct FakeBillingApi {
    actions: HashMap<String, ActionsBilling>,
    packages: HashMap<String, PackagesBilling>,
    storage: HashMap<String, StorageBilling>,
    repositories: Mutex<HashMap<String, Vec<Repository>>>,
    workflows: HashMap<(String, String), Vec<Workflow>>,
    usage: HashMap<(String, String, u64), WorkflowUsage>,
    failing: Mutex<HashSet<(&'static str, String)>>,
    max_latency: Duration,
    calls: AtomicUsize,
}

impl FakeBillingApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_actions(mut self, org: &str, billing: ActionsBilling) -> Self {
        self.actions.insert(org.to_string(), billing);
        self
    }

    pub(crate) fn with_packages(mut self, org: &str, billing: PackagesBilling) -> Self {
        self.packages.insert(org.to_string(), billing);
        self
    }

    pub(crate) fn with_storage(mut self, org: &str, billing: StorageBilling) -> Self {
        self.storage.insert(org.to_string(), billing);
        self
    }

    /// Add a repository with its workflows
    pub(crate) fn with_repository(mut self, org: &str, repo: &str, workflows: &[(u64, &str)]) -> Self {
        {
            let mut repositories = self.repositories.lock();
            let entry = repositories.entry(org.to_string()).or_default();
            let id = entry.len() as u64 + 1;
            entry.push(Repository {
                id,
                name: repo.to_string(),
            });
        }
        self.workflows.insert(
            (org.to_string(), repo.to_string()),
            workflows
                .iter()
                .map(|(id, name)| Workflow {
                    id: *id,
                    name: name.to_string(),
                })
                .collect(),
        );
        self
    }

    pub(crate) fn with_usage(mut self, org: &str, repo: &str, workflow_id: u64, usage: WorkflowUsage) -> Self {
        self.usage
            .insert((org.to_string(), repo.to_string(), workflow_id), usage);
        self
    }

    pub(crate) fn with_latency(mut self, max_latency: Duration) -> Self {
        self.max_latency = max_latency;
        self
    }

    /// Make `endpoint` fail for `org`. Endpoints: actions, packages, storage,
    /// repos, workflows, usage.
    pub(crate) fn failing(self, endpoint: &'static str, org: &str) -> Self {
        self.set_failing(endpoint, org, true);
        self
    }

    pub(crate) fn set_failing(&self, endpoint: &'static str, org: &str, failing: bool) {
        let mut set = self.failing.lock();
        if failing {
            set.insert((endpoint, org.to_string()));
        } else {
            set.remove(&(endpoint, org.to_string()));
        }
    }

    pub(crate) fn remove_repositories(&self, org: &str) {
        self.repositories.lock().remove(org);
    }

    /// Requests served, not counting ones refused after cancellation
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn config(self, orgs: &[&str]) -> CollectorConfig {
        Self::shared_config(Arc::new(self), orgs)
    }

    pub(crate) fn shared_config(api: Arc<Self>, orgs: &[&str]) -> CollectorConfig {
        CollectorConfig::new(api, orgs.iter().map(|o| o.to_string()).collect())
    }

    async fn call(&self, cancel: &CancellationToken, endpoint: &'static str, org: &str) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.max_latency.is_zero() {
            let millis = rand::thread_rng().gen_range(0..=self.max_latency.as_millis() as u64);
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(millis)) => {}
            }
        }

        if self.failing.lock().contains(&(endpoint, org.to_string())) {
            return Err(Error::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                org: org.to_string(),
                subsystem: endpoint,
            });
        }
        Ok(())
    }

    fn not_found(endpoint: &'static str, org: &str) -> Error {
        Error::Status {
            status: StatusCode::NOT_FOUND,
            org: org.to_string(),
            subsystem: endpoint,
        }
    }
}

fn page<T: Clone>(items: &[T], page: u32) -> Vec<T> {
    items
        .chunks(PER_PAGE as usize)
        .nth(page as usize - 1)
        .map(<[T]>::to_vec)
        .unwrap_or_default()
}

#[async_trait]
impl BillingApi for FakeBillingApi {
    async fn actions_billing(&self, cancel: &CancellationToken, org: &str) -> Result<ActionsBilling> {
        self.call(cancel, "actions", org).await?;
        self.actions
            .get(org)
            .cloned()
            .ok_or_else(|| Self::not_found("actions", org))
    }

    async fn packages_billing(&self, cancel: &CancellationToken, org: &str) -> Result<PackagesBilling> {
        self.call(cancel, "packages", org).await?;
        self.packages
            .get(org)
            .cloned()
            .ok_or_else(|| Self::not_found("packages", org))
    }

    async fn storage_billing(&self, cancel: &CancellationToken, org: &str) -> Result<StorageBilling> {
        self.call(cancel, "storage", org).await?;
        self.storage
            .get(org)
            .cloned()
            .ok_or_else(|| Self::not_found("storage", org))
    }

    async fn list_repositories(
        &self,
        cancel: &CancellationToken,
        org: &str,
        page_number: u32,
    ) -> Result<Vec<Repository>> {
        self.call(cancel, "repos", org).await?;
        Ok(self
            .repositories
            .lock()
            .get(org)
            .map(|repos| page(repos, page_number))
            .unwrap_or_default())
    }

    async fn list_workflows(
        &self,
        cancel: &CancellationToken,
        org: &str,
        repo: &str,
        page_number: u32,
    ) -> Result<Vec<Workflow>> {
        self.call(cancel, "workflows", org).await?;
        Ok(self
            .workflows
            .get(&(org.to_string(), repo.to_string()))
            .map(|workflows| page(workflows, page_number))
            .unwrap_or_default())
    }

    async fn workflow_usage(
        &self,
        cancel: &CancellationToken,
        org: &str,
        repo: &str,
        workflow_id: u64,
    ) -> Result<WorkflowUsage> {
        self.call(cancel, "usage", org).await?;
        self.usage
            .get(&(org.to_string(), repo.to_string(), workflow_id))
            .cloned()
            .ok_or_else(|| Self::not_found("usage", org))
    }
}

/// Run one `update` and collect what it emitted.
pub(crate) async fn collect_once(collector: &dyn Collector) -> (Result<()>, Snapshot) {
    let (sink, mut rx) = MeasurementSink::channel();
    let result = collector.update(&CancellationToken::new(), &sink).await;
    drop(sink);
    (result, Snapshot::drain(&mut rx))
}
