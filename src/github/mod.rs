//! GitHub billing API
//!
//! The collectors depend on the [`BillingApi`] port only; [`GitHubClient`] is
//! the reqwest-backed adapter used in production.
//!
//! ```text
//! Collector ──▶ BillingApi ──▶ GitHubClient ──▶ api.github.com
//! ```

mod client;
mod types;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

pub use client::{GitHubClient, GitHubConfig};
pub use types::{
    ActionsBilling, MinutesUsedBreakdown, PackagesBilling, Repository, StorageBilling, Workflow,
    WorkflowBill, WorkflowBillMap, WorkflowList, WorkflowUsage,
};

/// Page size for repository and workflow listings
pub const PER_PAGE: u32 = 100;

/// Read-only access to the GitHub billing endpoints.
///
/// Implementations must be safe for concurrent use; every collector task
/// shares one handle.
#[async_trait]
pub trait BillingApi: Send + Sync {
    /// Actions minutes billing of an organization.
    async fn actions_billing(&self, cancel: &CancellationToken, org: &str)
        -> Result<ActionsBilling>;

    /// Packages bandwidth billing of an organization.
    async fn packages_billing(
        &self,
        cancel: &CancellationToken,
        org: &str,
    ) -> Result<PackagesBilling>;

    /// Shared storage billing of an organization.
    async fn storage_billing(&self, cancel: &CancellationToken, org: &str)
        -> Result<StorageBilling>;

    /// One page (1-based) of the organization's repositories.
    async fn list_repositories(
        &self,
        cancel: &CancellationToken,
        org: &str,
        page: u32,
    ) -> Result<Vec<Repository>>;

    /// One page (1-based) of a repository's workflows.
    async fn list_workflows(
        &self,
        cancel: &CancellationToken,
        org: &str,
        repo: &str,
        page: u32,
    ) -> Result<Vec<Workflow>>;

    /// Billable usage of one workflow in the current billing cycle.
    async fn workflow_usage(
        &self,
        cancel: &CancellationToken,
        org: &str,
        repo: &str,
        workflow_id: u64,
    ) -> Result<WorkflowUsage>;
}

/// Lists every repository of `org`, requesting pages until one comes back empty.
pub async fn list_all_repositories(
    api: &dyn BillingApi,
    cancel: &CancellationToken,
    org: &str,
) -> Result<Vec<Repository>> {
    let mut repositories = Vec::new();
    let mut page = 1;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let batch = api.list_repositories(cancel, org, page).await?;
        if batch.is_empty() {
            break;
        }
        repositories.extend(batch);
        page += 1;
    }

    Ok(repositories)
}

/// Lists every workflow of `org/repo`, requesting pages until one comes back empty.
pub async fn list_all_workflows(
    api: &dyn BillingApi,
    cancel: &CancellationToken,
    org: &str,
    repo: &str,
) -> Result<Vec<Workflow>> {
    let mut workflows = Vec::new();
    let mut page = 1;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let batch = api.list_workflows(cancel, org, repo, page).await?;
        if batch.is_empty() {
            break;
        }
        workflows.extend(batch);
        page += 1;
    }

    Ok(workflows)
}
