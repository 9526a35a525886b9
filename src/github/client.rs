//! reqwest-backed GitHub REST client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::types::{
    ActionsBilling, PackagesBilling, Repository, StorageBilling, Workflow, WorkflowList,
    WorkflowUsage,
};
use super::{BillingApi, PER_PAGE};
use crate::error::{Error, Result};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the GitHub client
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// API base URL
    pub api_url: String,

    /// Bearer token; requests are sent unauthenticated when absent
    pub token: Option<String>,

    /// Per-request timeout
    pub request_timeout: Duration,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// GitHub billing API client. Cheap to clone, connection pool is shared.
#[derive(Clone)]
pub struct GitHubClient {
    api_url: String,
    token: Option<String>,
    client: Client,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_url", &self.api_url)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl GitHubClient {
    /// Create a new GitHub client
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );

        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.filter(|t| !t.is_empty()),
            client,
        })
    }

    /// Base URL requests are sent to
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// GET `path` and decode the JSON body.
    ///
    /// The request is dropped (and the connection aborted) as soon as
    /// `cancel` fires.
    async fn get_json<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        path: &str,
        query: &[(&str, String)],
        org: &str,
        subsystem: &'static str,
    ) -> Result<T> {
        let url = format!("{}{}", self.api_url, path);
        debug!(%url, org, subsystem, "Querying GitHub");

        let mut request = self.client.get(&url).query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let transport = |source| Error::Transport {
            org: org.to_string(),
            subsystem,
            source,
        };

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = async {
                let response = request.send().await.map_err(transport)?;
                let status = response.status();
                if !status.is_success() {
                    return Err(Error::Status {
                        status,
                        org: org.to_string(),
                        subsystem,
                    });
                }
                response.bytes().await.map_err(transport)
            } => response?,
        };

        serde_json::from_slice(&body).map_err(|e| Error::Decode {
            org: org.to_string(),
            subsystem,
            reason: e.to_string(),
        })
    }
}

fn segment(value: &str) -> std::borrow::Cow<'_, str> {
    urlencoding::encode(value)
}

#[async_trait]
impl BillingApi for GitHubClient {
    #[instrument(skip(self, cancel))]
    async fn actions_billing(
        &self,
        cancel: &CancellationToken,
        org: &str,
    ) -> Result<ActionsBilling> {
        let path = format!("/orgs/{}/settings/billing/actions", segment(org));
        self.get_json(cancel, &path, &[], org, "billing/actions")
            .await
    }

    #[instrument(skip(self, cancel))]
    async fn packages_billing(
        &self,
        cancel: &CancellationToken,
        org: &str,
    ) -> Result<PackagesBilling> {
        let path = format!("/orgs/{}/settings/billing/packages", segment(org));
        self.get_json(cancel, &path, &[], org, "billing/packages")
            .await
    }

    #[instrument(skip(self, cancel))]
    async fn storage_billing(
        &self,
        cancel: &CancellationToken,
        org: &str,
    ) -> Result<StorageBilling> {
        let path = format!("/orgs/{}/settings/billing/shared-storage", segment(org));
        self.get_json(cancel, &path, &[], org, "billing/shared-storage")
            .await
    }

    #[instrument(skip(self, cancel))]
    async fn list_repositories(
        &self,
        cancel: &CancellationToken,
        org: &str,
        page: u32,
    ) -> Result<Vec<Repository>> {
        let path = format!("/orgs/{}/repos", segment(org));
        let query = [
            ("type", "all".to_string()),
            ("per_page", PER_PAGE.to_string()),
            ("page", page.to_string()),
        ];
        self.get_json(cancel, &path, &query, org, "repos").await
    }

    #[instrument(skip(self, cancel))]
    async fn list_workflows(
        &self,
        cancel: &CancellationToken,
        org: &str,
        repo: &str,
        page: u32,
    ) -> Result<Vec<Workflow>> {
        let path = format!(
            "/repos/{}/{}/actions/workflows",
            segment(org),
            segment(repo)
        );
        let query = [
            ("per_page", PER_PAGE.to_string()),
            ("page", page.to_string()),
        ];
        let list: WorkflowList = self
            .get_json(cancel, &path, &query, org, "workflows")
            .await?;
        Ok(list.workflows)
    }

    #[instrument(skip(self, cancel))]
    async fn workflow_usage(
        &self,
        cancel: &CancellationToken,
        org: &str,
        repo: &str,
        workflow_id: u64,
    ) -> Result<WorkflowUsage> {
        let path = format!(
            "/repos/{}/{}/actions/workflows/{}/timing",
            segment(org),
            segment(repo),
            workflow_id
        );
        self.get_json(cancel, &path, &[], org, "workflow_timing")
            .await
    }
}
