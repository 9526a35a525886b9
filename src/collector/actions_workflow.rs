//! Actions minutes per workflow
//!
//! The working set is discovered by listing every repository of every
//! organization and every workflow of each repository. Listing happens on
//! reload only; updates query the timing endpoint of each known workflow.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use parking_lot::RwLock;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::descriptor::{Measurement, MeasurementSink, MetricDescriptor};
use super::org::fan_out;
use super::platform::{ms_to_minutes, PlatformValues};
use super::{Collector, CollectorConfig};
use crate::error::{Error, Result};
use crate::github::{
    list_all_repositories, list_all_workflows, BillingApi, WorkflowBill, WorkflowUsage,
};

const SUBSYSTEM: &str = "actions_workflow";

/// Workflow whose usage is queried on every update
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkflowTarget {
    pub repository: String,
    pub workflow_name: String,
    pub workflow_id: u64,
}

/// Organization to its sorted workflows
type WorkingSet = BTreeMap<String, Vec<WorkflowTarget>>;

pub(crate) struct WorkflowActionsCollector {
    config: CollectorConfig,
    used_minutes_real: Arc<MetricDescriptor>,
    used_minutes_billed: Arc<MetricDescriptor>,
    targets: RwLock<Arc<WorkingSet>>,
}

impl WorkflowActionsCollector {
    fn new(config: CollectorConfig) -> Self {
        let labels = ["org", "repository", "workflow_name", "workflow_id", "platform"];
        Self {
            config,
            used_minutes_real: MetricDescriptor::counter(
                SUBSYSTEM,
                "minutes_real_count",
                "GitHub actions used minutes without platform multiplier",
                &labels,
            ),
            used_minutes_billed: MetricDescriptor::counter(
                SUBSYSTEM,
                "minutes_billed_count",
                "GitHub actions used minutes with platform multipliers",
                &labels,
            ),
            targets: RwLock::new(Arc::new(WorkingSet::new())),
        }
    }

    pub(crate) fn working_set(&self) -> Arc<WorkingSet> {
        self.targets.read().clone()
    }
}

/// List the workflows of every repository of `org`, one task per repository.
async fn discover_org(
    api: Arc<dyn BillingApi>,
    cancel: CancellationToken,
    org: String,
) -> Result<(String, Vec<WorkflowTarget>)> {
    let repositories = list_all_repositories(api.as_ref(), &cancel, &org).await?;
    let repository_count = repositories.len();

    let mut tasks = JoinSet::new();
    for repository in repositories {
        let api = api.clone();
        let cancel = cancel.clone();
        let org = org.clone();
        tasks.spawn(async move {
            let workflows = list_all_workflows(api.as_ref(), &cancel, &org, &repository.name).await?;
            Ok::<_, Error>((repository.name, workflows))
        });
    }

    let mut targets = BTreeSet::new();
    while let Some(joined) = tasks.join_next().await {
        let (repository, workflows) = joined
            .map_err(|e| Error::Internal(format!("workflow listing task failed: {}", e)))??;
        targets.extend(workflows.into_iter().map(|workflow| WorkflowTarget {
            repository: repository.clone(),
            workflow_name: workflow.name,
            workflow_id: workflow.id,
        }));
    }

    debug!(
        collector = SUBSYSTEM,
        org = %org,
        repositories = repository_count,
        workflows = targets.len(),
        "Discovered workflows"
    );
    Ok((org, targets.into_iter().collect()))
}

/// Real minutes per platform; platforms without usage count as zero.
pub(crate) fn workflow_minutes(usage: &WorkflowUsage) -> PlatformValues {
    let minutes = |bill: &Option<WorkflowBill>| {
        bill.as_ref().map_or(0.0, |b| ms_to_minutes(b.total_ms))
    };
    PlatformValues {
        linux: minutes(&usage.billable.ubuntu),
        macos: minutes(&usage.billable.macos),
        windows: minutes(&usage.billable.windows),
    }
}

async fn fetch_org(
    api: Arc<dyn BillingApi>,
    cancel: CancellationToken,
    org: String,
    targets: Vec<WorkflowTarget>,
    used_minutes_real: Arc<MetricDescriptor>,
    used_minutes_billed: Arc<MetricDescriptor>,
) -> Result<Vec<Measurement>> {
    let usages = try_join_all(targets.iter().map(|target| {
        api.workflow_usage(&cancel, &org, &target.repository, target.workflow_id)
    }))
    .await?;

    let mut measurements = Vec::with_capacity(targets.len() * 6);
    for (target, usage) in targets.iter().zip(usages) {
        let real = workflow_minutes(&usage);
        let billed = real.map(|platform, value| platform.billed_minutes(value));
        let workflow_id = target.workflow_id.to_string();
        let labels = [
            org.as_str(),
            target.repository.as_str(),
            target.workflow_name.as_str(),
            workflow_id.as_str(),
        ];
        measurements.extend(real.measurements(&used_minutes_real, &labels)?);
        measurements.extend(billed.measurements(&used_minutes_billed, &labels)?);
    }
    Ok(measurements)
}

#[async_trait]
impl Collector for WorkflowActionsCollector {
    fn describe(&self) -> Vec<Arc<MetricDescriptor>> {
        vec![self.used_minutes_real.clone(), self.used_minutes_billed.clone()]
    }

    async fn reload(&self, cancel: &CancellationToken) -> Result<()> {
        let discoveries = self
            .config
            .orgs
            .iter()
            .map(|org| discover_org(self.config.api.clone(), cancel.clone(), org.clone()));
        let working_set: WorkingSet = try_join_all(discoveries).await?.into_iter().collect();

        let workflows: usize = working_set.values().map(Vec::len).sum();
        *self.targets.write() = Arc::new(working_set);
        info!(collector = SUBSYSTEM, workflows, "Workflow working set reloaded");
        Ok(())
    }

    async fn update(&self, cancel: &CancellationToken, sink: &MeasurementSink) -> Result<()> {
        let working_set = self.working_set();
        let fetches = working_set.iter().map(|(org, targets)| {
            let task = fetch_org(
                self.config.api.clone(),
                cancel.clone(),
                org.clone(),
                targets.clone(),
                self.used_minutes_real.clone(),
                self.used_minutes_billed.clone(),
            );
            (org.clone(), task)
        });

        fan_out(SUBSYSTEM, sink, fetches).await
    }
}

/// Create the `actions_workflow` collector, discovering workflows up front
pub async fn new_collector(
    config: CollectorConfig,
    cancel: CancellationToken,
) -> Result<Arc<dyn Collector>> {
    let collector = WorkflowActionsCollector::new(config);
    collector.reload(&cancel).await?;
    Ok(Arc::new(collector))
}
