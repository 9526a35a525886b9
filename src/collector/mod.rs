//! Billing collectors
//!
//! Each sub-collector covers one GitHub billing subsystem and fans out one
//! task per configured organization. The [`BillingCollector`] runs all of them
//! in parallel for every scrape and merges their output into one [`Snapshot`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        BillingCollector                          │
//! │   collect() ──┬──▶ actions ─────────┬──▶ org 1 ─┐                │
//! │               ├──▶ packages         ├──▶ org 2 ─┼──▶ BillingApi  │
//! │               ├──▶ actions_org      └──▶ org N ─┘                │
//! │               ├──▶ actions_workflow                              │
//! │               ├──▶ packages_org                                  │
//! │               └──▶ storage_org                                   │
//! │                        │                                         │
//! │        MeasurementSink ▼  + collector_up{collector}              │
//! │                     Snapshot ──▶ text exposition                 │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

mod actions;
mod actions_org;
mod actions_workflow;
mod aggregator;
mod descriptor;
mod org;
mod packages;
mod packages_org;
mod platform;
mod registry;
mod storage;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::github::BillingApi;

pub use actions_workflow::WorkflowTarget;
pub use aggregator::BillingCollector;
pub use descriptor::{
    Measurement, MeasurementSink, MetricDescriptor, Snapshot, ValueKind, NAMESPACE,
};
pub use platform::{ms_to_minutes, Platform, PlatformValues, MS_PER_MINUTE};
pub use registry::{CollectorFactory, CollectorRegistry};

/// A sub-collector: one billing subsystem across all organizations.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Descriptors of every metric this collector can emit.
    fn describe(&self) -> Vec<Arc<MetricDescriptor>>;

    /// Rebuild the working set. Keeps the previous one on failure.
    async fn reload(&self, cancel: &CancellationToken) -> Result<()>;

    /// Fetch every organization of the working set and send the resulting
    /// measurements to `sink`. Returns the first organization error.
    async fn update(&self, cancel: &CancellationToken, sink: &MeasurementSink) -> Result<()>;
}

/// Shared, read-only inputs of every collector
#[derive(Clone)]
pub struct CollectorConfig {
    /// GitHub API handle
    pub api: Arc<dyn BillingApi>,

    /// Organizations to query
    pub orgs: Arc<[String]>,
}

impl CollectorConfig {
    pub fn new(api: Arc<dyn BillingApi>, orgs: Vec<String>) -> Self {
        Self {
            api,
            orgs: orgs.into(),
        }
    }
}

impl std::fmt::Debug for CollectorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorConfig")
            .field("orgs", &self.orgs)
            .finish_non_exhaustive()
    }
}
