//! Actions minutes billing per organization
//!
//! Exposes `settings/billing/actions` as three gauges.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::descriptor::{Measurement, MetricDescriptor};
use super::org::{OrgCollector, OrgFetcher};
use super::{Collector, CollectorConfig};
use crate::error::Result;
use crate::github::{ActionsBilling, BillingApi};

pub(crate) struct ActionsFetcher {
    used_minutes: Arc<MetricDescriptor>,
    paid_minutes: Arc<MetricDescriptor>,
    included_minutes: Arc<MetricDescriptor>,
}

impl ActionsFetcher {
    fn new() -> Self {
        Self {
            used_minutes: MetricDescriptor::gauge(
                Self::SUBSYSTEM,
                "used_minutes",
                "Total GitHub actions used minutes",
                &["org"],
            ),
            paid_minutes: MetricDescriptor::gauge(
                Self::SUBSYSTEM,
                "paid_minutes",
                "Total GitHub actions paid minutes",
                &["org"],
            ),
            included_minutes: MetricDescriptor::gauge(
                Self::SUBSYSTEM,
                "included_minutes",
                "GitHub actions included minutes",
                &["org"],
            ),
        }
    }

    fn map(&self, org: &str, billing: &ActionsBilling) -> Result<Vec<Measurement>> {
        Ok(vec![
            self.used_minutes.measure(billing.total_minutes_used, &[org])?,
            self.paid_minutes.measure(billing.total_paid_minutes_used, &[org])?,
            self.included_minutes.measure(billing.included_minutes, &[org])?,
        ])
    }
}

#[async_trait]
impl OrgFetcher for ActionsFetcher {
    const SUBSYSTEM: &'static str = "actions";

    fn describe(&self) -> Vec<Arc<MetricDescriptor>> {
        vec![
            self.used_minutes.clone(),
            self.paid_minutes.clone(),
            self.included_minutes.clone(),
        ]
    }

    async fn fetch(
        &self,
        api: &dyn BillingApi,
        cancel: &CancellationToken,
        org: &str,
    ) -> Result<Vec<Measurement>> {
        let billing = api.actions_billing(cancel, org).await?;
        self.map(org, &billing)
    }
}

/// Create the `actions` collector
pub async fn new_collector(
    config: CollectorConfig,
    cancel: CancellationToken,
) -> Result<Arc<dyn Collector>> {
    OrgCollector::build(config, ActionsFetcher::new(), &cancel).await
}
