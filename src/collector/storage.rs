//! Shared storage billing per organization (`storage_org`)

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::descriptor::{Measurement, MetricDescriptor};
use super::org::{OrgCollector, OrgFetcher};
use super::{Collector, CollectorConfig};
use crate::error::Result;
use crate::github::BillingApi;

pub(crate) struct OrgStorageFetcher {
    billing_cycle_days: Arc<MetricDescriptor>,
    used_storage_paid: Arc<MetricDescriptor>,
    used_storage_total: Arc<MetricDescriptor>,
}

impl OrgStorageFetcher {
    fn new() -> Self {
        Self {
            billing_cycle_days: MetricDescriptor::gauge(
                Self::SUBSYSTEM,
                "billing_cycle_days",
                "Days left in the current billing cycle",
                &["org"],
            ),
            used_storage_paid: MetricDescriptor::counter(
                Self::SUBSYSTEM,
                "paid_count",
                "GitHub storage used paid in gigabytes",
                &["org"],
            ),
            used_storage_total: MetricDescriptor::counter(
                Self::SUBSYSTEM,
                "total_count",
                "GitHub storage used total in gigabytes",
                &["org"],
            ),
        }
    }
}

#[async_trait]
impl OrgFetcher for OrgStorageFetcher {
    const SUBSYSTEM: &'static str = "storage_org";

    fn describe(&self) -> Vec<Arc<MetricDescriptor>> {
        vec![
            self.billing_cycle_days.clone(),
            self.used_storage_paid.clone(),
            self.used_storage_total.clone(),
        ]
    }

    async fn fetch(
        &self,
        api: &dyn BillingApi,
        cancel: &CancellationToken,
        org: &str,
    ) -> Result<Vec<Measurement>> {
        let billing = api.storage_billing(cancel, org).await?;
        Ok(vec![
            self.billing_cycle_days
                .measure(billing.days_left_in_billing_cycle, &[org])?,
            self.used_storage_paid
                .measure(billing.estimated_paid_storage_for_month, &[org])?,
            self.used_storage_total
                .measure(billing.estimated_storage_for_month, &[org])?,
        ])
    }
}

/// Create the `storage_org` collector
pub async fn new_collector(
    config: CollectorConfig,
    cancel: CancellationToken,
) -> Result<Arc<dyn Collector>> {
    OrgCollector::build(config, OrgStorageFetcher::new(), &cancel).await
}
