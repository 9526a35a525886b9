//! Packages bandwidth billing per organization: used totals as counters,
//! the plan's inclusive budget as gauge.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::descriptor::{Measurement, MetricDescriptor};
use super::org::{OrgCollector, OrgFetcher};
use super::{Collector, CollectorConfig};
use crate::error::Result;
use crate::github::BillingApi;

pub(crate) struct OrgPackagesFetcher {
    used_bandwidth_total: Arc<MetricDescriptor>,
    used_bandwidth_paid: Arc<MetricDescriptor>,
    inclusive_bandwidth: Arc<MetricDescriptor>,
}

impl OrgPackagesFetcher {
    fn new() -> Self {
        Self {
            used_bandwidth_total: MetricDescriptor::counter(
                Self::SUBSYSTEM,
                "bandwith_total_count",
                "GitHub packages total used bandwith in gigabytes",
                &["org"],
            ),
            used_bandwidth_paid: MetricDescriptor::counter(
                Self::SUBSYSTEM,
                "bandwith_paid_count",
                "GitHub packages paid used bandwith in gigabytes",
                &["org"],
            ),
            inclusive_bandwidth: MetricDescriptor::gauge(
                Self::SUBSYSTEM,
                "bandwith_inclusive",
                "GitHub packages inclusive budget bandwith in gigabytes",
                &["org"],
            ),
        }
    }
}

#[async_trait]
impl OrgFetcher for OrgPackagesFetcher {
    const SUBSYSTEM: &'static str = "packages_org";

    fn describe(&self) -> Vec<Arc<MetricDescriptor>> {
        vec![
            self.used_bandwidth_total.clone(),
            self.used_bandwidth_paid.clone(),
            self.inclusive_bandwidth.clone(),
        ]
    }

    async fn fetch(
        &self,
        api: &dyn BillingApi,
        cancel: &CancellationToken,
        org: &str,
    ) -> Result<Vec<Measurement>> {
        let billing = api.packages_billing(cancel, org).await?;
        Ok(vec![
            self.used_bandwidth_total
                .measure(billing.total_gigabytes_bandwidth_used, &[org])?,
            self.used_bandwidth_paid
                .measure(billing.total_paid_gigabytes_bandwidth_used, &[org])?,
            self.inclusive_bandwidth
                .measure(billing.included_gigabytes_bandwidth, &[org])?,
        ])
    }
}

/// Create the `packages_org` collector
pub async fn new_collector(
    config: CollectorConfig,
    cancel: CancellationToken,
) -> Result<Arc<dyn Collector>> {
    OrgCollector::build(config, OrgPackagesFetcher::new(), &cancel).await
}
