//! Packages bandwidth billing per organization, as gauges

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::descriptor::{Measurement, MetricDescriptor};
use super::org::{OrgCollector, OrgFetcher};
use super::{Collector, CollectorConfig};
use crate::error::Result;
use crate::github::BillingApi;

pub(crate) struct PackagesFetcher {
    total_bandwidth: Arc<MetricDescriptor>,
    paid_bandwidth: Arc<MetricDescriptor>,
    included_bandwidth: Arc<MetricDescriptor>,
}

impl PackagesFetcher {
    fn new() -> Self {
        Self {
            total_bandwidth: MetricDescriptor::gauge(
                Self::SUBSYSTEM,
                "total_gigabytes_bandwidth",
                "Total GitHub packages bandwidth used in gigabytes",
                &["org"],
            ),
            paid_bandwidth: MetricDescriptor::gauge(
                Self::SUBSYSTEM,
                "paid_gigabytes_bandwidth",
                "Paid GitHub packages bandwidth used in gigabytes",
                &["org"],
            ),
            included_bandwidth: MetricDescriptor::gauge(
                Self::SUBSYSTEM,
                "included_gigabytes_bandwidth",
                "GitHub packages bandwidth included in the plan in gigabytes",
                &["org"],
            ),
        }
    }
}

#[async_trait]
impl OrgFetcher for PackagesFetcher {
    const SUBSYSTEM: &'static str = "packages";

    fn describe(&self) -> Vec<Arc<MetricDescriptor>> {
        vec![
            self.total_bandwidth.clone(),
            self.paid_bandwidth.clone(),
            self.included_bandwidth.clone(),
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
            self.total_bandwidth
                .measure(billing.total_gigabytes_bandwidth_used, &[org])?,
            self.paid_bandwidth
                .measure(billing.total_paid_gigabytes_bandwidth_used, &[org])?,
            self.included_bandwidth
                .measure(billing.included_gigabytes_bandwidth, &[org])?,
        ])
    }
}

/// Create the `packages` collector
pub async fn new_collector(
    config: CollectorConfig,
    cancel: CancellationToken,
) -> Result<Arc<dyn Collector>> {
    OrgCollector::build(config, PackagesFetcher::new(), &cancel).await
}
