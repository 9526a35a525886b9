//! Actions minutes per organization with a runner platform breakdown

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::descriptor::{Measurement, MetricDescriptor};
use super::org::{OrgCollector, OrgFetcher};
use super::platform::PlatformValues;
use super::{Collector, CollectorConfig};
use crate::error::Result;
use crate::github::{ActionsBilling, BillingApi};

pub(crate) struct OrgActionsFetcher {
    used_minutes_real: Arc<MetricDescriptor>,
    used_minutes_billed: Arc<MetricDescriptor>,
    inclusive_minutes: Arc<MetricDescriptor>,
    used_minutes_total: Arc<MetricDescriptor>,
    used_minutes_paid: Arc<MetricDescriptor>,
}

impl OrgActionsFetcher {
    fn new() -> Self {
        Self {
            used_minutes_real: MetricDescriptor::counter(
                Self::SUBSYSTEM,
                "minutes_real_count",
                "GitHub actions used minutes without platform multiplier",
                &["org", "platform"],
            ),
            used_minutes_billed: MetricDescriptor::counter(
                Self::SUBSYSTEM,
                "minutes_billed_count",
                "GitHub actions used minutes with platform multipliers",
                &["org", "platform"],
            ),
            inclusive_minutes: MetricDescriptor::gauge(
                Self::SUBSYSTEM,
                "minutes_inclusive",
                "GitHub actions inclusive budget minutes",
                &["org"],
            ),
            used_minutes_total: MetricDescriptor::counter(
                Self::SUBSYSTEM,
                "minutes_total_count",
                "Total GitHub actions minutes used",
                &["org"],
            ),
            used_minutes_paid: MetricDescriptor::counter(
                Self::SUBSYSTEM,
                "minutes_paid_count",
                "Total GitHub actions minutes paid for",
                &["org"],
            ),
        }
    }

    fn map(&self, org: &str, billing: &ActionsBilling) -> Result<Vec<Measurement>> {
        let breakdown = &billing.minutes_used_breakdown;
        let billed = PlatformValues {
            linux: breakdown.ubuntu,
            macos: breakdown.macos,
            windows: breakdown.windows,
        };
        let real = billed.map(|platform, value| platform.real_minutes(value));

        let mut measurements = billed.measurements(&self.used_minutes_billed, &[org])?;
        measurements.extend(real.measurements(&self.used_minutes_real, &[org])?);
        measurements.push(
            self.inclusive_minutes
                .measure(billing.included_minutes, &[org])?,
        );
        measurements.push(
            self.used_minutes_total
                .measure(billing.total_minutes_used, &[org])?,
        );
        measurements.push(
            self.used_minutes_paid
                .measure(billing.total_paid_minutes_used, &[org])?,
        );
        Ok(measurements)
    }
}

#[async_trait]
impl OrgFetcher for OrgActionsFetcher {
    const SUBSYSTEM: &'static str = "actions_org";

    fn describe(&self) -> Vec<Arc<MetricDescriptor>> {
        vec![
            self.used_minutes_real.clone(),
            self.used_minutes_billed.clone(),
            self.inclusive_minutes.clone(),
            self.used_minutes_total.clone(),
            self.used_minutes_paid.clone(),
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

/// Create the `actions_org` collector
pub async fn new_collector(
    config: CollectorConfig,
    cancel: CancellationToken,
) -> Result<Arc<dyn Collector>> {
    OrgCollector::build(config, OrgActionsFetcher::new(), &cancel).await
}
