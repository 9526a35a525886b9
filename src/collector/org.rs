//! Per-organization fan-out shared by all collectors

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::descriptor::{Measurement, MeasurementSink, MetricDescriptor};
use super::{Collector, CollectorConfig};
use crate::error::{Error, Result};
use crate::github::BillingApi;

/// Run one task per organization, then forward the measurements of every
/// organization that succeeded.
///
/// All tasks are joined before returning, failed ones included. An
/// organization contributes either all of its measurements or none. The
/// first error in completion order is returned.
pub(crate) async fn fan_out<Fut>(
    subsystem: &'static str,
    sink: &MeasurementSink,
    fetches: impl IntoIterator<Item = (String, Fut)>,
) -> Result<()>
where
    Fut: Future<Output = Result<Vec<Measurement>>> + Send + 'static,
{
    let mut tasks = JoinSet::new();
    for (org, fetch) in fetches {
        tasks.spawn(async move { (org, fetch.await) });
    }

    let total = tasks.len();
    let mut failed = 0usize;
    let mut first_error = None;

    while let Some(joined) = tasks.join_next().await {
        let error = match joined {
            Ok((org, Ok(measurements))) => {
                debug!(collector = subsystem, org = %org, count = measurements.len(), "Organization collected");
                sink.send_all(measurements);
                continue;
            }
            Ok((org, Err(e))) => {
                debug!(collector = subsystem, org = %org, error = %e, "Organization failed");
                e
            }
            Err(e) => Error::Internal(format!("{} fetch task failed: {}", subsystem, e)),
        };
        failed += 1;
        first_error.get_or_insert(error);
    }

    match first_error {
        Some(error) => {
            warn!(collector = subsystem, failed, total, "Organizations failed");
            Err(error)
        }
        None => Ok(()),
    }
}

/// Fetch-and-map step of a collector whose working set is the organization list.
#[async_trait]
pub(crate) trait OrgFetcher: Send + Sync + 'static {
    /// Collector name, also the metric subsystem
    const SUBSYSTEM: &'static str;

    fn describe(&self) -> Vec<Arc<MetricDescriptor>>;

    /// Query one organization and map the response.
    async fn fetch(
        &self,
        api: &dyn BillingApi,
        cancel: &CancellationToken,
        org: &str,
    ) -> Result<Vec<Measurement>>;
}

/// Collector querying every configured organization with one fetcher
pub(crate) struct OrgCollector<F> {
    config: CollectorConfig,
    fetcher: Arc<F>,
    orgs: RwLock<Arc<[String]>>,
}

impl<F: OrgFetcher> OrgCollector<F> {
    pub(crate) async fn build(
        config: CollectorConfig,
        fetcher: F,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn Collector>> {
        let collector = Self {
            orgs: RwLock::new(Arc::from(Vec::new())),
            config,
            fetcher: Arc::new(fetcher),
        };
        collector.reload(cancel).await?;
        Ok(Arc::new(collector))
    }

    pub(crate) fn orgs(&self) -> Arc<[String]> {
        self.orgs.read().clone()
    }
}

#[async_trait]
impl<F: OrgFetcher> Collector for OrgCollector<F> {
    fn describe(&self) -> Vec<Arc<MetricDescriptor>> {
        self.fetcher.describe()
    }

    async fn reload(&self, _cancel: &CancellationToken) -> Result<()> {
        *self.orgs.write() = self.config.orgs.clone();
        Ok(())
    }

    async fn update(&self, cancel: &CancellationToken, sink: &MeasurementSink) -> Result<()> {
        let orgs = self.orgs();
        let fetches = orgs.iter().map(|org| {
            let fetcher = self.fetcher.clone();
            let api = self.config.api.clone();
            let cancel = cancel.clone();
            let org = org.clone();
            let task = {
                let org = org.clone();
                async move { fetcher.fetch(api.as_ref(), &cancel, &org).await }
            };
            (org, task)
        });

        fan_out(F::SUBSYSTEM, sink, fetches).await
    }
}
