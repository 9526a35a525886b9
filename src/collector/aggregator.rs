//! Aggregating collector
//!
//! Runs every enabled sub-collector concurrently for each scrape, isolates
//! their failures from one another and reports one liveness sample per
//! sub-collector.

use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::FutureExt;
use prometheus::core::Desc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::descriptor::{MeasurementSink, MetricDescriptor, Snapshot};
use super::Collector;
use crate::error::{Error, Result};

/// Default deadline of one sub-collector update
pub const DEFAULT_COLLECTOR_TIMEOUT: Duration = Duration::from_secs(60);

/// The set of enabled sub-collectors, keyed by name
pub struct BillingCollector {
    collectors: BTreeMap<String, Arc<dyn Collector>>,
    timeout: Duration,
    up: Arc<MetricDescriptor>,
}

impl BillingCollector {
    pub fn new(collectors: BTreeMap<String, Arc<dyn Collector>>) -> Self {
        Self {
            collectors,
            timeout: DEFAULT_COLLECTOR_TIMEOUT,
            up: MetricDescriptor::gauge(
                "collector",
                "up",
                "Whether the last update of the collector succeeded",
                &["collector"],
            ),
        }
    }

    /// Set the per-update deadline of each sub-collector.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn collector_names(&self) -> impl Iterator<Item = &str> {
        self.collectors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// Liveness descriptor followed by the descriptors of every sub-collector
    pub fn describe(&self) -> Vec<Arc<MetricDescriptor>> {
        let mut descriptors = vec![self.up.clone()];
        for collector in self.collectors.values() {
            descriptors.extend(collector.describe());
        }
        descriptors
    }

    /// Validate every descriptor as a Prometheus `Desc`.
    ///
    /// Fails on invalid metric or label names and on a metric name described
    /// twice.
    pub fn descs(&self) -> Result<Vec<Desc>> {
        let mut seen = HashSet::new();
        let mut descs = Vec::new();
        for descriptor in self.describe() {
            if !seen.insert(descriptor.fq_name().to_string()) {
                return Err(Error::Config(format!(
                    "metric {} is described more than once",
                    descriptor.fq_name()
                )));
            }
            descs.push(descriptor.desc()?);
        }
        Ok(descs)
    }

    /// Run one update of every sub-collector and merge the results.
    ///
    /// Never fails. Measurements of failed sub-collectors that were emitted
    /// before the failure are kept, and every sub-collector gets exactly one
    /// `collector_up` sample.
    pub async fn collect(&self, cancel: &CancellationToken) -> Snapshot {
        let (sink, mut rx) = MeasurementSink::channel();

        let mut tasks = JoinSet::new();
        for (name, collector) in &self.collectors {
            let name = name.clone();
            let collector = collector.clone();
            let sink = sink.clone();
            let cancel = cancel.clone();
            let timeout = self.timeout;
            tasks.spawn(async move {
                let start = Instant::now();
                let result = run_update(&name, collector.as_ref(), &cancel, &sink, timeout).await;
                (name, result, start.elapsed())
            });
        }
        drop(sink);

        let mut liveness: BTreeMap<&str, bool> =
            self.collectors.keys().map(|name| (name.as_str(), false)).collect();

        while let Some(joined) = tasks.join_next().await {
            let (name, result, elapsed) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Collector task failed to complete");
                    continue;
                }
            };
            let duration_seconds = elapsed.as_secs_f64();
            match result {
                Ok(()) => {
                    debug!(collector = %name, duration_seconds, "Collector succeeded");
                    if let Some(up) = liveness.get_mut(name.as_str()) {
                        *up = true;
                    }
                }
                Err(e) => {
                    error!(collector = %name, duration_seconds, error = %e, "Collector failed");
                }
            }
        }

        let mut measurements = Snapshot::drain(&mut rx).into_measurements();
        for (name, up) in liveness {
            match self.up.measure(if up { 1.0 } else { 0.0 }, &[name]) {
                Ok(measurement) => measurements.push(measurement),
                Err(e) => error!(collector = name, error = %e, "Failed to record liveness"),
            }
        }
        Snapshot::new(measurements)
    }

    /// Rebuild the working set of every sub-collector concurrently.
    ///
    /// Returns the number of sub-collectors whose reload failed; those keep
    /// their previous working set.
    pub async fn reload(&self, cancel: &CancellationToken) -> usize {
        let reloads = self.collectors.iter().map(|(name, collector)| async move {
            (name, collector.reload(cancel).await)
        });

        let mut failed = 0;
        for (name, result) in join_all(reloads).await {
            if let Err(e) = result {
                warn!(collector = %name, error = %e, "Reload failed, keeping previous working set");
                failed += 1;
            }
        }

        info!(collectors = self.collectors.len(), failed, "Collectors reloaded");
        failed
    }
}

impl std::fmt::Debug for BillingCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingCollector")
            .field("collectors", &self.collectors.keys().collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .finish()
    }
}

async fn run_update(
    name: &str,
    collector: &dyn Collector,
    cancel: &CancellationToken,
    sink: &MeasurementSink,
    timeout: Duration,
) -> Result<()> {
    let update = AssertUnwindSafe(collector.update(cancel, sink)).catch_unwind();
    match tokio::time::timeout(timeout, update).await {
        Ok(Ok(result)) => result,
        Ok(Err(panic)) => Err(Error::Internal(format!(
            "collector {} panicked: {}",
            name,
            panic_message(panic.as_ref())
        ))),
        Err(_) => Err(Error::Timeout {
            collector: name.to_string(),
            seconds: timeout.as_secs(),
        }),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
