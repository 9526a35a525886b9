//! Metric descriptors, measurements and the per-cycle snapshot
//!
//! A [`MetricDescriptor`] is built once when its collector is constructed and
//! shared by `Arc` with every [`Measurement`] produced from it, so the label
//! schema reported by `describe` is by construction the one used at collect
//! time.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use prometheus::core::Desc;
use prometheus::proto::MetricFamily;
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Namespace prefixed to every exported metric
pub const NAMESPACE: &str = "github_billing";

// =============================================================================
// Descriptor
// =============================================================================

/// Prometheus value type of a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Gauge,
    Counter,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueKind::Gauge => write!(f, "gauge"),
            ValueKind::Counter => write!(f, "counter"),
        }
    }
}

/// Static metadata of one exported metric
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    fq_name: String,
    help: String,
    label_names: Vec<String>,
    kind: ValueKind,
}

impl MetricDescriptor {
    /// Create a descriptor named `github_billing_<subsystem>_<name>`.
    pub fn new(
        subsystem: &str,
        name: &str,
        help: &str,
        label_names: &[&str],
        kind: ValueKind,
    ) -> Arc<Self> {
        let fq_name = Opts::new(name, help)
            .namespace(NAMESPACE)
            .subsystem(subsystem)
            .fq_name();

        Arc::new(Self {
            fq_name,
            help: help.to_string(),
            label_names: label_names.iter().map(|l| l.to_string()).collect(),
            kind,
        })
    }

    pub fn gauge(subsystem: &str, name: &str, help: &str, label_names: &[&str]) -> Arc<Self> {
        Self::new(subsystem, name, help, label_names, ValueKind::Gauge)
    }

    pub fn counter(subsystem: &str, name: &str, help: &str, label_names: &[&str]) -> Arc<Self> {
        Self::new(subsystem, name, help, label_names, ValueKind::Counter)
    }

    pub fn fq_name(&self) -> &str {
        &self.fq_name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Convert into a Prometheus descriptor, validating metric and label names.
    pub fn desc(&self) -> Result<Desc> {
        Ok(Desc::new(
            self.fq_name.clone(),
            self.help.clone(),
            self.label_names.clone(),
            HashMap::new(),
        )?)
    }

    /// Build a measurement of this metric.
    pub fn measure(self: &Arc<Self>, value: f64, label_values: &[&str]) -> Result<Measurement> {
        Measurement::new(
            Arc::clone(self),
            value,
            label_values.iter().map(|v| v.to_string()).collect(),
        )
    }
}

// =============================================================================
// Measurement
// =============================================================================

/// One sample of a described metric, valid for a single collection cycle
#[derive(Debug, Clone)]
pub struct Measurement {
    descriptor: Arc<MetricDescriptor>,
    value: f64,
    label_values: Vec<String>,
}

impl Measurement {
    /// Create a measurement; fails if the label values don't match the
    /// descriptor's label names one to one.
    pub fn new(
        descriptor: Arc<MetricDescriptor>,
        value: f64,
        label_values: Vec<String>,
    ) -> Result<Self> {
        if label_values.len() != descriptor.label_names.len() {
            return Err(Error::LabelCardinality {
                metric: descriptor.fq_name.clone(),
                expected: descriptor.label_names.len(),
                actual: label_values.len(),
            });
        }

        Ok(Self {
            descriptor,
            value,
            label_values,
        })
    }

    pub fn descriptor(&self) -> &Arc<MetricDescriptor> {
        &self.descriptor
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn kind(&self) -> ValueKind {
        self.descriptor.kind
    }

    pub fn label_values(&self) -> &[String] {
        &self.label_values
    }

    /// Value of the label `name`, if the descriptor declares it
    pub fn label(&self, name: &str) -> Option<&str> {
        self.descriptor
            .label_names
            .iter()
            .position(|l| l == name)
            .map(|i| self.label_values[i].as_str())
    }
}

// =============================================================================
// Sink
// =============================================================================

/// Shared output stream of a collection cycle.
///
/// Cloned into every concurrent producer; each send moves one complete
/// measurement.
#[derive(Debug, Clone)]
pub struct MeasurementSink {
    tx: mpsc::UnboundedSender<Measurement>,
}

impl MeasurementSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Measurement>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, measurement: Measurement) {
        if let Err(e) = self.tx.send(measurement) {
            debug!(
                metric = e.0.descriptor.fq_name(),
                "Snapshot receiver dropped, discarding measurement"
            );
        }
    }

    pub fn send_all(&self, measurements: impl IntoIterator<Item = Measurement>) {
        for measurement in measurements {
            self.send(measurement);
        }
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// All measurements of one collection cycle, in arrival order
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    measurements: Vec<Measurement>,
}

impl Snapshot {
    pub fn new(measurements: Vec<Measurement>) -> Self {
        Self { measurements }
    }

    /// Take everything buffered in `rx`.
    pub fn drain(rx: &mut mpsc::UnboundedReceiver<Measurement>) -> Self {
        let mut measurements = Vec::new();
        while let Ok(measurement) = rx.try_recv() {
            measurements.push(measurement);
        }
        Self { measurements }
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn into_measurements(self) -> Vec<Measurement> {
        self.measurements
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    /// Measurements of the metric `fq_name`
    pub fn by_name<'a>(&'a self, fq_name: &'a str) -> impl Iterator<Item = &'a Measurement> + 'a {
        self.measurements
            .iter()
            .filter(move |m| m.descriptor.fq_name == fq_name)
    }

    /// Value of the sample of `fq_name` with exactly these label values
    pub fn value(&self, fq_name: &str, label_values: &[&str]) -> Option<f64> {
        self.by_name(fq_name)
            .find(|m| m.label_values.iter().map(String::as_str).eq(label_values.iter().copied()))
            .map(|m| m.value)
    }

    /// Group the measurements into metric families, sorted by name.
    pub fn gather(&self) -> Result<Vec<MetricFamily>> {
        let mut groups: BTreeMap<&str, Vec<&Measurement>> = BTreeMap::new();
        for measurement in &self.measurements {
            groups
                .entry(measurement.descriptor.fq_name.as_str())
                .or_default()
                .push(measurement);
        }

        let registry = Registry::new();
        for (name, measurements) in groups {
            let descriptor = &measurements[0].descriptor;
            let opts = Opts::new(name, descriptor.help.as_str());
            let labels: Vec<&str> = descriptor.label_names.iter().map(String::as_str).collect();

            let family: Box<dyn prometheus::core::Collector> = match descriptor.kind {
                ValueKind::Gauge => {
                    let vec = GaugeVec::new(opts, &labels)?;
                    for m in &measurements {
                        let values: Vec<&str> = m.label_values.iter().map(String::as_str).collect();
                        vec.get_metric_with_label_values(&values)?.set(m.value);
                    }
                    Box::new(vec)
                }
                ValueKind::Counter => {
                    let vec = CounterVec::new(opts, &labels)?;
                    for m in &measurements {
                        if m.value.is_nan() || m.value < 0.0 {
                            warn!(metric = name, value = m.value, "Dropping invalid counter value");
                            continue;
                        }
                        let values: Vec<&str> = m.label_values.iter().map(String::as_str).collect();
                        let counter = vec.get_metric_with_label_values(&values)?;
                        counter.reset();
                        counter.inc_by(m.value);
                    }
                    Box::new(vec)
                }
            };

            registry.register(family)?;
        }

        Ok(registry.gather())
    }

    /// Render the snapshot in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String> {
        let families = self.gather()?;
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(format!("non UTF-8 exposition: {}", e)))
    }
}
