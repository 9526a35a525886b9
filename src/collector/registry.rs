//! Named collector constructors
//!
//! The registry maps collector names to async constructors. Which collectors
//! run is decided by editing the registry (`disable`, `retain`) before
//! [`CollectorRegistry::instantiate`] builds them.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::aggregator::BillingCollector;
use super::{actions, actions_org, actions_workflow, packages, packages_org, storage};
use super::{Collector, CollectorConfig};
use crate::error::{Error, Result};

/// Async constructor of one collector
pub type CollectorFactory = Arc<
    dyn Fn(CollectorConfig, CancellationToken) -> BoxFuture<'static, Result<Arc<dyn Collector>>>
        + Send
        + Sync,
>;

/// Collector names to constructors
#[derive(Clone, Default)]
pub struct CollectorRegistry {
    factories: BTreeMap<String, CollectorFactory>,
}

impl CollectorRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in collector
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("actions", actions::new_collector);
        registry.register("actions_org", actions_org::new_collector);
        registry.register("actions_workflow", actions_workflow::new_collector);
        registry.register("packages", packages::new_collector);
        registry.register("packages_org", packages_org::new_collector);
        registry.register("storage_org", storage::new_collector);
        registry
    }

    /// Register `factory` under `name`, replacing any previous registration.
    pub fn register<F, Fut>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(CollectorConfig, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<dyn Collector>>> + Send + 'static,
    {
        let name = name.into();
        let factory: CollectorFactory = Arc::new(move |config, cancel| factory(config, cancel).boxed());
        if self.factories.insert(name.clone(), factory).is_some() {
            debug!(collector = %name, "Collector registration replaced");
        }
    }

    /// Remove `name`; returns whether it was registered.
    pub fn disable(&mut self, name: &str) -> bool {
        self.factories.remove(name).is_some()
    }

    /// Keep only the named collectors.
    ///
    /// Fails without modifying the registry if a name is not registered.
    pub fn retain<S: AsRef<str>>(&mut self, names: &[S]) -> Result<()> {
        if let Some(unknown) = names
            .iter()
            .map(AsRef::as_ref)
            .find(|name| !self.factories.contains_key(*name))
        {
            return Err(Error::UnknownCollector(unknown.to_string()));
        }
        self.factories
            .retain(|name, _| names.iter().any(|n| n.as_ref() == name));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Construct every registered collector concurrently.
    ///
    /// The first constructor error aborts startup.
    pub async fn instantiate(
        self,
        config: CollectorConfig,
        cancel: CancellationToken,
    ) -> Result<BillingCollector> {
        let constructions = self.factories.into_iter().map(|(name, factory)| {
            let construction = factory(config.clone(), cancel.clone());
            async move {
                let collector = construction.await.map_err(|e| {
                    Error::Config(format!("failed to create collector {}: {}", name, e))
                })?;
                Ok::<_, Error>((name, collector))
            }
        });

        let collectors: BTreeMap<String, Arc<dyn Collector>> =
            try_join_all(constructions).await?.into_iter().collect();
        info!(
            collectors = ?collectors.keys().collect::<Vec<_>>(),
            orgs = config.orgs.len(),
            "Collectors created"
        );
        Ok(BillingCollector::new(collectors))
    }
}

impl std::fmt::Debug for CollectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorRegistry")
            .field("collectors", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::descriptor::{MeasurementSink, MetricDescriptor};
    use crate::collector::testing::FakeBillingApi;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    struct Named(Arc<MetricDescriptor>);

    #[async_trait]
    impl Collector for Named {
        fn describe(&self) -> Vec<Arc<MetricDescriptor>> {
            vec![self.0.clone()]
        }

        async fn reload(&self, _cancel: &CancellationToken) -> Result<()> {
            Ok(())
        }

        async fn update(&self, _cancel: &CancellationToken, _sink: &MeasurementSink) -> Result<()> {
            Ok(())
        }
    }

    fn named(subsystem: &'static str) -> impl Fn(CollectorConfig, CancellationToken) -> futures::future::Ready<Result<Arc<dyn Collector>>> {
        move |_, _| {
            let collector: Arc<dyn Collector> =
                Arc::new(Named(MetricDescriptor::gauge(subsystem, "value", "Value", &["org"])));
            futures::future::ready(Ok(collector))
        }
    }

    fn config() -> CollectorConfig {
        FakeBillingApi::new().config(&["acme"])
    }

    #[test]
    fn test_defaults_cover_every_collector() {
        let registry = CollectorRegistry::with_defaults();

        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["actions", "actions_org", "actions_workflow", "packages", "packages_org", "storage_org"]
        );
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let mut registry = CollectorRegistry::new();
        registry.register("x", named("first"));
        registry.register("x", named("second"));

        let aggregator = registry.instantiate(config(), CancellationToken::new()).await.unwrap();

        let names: Vec<_> = aggregator.describe().iter().map(|d| d.fq_name().to_string()).collect();
        assert!(names.contains(&"github_billing_second_value".to_string()));
        assert!(!names.contains(&"github_billing_first_value".to_string()));
    }

    #[test]
    fn test_disable() {
        let mut registry = CollectorRegistry::with_defaults();

        assert!(registry.disable("actions_workflow"));
        assert!(!registry.disable("actions_workflow"));
        assert!(!registry.contains("actions_workflow"));
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_retain_known_names() {
        let mut registry = CollectorRegistry::with_defaults();

        registry.retain(&["actions", "storage_org"]).unwrap();

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["actions", "storage_org"]);
    }

    #[test]
    fn test_retain_unknown_name_leaves_registry_untouched() {
        let mut registry = CollectorRegistry::with_defaults();

        let result = registry.retain(&["actions", "nope"]);

        assert_matches!(result, Err(Error::UnknownCollector(name)) if name == "nope");
        assert_eq!(registry.len(), 6);
    }

    #[tokio::test]
    async fn test_failing_constructor_aborts_startup() {
        let mut registry = CollectorRegistry::new();
        registry.register("ok", named("ok"));
        registry.register("broken", |_, _| async {
            Err::<Arc<dyn Collector>, _>(Error::Internal("no credentials".into()))
        });

        let result = registry.instantiate(config(), CancellationToken::new()).await;

        assert_matches!(result, Err(Error::Config(msg)) if msg.contains("broken") && msg.contains("no credentials"));
    }

    #[tokio::test]
    async fn test_constructors_run_concurrently() {
        let started = Arc::new(AtomicUsize::new(0));
        let mut registry = CollectorRegistry::new();
        for name in ["a", "b", "c", "d"] {
            let started = started.clone();
            registry.register(name, move |_, _| {
                let started = started.clone();
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    let collector: Arc<dyn Collector> =
                        Arc::new(Named(MetricDescriptor::gauge(name, "value", "Value", &["org"])));
                    Ok::<_, Error>(collector)
                }
            });
        }

        let start = Instant::now();
        let aggregator = registry.instantiate(config(), CancellationToken::new()).await.unwrap();

        assert!(start.elapsed() < Duration::from_millis(700));
        assert_eq!(started.load(Ordering::SeqCst), 4);
        assert_eq!(aggregator.collector_names().collect::<Vec<_>>(), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_instantiate_defaults_against_fake_api() {
        let api = FakeBillingApi::new().with_repository("acme", "api", &[(7, "CI")]);
        let registry = CollectorRegistry::with_defaults();

        let aggregator = registry
            .instantiate(api.config(&["acme"]), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(aggregator.len(), 6);
        assert!(aggregator.descs().is_ok());
    }
}
