//! Collector factory

use std::fmt;
use std::sync::Arc;

use bulwark_domain::{MetricsSettings, OperationDescriptor};
use dashmap::DashMap;
use tracing::debug;

use super::bridge::{OperationMetrics, OperationMetricsCollector};
use super::collector::{BulkheadView, MetricsCollector, NoopMetricsCollector};
use super::registry::MetricRegistry;
use crate::retry::RetryContext;

/// Hands out one collector per invocation
///
/// With metrics disabled every collector is a [`NoopMetricsCollector`] and
/// the registry is never touched.
pub struct MetricsCollectorFactory {
    registry: Arc<dyn MetricRegistry>,
    enabled: bool,
    bindings: DashMap<Arc<str>, Arc<OperationMetrics>>,
}

impl MetricsCollectorFactory {
    pub fn new(registry: Arc<dyn MetricRegistry>, settings: &MetricsSettings) -> Self {
        Self::with_enabled(registry, settings.enabled)
    }

    pub fn with_enabled(registry: Arc<dyn MetricRegistry>, enabled: bool) -> Self {
        debug!(enabled, "Metrics collector factory created");
        Self { registry, enabled, bindings: DashMap::new() }
    }

    /// Collector for one invocation of `operation`
    pub fn create_collector(
        &self,
        operation: &OperationDescriptor,
        retry: Option<Arc<RetryContext>>,
        bulkhead: Option<Arc<dyn BulkheadView>>,
    ) -> Arc<dyn MetricsCollector> {
        if !self.enabled {
            return Arc::new(NoopMetricsCollector);
        }
        let metrics = self.binding(operation);
        Arc::new(OperationMetricsCollector::new(metrics, retry, bulkhead))
    }

    fn binding(&self, operation: &OperationDescriptor) -> Arc<OperationMetrics> {
        if let Some(binding) = self.bindings.get(operation.prefix()) {
            return Arc::clone(binding.value());
        }
        let binding = self.bindings.entry(operation.prefix_handle()).or_insert_with(|| {
            Arc::new(OperationMetrics::new(operation, Arc::clone(&self.registry)))
        });
        Arc::clone(binding.value())
    }

    pub fn registry(&self) -> Arc<dyn MetricRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn is_metrics_enabled(&self) -> bool {
        self.enabled
    }
}

impl fmt::Debug for MetricsCollectorFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsCollectorFactory")
            .field("enabled", &self.enabled)
            .field("operations", &self.bindings.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::registry::InMemoryMetricRegistry;

    /// Validates the enable switch.
    ///
    /// Assertions:
    /// - Ensures a disabled factory leaves the registry untouched.
    /// - Ensures an enabled factory records through the registry.
    #[test]
    fn test_disabled_factory_records_nothing() {
        let operation = OperationDescriptor::new("svc", "op");

        let registry = Arc::new(InMemoryMetricRegistry::new());
        let disabled = MetricsCollectorFactory::with_enabled(registry.clone(), false);
        assert!(!disabled.is_metrics_enabled());
        disabled.create_collector(&operation, None, None).init(None);
        assert!(registry.is_empty());

        let enabled = MetricsCollectorFactory::new(registry.clone(), &MetricsSettings::default());
        enabled.create_collector(&operation, None, None).init(None);
        enabled.create_collector(&operation, None, None).init(None);
        assert_eq!(registry.counter_value("ft.svc.op.invocations.total"), Some(2));
    }
}
