//! Metric registry
//!
//! The bridge records through the [`MetricRegistry`] trait; the in-memory
//! implementation backs tests and any host that scrapes values itself.
//! Registration is idempotent and safe under concurrent first use.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bulwark_common::resilience::{Histogram, HistogramSnapshot};
use dashmap::DashMap;

use super::error::{MetricKind, MetricsError, MetricsResult};
use super::names::MetricKey;

/// Supplier polled whenever a gauge is read
pub type GaugeFn = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Monotonic counter handle
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicU64>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Destination for fault-tolerance metrics
pub trait MetricRegistry: Send + Sync + fmt::Debug {
    /// Counter registered under `key`, created on first use
    fn counter(&self, key: MetricKey) -> MetricsResult<Counter>;

    /// Histogram registered under `key`, created on first use
    fn histogram(&self, key: MetricKey) -> MetricsResult<Histogram>;

    /// Register a gauge; the first registration for a key wins
    fn register_gauge(&self, key: MetricKey, supplier: GaugeFn) -> MetricsResult<()>;

    fn increment(&self, key: MetricKey) -> MetricsResult<()> {
        self.counter(key).map(|counter| counter.increment())
    }

    fn record(&self, key: MetricKey, value: Duration) -> MetricsResult<()> {
        self.histogram(key).map(|histogram| histogram.record(value))
    }
}

enum Metric {
    Counter(Counter),
    Gauge(GaugeFn),
    Histogram(Histogram),
}

impl Metric {
    fn kind(&self) -> MetricKind {
        match self {
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Gauge(_) => MetricKind::Gauge,
            Metric::Histogram(_) => MetricKind::Histogram,
        }
    }
}

/// Point-in-time value of one metric
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricValue {
    Counter(u64),
    Gauge(i64),
    Histogram(HistogramSnapshot),
}

/// Registry holding every metric in process memory
#[derive(Default)]
pub struct InMemoryMetricRegistry {
    metrics: DashMap<MetricKey, Metric>,
}

impl InMemoryMetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Current value of every metric, keyed by rendered name
    pub fn snapshot(&self) -> BTreeMap<String, MetricValue> {
        self.metrics
            .iter()
            .map(|entry| (entry.key().to_string(), read(entry.value())))
            .collect()
    }

    /// Current value of the metric rendered as `name`
    pub fn value(&self, name: &str) -> Option<MetricValue> {
        self.metrics.iter().find(|entry| entry.key().matches(name)).map(|entry| read(entry.value()))
    }

    pub fn counter_value(&self, name: &str) -> Option<u64> {
        match self.value(name)? {
            MetricValue::Counter(value) => Some(value),
            _ => None,
        }
    }

    pub fn gauge_value(&self, name: &str) -> Option<i64> {
        match self.value(name)? {
            MetricValue::Gauge(value) => Some(value),
            _ => None,
        }
    }

    pub fn histogram_snapshot(&self, name: &str) -> Option<HistogramSnapshot> {
        match self.value(name)? {
            MetricValue::Histogram(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    fn mismatch(key: &MetricKey, expected: MetricKind, found: MetricKind) -> MetricsError {
        MetricsError::TypeMismatch { name: key.to_string(), expected, found }
    }
}

fn read(metric: &Metric) -> MetricValue {
    match metric {
        Metric::Counter(counter) => MetricValue::Counter(counter.get()),
        Metric::Gauge(supplier) => MetricValue::Gauge(supplier()),
        Metric::Histogram(histogram) => MetricValue::Histogram(histogram.snapshot()),
    }
}

impl MetricRegistry for InMemoryMetricRegistry {
    fn counter(&self, key: MetricKey) -> MetricsResult<Counter> {
        if let Some(entry) = self.metrics.get(&key) {
            return match entry.value() {
                Metric::Counter(counter) => Ok(counter.clone()),
                other => Err(Self::mismatch(&key, MetricKind::Counter, other.kind())),
            };
        }
        let entry = self.metrics.entry(key.clone()).or_insert_with(|| Metric::Counter(Counter::new()));
        match entry.value() {
            Metric::Counter(counter) => Ok(counter.clone()),
            other => Err(Self::mismatch(&key, MetricKind::Counter, other.kind())),
        }
    }

    fn histogram(&self, key: MetricKey) -> MetricsResult<Histogram> {
        if let Some(entry) = self.metrics.get(&key) {
            return match entry.value() {
                Metric::Histogram(histogram) => Ok(histogram.clone()),
                other => Err(Self::mismatch(&key, MetricKind::Histogram, other.kind())),
            };
        }
        let entry =
            self.metrics.entry(key.clone()).or_insert_with(|| Metric::Histogram(Histogram::new()));
        match entry.value() {
            Metric::Histogram(histogram) => Ok(histogram.clone()),
            other => Err(Self::mismatch(&key, MetricKind::Histogram, other.kind())),
        }
    }

    fn register_gauge(&self, key: MetricKey, supplier: GaugeFn) -> MetricsResult<()> {
        if let Some(entry) = self.metrics.get(&key) {
            return match entry.value() {
                Metric::Gauge(_) => Ok(()),
                other => Err(Self::mismatch(&key, MetricKind::Gauge, other.kind())),
            };
        }
        let entry = self.metrics.entry(key.clone()).or_insert_with(|| Metric::Gauge(supplier));
        match entry.value() {
            Metric::Gauge(_) => Ok(()),
            other => Err(Self::mismatch(&key, MetricKind::Gauge, other.kind())),
        }
    }
}

impl fmt::Debug for InMemoryMetricRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryMetricRegistry").field("metrics", &self.metrics.len()).finish()
    }
}
