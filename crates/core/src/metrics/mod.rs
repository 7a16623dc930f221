//! Outcome metrics for guarded operations
//!
//! - [`collector`]: the hook trait, its payloads and the no-op collector
//! - [`bridge`]: hook-to-metric translation for one operation
//! - [`factory`]: per-invocation collector creation behind the enable switch
//! - [`registry`]: metric storage

pub mod bridge;
pub mod collector;
pub mod error;
pub mod factory;
pub mod names;
pub mod registry;
mod views;

pub use bridge::{OperationMetrics, OperationMetricsCollector};
pub use collector::{
    AttemptReport, BulkheadView, CircuitBreakerView, ExecutionFailure, FailureType,
    FallbackOutcome, MetricsCollector, NoopMetricsCollector,
};
pub use error::{MetricKind, MetricsError, MetricsResult};
pub use factory::MetricsCollectorFactory;
pub use names::MetricKey;
pub use registry::{Counter, GaugeFn, InMemoryMetricRegistry, MetricRegistry, MetricValue};
