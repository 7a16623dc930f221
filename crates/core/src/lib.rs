//! # Bulwark Core
//!
//! Fault-tolerance decision logic - no I/O, no configuration loading.
//!
//! This crate contains:
//! - Failure classification against retry policies
//! - Circuit breaker failure predicates
//! - The per-invocation retry state machine
//! - The outcome metrics bridge and its collector factory
//!
//! ## Architecture Principles
//! - Depends only on `bulwark-domain` and `bulwark-common`
//! - Policy runtimes are observed through narrow view traits
//! - Metrics hooks never fail into the guarded call

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod breaker;
pub mod classifier;
pub mod metrics;
pub mod retry;

// Re-export commonly used items
pub use breaker::{AllFailures, CategoryFailurePredicate, CircuitBreakerPolicy, FailurePredicate};
pub use classifier::{Classification, FailureClassifier};
pub use metrics::{
    AttemptReport, BulkheadView, CircuitBreakerView, ExecutionFailure, FallbackOutcome,
    InMemoryMetricRegistry, MetricRegistry, MetricsCollector, MetricsCollectorFactory,
    NoopMetricsCollector,
};
pub use retry::{RetryContext, RetryVerdict};
