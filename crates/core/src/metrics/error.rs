//! Metrics error types

use std::fmt;

use thiserror::Error;

/// Kind of a registered metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Counter => write!(f, "counter"),
            MetricKind::Gauge => write!(f, "gauge"),
            MetricKind::Histogram => write!(f, "histogram"),
        }
    }
}

/// Errors raised while registering or updating metrics
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetricsError {
    /// The name is already registered as a different kind of metric
    #[error("Metric '{name}' is registered as a {found}, not a {expected}")]
    TypeMismatch { name: String, expected: MetricKind, found: MetricKind },
}

/// Result type alias for metrics operations
pub type MetricsResult<T> = Result<T, MetricsError>;
