//! Metrics collector hooks
//!
//! The executor drives one [`MetricsCollector`] per invocation through a
//! fixed sequence of hooks:
//!
//! ```text
//! init ─▶ ( before_execute ─▶ after_success | on_error ─▶ on_processed_error ) ─▶ after_execute
//!                 ▲                                                                    │
//!                 └──────────────────────────── retry ◀────────────────────────────────┘
//! ```
//!
//! Hooks never fail and never panic into the caller.

use std::sync::Arc;
use std::time::Duration;

use bulwark_domain::{Failure, FaultToleranceError, Rejection};

// ============================================================================
// Views onto policy runtimes
// ============================================================================

/// Read-only view of a circuit breaker
pub trait CircuitBreakerView: Send + Sync {
    fn is_open(&self) -> bool;

    /// Whether `failure` counts against the breaker
    fn fails_on(&self, failure: &Failure) -> bool;

    /// Cumulative nanoseconds spent open
    fn open_nanos(&self) -> u64;

    fn closed_nanos(&self) -> u64;

    fn half_open_nanos(&self) -> u64;
}

/// Read-only view of a bulkhead
pub trait BulkheadView: Send + Sync {
    fn concurrent_executions(&self) -> usize;

    fn queue_size(&self) -> usize;
}

// ============================================================================
// Hook payloads
// ============================================================================

/// Why an attempt failed, as far as the metrics are concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Bulkhead waiting queue full
    ThreadPoolRejected,
    /// Bulkhead concurrency limit reached
    SemaphoreRejected,
    /// Circuit breaker open
    ShortCircuited,
    TimedOut,
    Failed,
}

impl FailureType {
    pub fn of(failure: &Failure) -> Self {
        match failure.as_error() {
            Some(FaultToleranceError::BulkheadRejected { rejection: Rejection::WaitingQueueFull }) => {
                FailureType::ThreadPoolRejected
            }
            Some(FaultToleranceError::BulkheadRejected { rejection: Rejection::ConcurrencyLimit }) => {
                FailureType::SemaphoreRejected
            }
            Some(FaultToleranceError::CircuitBreakerOpen) => FailureType::ShortCircuited,
            Some(FaultToleranceError::Timeout { .. }) => FailureType::TimedOut,
            _ => FailureType::Failed,
        }
    }

    pub fn is_rejection(self) -> bool {
        matches!(self, FailureType::ThreadPoolRejected | FailureType::SemaphoreRejected)
    }
}

/// What the fallback did for a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackOutcome {
    NotInvoked,
    /// The fallback produced the invocation's result
    Recovered,
    /// The fallback ran and failed too
    Failed,
}

impl FallbackOutcome {
    pub fn invoked(self) -> bool {
        self != FallbackOutcome::NotInvoked
    }
}

/// Failed attempt passed to [`MetricsCollector::on_error`]
#[derive(Debug, Clone, Copy)]
pub struct ExecutionFailure<'a> {
    pub failure: &'a Failure,
    pub fallback: FallbackOutcome,
    /// Whether the attempt got past the bulkhead
    pub admitted: bool,
}

impl<'a> ExecutionFailure<'a> {
    /// Failed attempt; assumed admitted unless it is a rejection or a
    /// short-circuit
    pub fn new(failure: &'a Failure) -> Self {
        let kind = FailureType::of(failure);
        let admitted = !kind.is_rejection() && kind != FailureType::ShortCircuited;
        Self { failure, fallback: FallbackOutcome::NotInvoked, admitted }
    }

    pub fn with_fallback(mut self, fallback: FallbackOutcome) -> Self {
        self.fallback = fallback;
        self
    }

    /// Override admission, e.g. for a call that timed out while queued
    pub fn with_admitted(mut self, admitted: bool) -> Self {
        self.admitted = admitted;
        self
    }
}

/// Attempt summary passed to the completion hooks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptReport {
    /// Time spent in the bulkhead waiting queue, when the attempt queued
    pub queue_wait: Option<Duration>,
    /// Whether the fallback ran for this attempt
    pub fallback_used: bool,
}

// ============================================================================
// Collector
// ============================================================================

/// Per-invocation metrics hooks
pub trait MetricsCollector: Send + Sync {
    /// Invocation started; `breaker` is bound for the rest of the invocation
    fn init(&self, breaker: Option<Arc<dyn CircuitBreakerView>>);

    /// An attempt is about to run
    fn before_execute(&self);

    fn after_success(&self, report: &AttemptReport);

    fn on_error(&self, failure: &ExecutionFailure<'_>);

    /// The breaker has processed `error`
    fn on_processed_error(&self, error: &FaultToleranceError);

    fn after_execute(&self, report: &AttemptReport);
}

/// Collector used when metrics are disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricsCollector;

impl MetricsCollector for NoopMetricsCollector {
    fn init(&self, _breaker: Option<Arc<dyn CircuitBreakerView>>) {}

    fn before_execute(&self) {}

    fn after_success(&self, _report: &AttemptReport) {}

    fn on_error(&self, _failure: &ExecutionFailure<'_>) {}

    fn on_processed_error(&self, _error: &FaultToleranceError) {}

    fn after_execute(&self, _report: &AttemptReport) {}
}
