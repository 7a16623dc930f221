//! Bridge from collector hooks to named metrics
//!
//! [`OperationMetrics`] is the per-operation binding to the registry and is
//! shared by every invocation of that operation. [`OperationMetricsCollector`]
//! is the per-invocation handle carrying the transient state the hooks need
//! between calls.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use bulwark_domain::{Capabilities, FaultToleranceError, OperationDescriptor, PanicPayload};
use parking_lot::Mutex;
use tracing::warn;

use super::collector::{
    AttemptReport, BulkheadView, CircuitBreakerView, ExecutionFailure, FailureType,
    FallbackOutcome, MetricsCollector,
};
use super::error::MetricsResult;
use super::names::*;
use super::registry::{GaugeFn, MetricRegistry};
use crate::retry::RetryContext;

/// Registry binding for one operation
pub struct OperationMetrics {
    prefix: Arc<str>,
    capabilities: Capabilities,
    registry: Arc<dyn MetricRegistry>,
}

impl OperationMetrics {
    pub fn new(operation: &OperationDescriptor, registry: Arc<dyn MetricRegistry>) -> Self {
        Self {
            prefix: operation.prefix_handle(),
            capabilities: operation.capabilities(),
            registry,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn key(&self, suffix: &'static str) -> MetricKey {
        MetricKey::new(Arc::clone(&self.prefix), suffix)
    }

    fn increment(&self, suffix: &'static str) -> MetricsResult<()> {
        self.registry.increment(self.key(suffix))
    }

    fn record(&self, suffix: &'static str, value: Duration) -> MetricsResult<()> {
        self.registry.record(self.key(suffix), value)
    }

    fn gauge(&self, suffix: &'static str, supplier: GaugeFn) -> MetricsResult<()> {
        self.registry.register_gauge(self.key(suffix), supplier)
    }
}

impl fmt::Debug for OperationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationMetrics")
            .field("prefix", &self.prefix)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Collector for one invocation of one operation
pub struct OperationMetricsCollector {
    metrics: Arc<OperationMetrics>,
    retry: Option<Arc<RetryContext>>,
    bulkhead: Option<Arc<dyn BulkheadView>>,
    breaker: OnceLock<Arc<dyn CircuitBreakerView>>,
    started: Mutex<Option<Instant>>,
    breaker_open_before: AtomicBool,
    fallback_counted: AtomicBool,
}

impl OperationMetricsCollector {
    pub fn new(
        metrics: Arc<OperationMetrics>,
        retry: Option<Arc<RetryContext>>,
        bulkhead: Option<Arc<dyn BulkheadView>>,
    ) -> Self {
        Self {
            metrics,
            retry,
            bulkhead,
            breaker: OnceLock::new(),
            started: Mutex::new(None),
            breaker_open_before: AtomicBool::new(false),
            fallback_counted: AtomicBool::new(false),
        }
    }

    fn caps(&self) -> &Capabilities {
        &self.metrics.capabilities
    }

    fn run_safely<F>(&self, hook: &'static str, body: F)
    where
        F: FnOnce() -> MetricsResult<()>,
    {
        match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                warn!(operation = %self.metrics.prefix, hook, error = %error, "Metrics hook failed");
            }
            Err(payload) => {
                let message = PanicPayload::new(payload).message();
                warn!(operation = %self.metrics.prefix, hook, panic = %message, "Metrics hook panicked");
            }
        }
    }

    fn elapsed(&self) -> Option<Duration> {
        let started = *self.started.lock();
        started.map(|started| started.elapsed())
    }

    fn has_been_retried(&self) -> bool {
        self.retry.as_ref().is_some_and(|retry| retry.has_been_retried())
    }

    /// Counts the fallback at most once per invocation
    fn count_fallback(&self) -> MetricsResult<()> {
        if !self.fallback_counted.swap(true, Ordering::AcqRel) {
            self.metrics.increment(FALLBACK_CALLS_TOTAL)?;
        }
        Ok(())
    }

    fn register_breaker_gauges(&self, breaker: &Arc<dyn CircuitBreakerView>) -> MetricsResult<()> {
        let view = Arc::clone(breaker);
        self.metrics
            .gauge(CIRCUIT_BREAKER_OPEN_TOTAL, Arc::new(move || saturating_i64(view.open_nanos())))?;
        let view = Arc::clone(breaker);
        self.metrics.gauge(
            CIRCUIT_BREAKER_CLOSED_TOTAL,
            Arc::new(move || saturating_i64(view.closed_nanos())),
        )?;
        let view = Arc::clone(breaker);
        self.metrics.gauge(
            CIRCUIT_BREAKER_HALF_OPEN_TOTAL,
            Arc::new(move || saturating_i64(view.half_open_nanos())),
        )
    }

    fn register_bulkhead_gauges(&self, bulkhead: &Arc<dyn BulkheadView>) -> MetricsResult<()> {
        let view = Arc::clone(bulkhead);
        self.metrics.gauge(
            BULKHEAD_CONCURRENT_EXECUTIONS,
            Arc::new(move || saturating_i64(view.concurrent_executions() as u64)),
        )?;
        if self.caps().is_async {
            let view = Arc::clone(bulkhead);
            self.metrics.gauge(
                BULKHEAD_WAITING_QUEUE_POPULATION,
                Arc::new(move || saturating_i64(view.queue_size() as u64)),
            )?;
        }
        Ok(())
    }
}

impl MetricsCollector for OperationMetricsCollector {
    fn init(&self, breaker: Option<Arc<dyn CircuitBreakerView>>) {
        self.run_safely("init", || {
            if let Some(breaker) = breaker {
                let _ = self.breaker.set(breaker);
            }
            self.metrics.increment(INVOCATIONS_TOTAL)?;
            if self.caps().has_circuit_breaker {
                if let Some(breaker) = self.breaker.get() {
                    self.register_breaker_gauges(breaker)?;
                }
            }
            Ok(())
        });
    }

    fn before_execute(&self) {
        self.run_safely("before_execute", || {
            *self.started.lock() = Some(Instant::now());
            if self.caps().has_retry && self.has_been_retried() {
                self.metrics.increment(RETRY_RETRIES_TOTAL)?;
            }
            if self.caps().has_bulkhead {
                if let Some(bulkhead) = &self.bulkhead {
                    self.register_bulkhead_gauges(bulkhead)?;
                }
            }
            Ok(())
        });
    }

    fn after_success(&self, report: &AttemptReport) {
        self.run_safely("after_success", || {
            let caps = self.caps();
            if caps.has_retry {
                if self.has_been_retried() {
                    self.metrics.increment(RETRY_CALLS_SUCCEEDED_RETRIED_TOTAL)?;
                } else {
                    self.metrics.increment(RETRY_CALLS_SUCCEEDED_NOT_RETRIED_TOTAL)?;
                }
            }
            if caps.has_timeout {
                self.metrics.increment(TIMEOUT_CALLS_NOT_TIMED_OUT_TOTAL)?;
            }
            if caps.has_circuit_breaker {
                self.metrics.increment(CIRCUIT_BREAKER_CALLS_SUCCEEDED_TOTAL)?;
            }
            if caps.has_bulkhead {
                self.metrics.increment(BULKHEAD_CALLS_ACCEPTED_TOTAL)?;
                let queue_wait = report.queue_wait.unwrap_or_default();
                if let Some(elapsed) = self.elapsed() {
                    self.metrics
                        .record(BULKHEAD_EXECUTION_DURATION, elapsed.saturating_sub(queue_wait))?;
                }
                if caps.is_async {
                    if let Some(waited) = report.queue_wait {
                        self.metrics.record(BULKHEAD_WAITING_DURATION, waited)?;
                    }
                }
            }
            Ok(())
        });
    }

    fn on_error(&self, failure: &ExecutionFailure<'_>) {
        self.run_safely("on_error", || {
            let caps = self.caps();
            let kind = FailureType::of(failure.failure);

            if caps.has_bulkhead {
                if kind.is_rejection() {
                    self.metrics.increment(BULKHEAD_CALLS_REJECTED_TOTAL)?;
                } else if failure.admitted {
                    self.metrics.increment(BULKHEAD_CALLS_ACCEPTED_TOTAL)?;
                }
            }

            if caps.has_circuit_breaker {
                if let Some(breaker) = self.breaker.get() {
                    self.breaker_open_before.store(breaker.is_open(), Ordering::Release);
                    if kind == FailureType::ShortCircuited {
                        self.metrics.increment(CIRCUIT_BREAKER_CALLS_PREVENTED_TOTAL)?;
                    } else if breaker.fails_on(failure.failure) {
                        self.metrics.increment(CIRCUIT_BREAKER_CALLS_FAILED_TOTAL)?;
                    } else {
                        self.metrics.increment(CIRCUIT_BREAKER_CALLS_SUCCEEDED_TOTAL)?;
                    }
                }
            }

            if failure.fallback.invoked() {
                self.count_fallback()?;
            }

            let is_final =
                self.retry.as_ref().map_or(true, |retry| retry.is_final_failure(failure.failure));
            if is_final {
                if caps.has_retry {
                    self.metrics.increment(RETRY_CALLS_FAILED_TOTAL)?;
                }
                if failure.fallback != FallbackOutcome::Recovered {
                    self.metrics.increment(INVOCATIONS_FAILED_TOTAL)?;
                }
            }
            Ok(())
        });
    }

    fn on_processed_error(&self, error: &FaultToleranceError) {
        self.run_safely("on_processed_error", || {
            let caps = self.caps();
            if caps.has_circuit_breaker {
                if let Some(breaker) = self.breaker.get() {
                    let was_open = self.breaker_open_before.load(Ordering::Acquire);
                    if !was_open && breaker.is_open() {
                        self.metrics.increment(CIRCUIT_BREAKER_OPENED_TOTAL)?;
                    }
                }
            }
            if caps.has_timeout {
                if error.is_timeout() {
                    self.metrics.increment(TIMEOUT_CALLS_TIMED_OUT_TOTAL)?;
                } else if !matches!(error, FaultToleranceError::CircuitBreakerOpen) {
                    self.metrics.increment(TIMEOUT_CALLS_NOT_TIMED_OUT_TOTAL)?;
                }
            }
            Ok(())
        });
    }

    fn after_execute(&self, report: &AttemptReport) {
        self.run_safely("after_execute", || {
            if self.caps().has_timeout {
                if let Some(elapsed) = self.elapsed() {
                    self.metrics.record(TIMEOUT_EXECUTION_DURATION, elapsed)?;
                }
            }
            if report.fallback_used {
                self.count_fallback()?;
            }
            Ok(())
        });
    }
}

impl fmt::Debug for OperationMetricsCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationMetricsCollector")
            .field("operation", &self.metrics.prefix)
            .field("retry", &self.retry)
            .field("fallback_counted", &self.fallback_counted.load(Ordering::Acquire))
            .finish()
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use bulwark_domain::{Failure, FailureCategory, RetryConfig};

    use super::*;
    use crate::metrics::registry::InMemoryMetricRegistry;

    const PREFIX: &str = "ft.svc.Orders.place";

    fn metric(suffix: &str) -> String {
        format!("{PREFIX}.{suffix}")
    }

    struct StubBreaker {
        open: AtomicBool,
    }

    impl CircuitBreakerView for StubBreaker {
        fn is_open(&self) -> bool {
            self.open.load(Ordering::Acquire)
        }

        fn fails_on(&self, _failure: &Failure) -> bool {
            true
        }

        fn open_nanos(&self) -> u64 {
            11
        }

        fn closed_nanos(&self) -> u64 {
            22
        }

        fn half_open_nanos(&self) -> u64 {
            0
        }
    }

    struct StubBulkhead {
        running: AtomicUsize,
    }

    impl BulkheadView for StubBulkhead {
        fn concurrent_executions(&self) -> usize {
            self.running.load(Ordering::Acquire)
        }

        fn queue_size(&self) -> usize {
            4
        }
    }

    fn failed() -> Failure {
        FaultToleranceError::failed(FailureCategory::ANY, std::io::Error::other("boom")).into()
    }

    fn collector(
        operation: OperationDescriptor,
        retry: Option<Arc<RetryContext>>,
        bulkhead: Option<Arc<dyn BulkheadView>>,
    ) -> (Arc<InMemoryMetricRegistry>, OperationMetricsCollector) {
        let registry = Arc::new(InMemoryMetricRegistry::new());
        let metrics = Arc::new(OperationMetrics::new(&operation, registry.clone()));
        (registry, OperationMetricsCollector::new(metrics, retry, bulkhead))
    }

    /// Validates the success path across every policy.
    ///
    /// Assertions:
    /// - Ensures invocation, retry, timeout, breaker and bulkhead counters
    ///   move on success.
    /// - Ensures breaker and bulkhead gauges are registered.
    #[test]
    fn test_success_path_counters() {
        let operation = OperationDescriptor::new("svc::Orders", "place")
            .with_retry()
            .with_timeout()
            .with_circuit_breaker()
            .with_bulkhead()
            .asynchronous();
        let bulkhead: Arc<dyn BulkheadView> = Arc::new(StubBulkhead { running: AtomicUsize::new(2) });
        let breaker: Arc<dyn CircuitBreakerView> =
            Arc::new(StubBreaker { open: AtomicBool::new(false) });
        let (registry, collector) = collector(operation, None, Some(bulkhead));

        collector.init(Some(breaker));
        collector.before_execute();
        let report = AttemptReport { queue_wait: Some(Duration::from_millis(1)), fallback_used: false };
        collector.after_success(&report);
        collector.after_execute(&report);

        assert_eq!(registry.counter_value(&metric(INVOCATIONS_TOTAL)), Some(1));
        assert_eq!(registry.counter_value(&metric(RETRY_CALLS_SUCCEEDED_NOT_RETRIED_TOTAL)), Some(1));
        assert_eq!(registry.counter_value(&metric(TIMEOUT_CALLS_NOT_TIMED_OUT_TOTAL)), Some(1));
        assert_eq!(registry.counter_value(&metric(CIRCUIT_BREAKER_CALLS_SUCCEEDED_TOTAL)), Some(1));
        assert_eq!(registry.counter_value(&metric(BULKHEAD_CALLS_ACCEPTED_TOTAL)), Some(1));
        assert_eq!(registry.gauge_value(&metric(CIRCUIT_BREAKER_OPEN_TOTAL)), Some(11));
        assert_eq!(registry.gauge_value(&metric(BULKHEAD_CONCURRENT_EXECUTIONS)), Some(2));
        assert_eq!(registry.gauge_value(&metric(BULKHEAD_WAITING_QUEUE_POPULATION)), Some(4));
        assert_eq!(
            registry.histogram_snapshot(&metric(BULKHEAD_WAITING_DURATION)).map(|s| s.count()),
            Some(1)
        );
        assert_eq!(
            registry.histogram_snapshot(&metric(TIMEOUT_EXECUTION_DURATION)).map(|s| s.count()),
            Some(1)
        );
        assert_eq!(registry.counter_value(&metric(INVOCATIONS_FAILED_TOTAL)), None);
    }

    /// Validates the fallback counter on a recovered failure.
    ///
    /// Assertions:
    /// - Ensures the fallback is counted once even though two hooks report it.
    /// - Ensures a recovered invocation is not counted as failed.
    #[test]
    fn test_fallback_counted_once() {
        let operation = OperationDescriptor::new("svc::Orders", "place").with_fallback();
        let (registry, collector) = collector(operation, None, None);
        let failure = failed();

        collector.init(None);
        collector.before_execute();
        collector.on_error(
            &ExecutionFailure::new(&failure).with_fallback(FallbackOutcome::Recovered),
        );
        collector.after_execute(&AttemptReport { queue_wait: None, fallback_used: true });

        assert_eq!(registry.counter_value(&metric(FALLBACK_CALLS_TOTAL)), Some(1));
        assert_eq!(registry.counter_value(&metric(INVOCATIONS_FAILED_TOTAL)), None);
    }

    /// Validates the fallback is counted from the runtime outcome alone.
    ///
    /// Assertions:
    /// - Ensures an operation not declared with a fallback still counts a
    ///   fallback that recovered the call.
    #[test]
    fn test_fallback_counted_without_declared_capability() {
        let operation = OperationDescriptor::new("svc::Orders", "place");
        let (registry, collector) = collector(operation, None, None);
        let failure = failed();

        collector.init(None);
        collector.before_execute();
        collector.on_error(
            &ExecutionFailure::new(&failure).with_fallback(FallbackOutcome::Recovered),
        );
        collector.after_execute(&AttemptReport { queue_wait: None, fallback_used: true });

        assert_eq!(registry.counter_value(&metric(FALLBACK_CALLS_TOTAL)), Some(1));
    }

    /// Validates bulkhead acceptance follows admission.
    ///
    /// Assertions:
    /// - Ensures a call that timed out while still queued is neither accepted
    ///   nor rejected.
    /// - Ensures an admitted call that timed out is accepted.
    #[test]
    fn test_bulkhead_accepts_only_admitted_calls() {
        let operation =
            OperationDescriptor::new("svc::Orders", "place").with_bulkhead().asynchronous();
        let (registry, collector) = collector(operation, None, None);
        let timed_out =
            Failure::from(FaultToleranceError::Timeout { timeout: Duration::from_millis(5) });

        collector.init(None);
        collector.before_execute();
        collector.on_error(&ExecutionFailure::new(&timed_out).with_admitted(false));
        assert_eq!(registry.counter_value(&metric(BULKHEAD_CALLS_ACCEPTED_TOTAL)), None);
        assert_eq!(registry.counter_value(&metric(BULKHEAD_CALLS_REJECTED_TOTAL)), None);

        collector.on_error(&ExecutionFailure::new(&timed_out));
        assert_eq!(registry.counter_value(&metric(BULKHEAD_CALLS_ACCEPTED_TOTAL)), Some(1));
    }

    /// Validates breaker transitions seen through the hooks.
    ///
    /// Assertions:
    /// - Ensures `opened` moves only when the breaker opened during this
    ///   attempt.
    /// - Ensures short-circuited attempts count as prevented.
    #[test]
    fn test_breaker_opened_and_prevented() {
        let operation = OperationDescriptor::new("svc::Orders", "place").with_circuit_breaker();
        let (registry, collector) = collector(operation, None, None);
        let breaker = Arc::new(StubBreaker { open: AtomicBool::new(false) });
        let failure = failed();

        let view: Arc<dyn CircuitBreakerView> = breaker.clone();
        collector.init(Some(view));
        collector.before_execute();
        collector.on_error(&ExecutionFailure::new(&failure));
        breaker.open.store(true, Ordering::Release);
        collector.on_processed_error(failure.as_error().expect("error failure"));

        let prevented = Failure::from(FaultToleranceError::CircuitBreakerOpen);
        collector.on_error(&ExecutionFailure::new(&prevented));
        collector.on_processed_error(&FaultToleranceError::CircuitBreakerOpen);

        assert_eq!(registry.counter_value(&metric(CIRCUIT_BREAKER_CALLS_FAILED_TOTAL)), Some(1));
        assert_eq!(registry.counter_value(&metric(CIRCUIT_BREAKER_OPENED_TOTAL)), Some(1));
        assert_eq!(registry.counter_value(&metric(CIRCUIT_BREAKER_CALLS_PREVENTED_TOTAL)), Some(1));
        assert_eq!(registry.counter_value(&metric(INVOCATIONS_FAILED_TOTAL)), Some(2));
    }

    /// Validates retry accounting on a non-final failure.
    ///
    /// Assertions:
    /// - Ensures a retryable failure is not counted as a failed invocation.
    /// - Ensures the next attempt increments `retry.retries.total`.
    #[tokio::test]
    async fn test_retry_counters() {
        let config = RetryConfig::builder().max_retries(1).no_jitter().build().expect("valid");
        let retry = Arc::new(RetryContext::new(Arc::new(config)));
        let operation = OperationDescriptor::new("svc::Orders", "place").with_retry();
        let (registry, collector) = collector(operation, Some(retry.clone()), None);

        collector.init(None);
        collector.before_execute();
        collector.on_error(&ExecutionFailure::new(&failed()));
        assert!(retry.next_retry(failed()).await.is_retry());
        collector.before_execute();
        collector.after_success(&AttemptReport::default());

        assert_eq!(registry.counter_value(&metric(RETRY_RETRIES_TOTAL)), Some(1));
        assert_eq!(registry.counter_value(&metric(RETRY_CALLS_SUCCEEDED_RETRIED_TOTAL)), Some(1));
        assert_eq!(registry.counter_value(&metric(RETRY_CALLS_FAILED_TOTAL)), None);
        assert_eq!(registry.counter_value(&metric(INVOCATIONS_FAILED_TOTAL)), None);
    }

    /// Validates that hook failures never escape.
    ///
    /// Assertions:
    /// - Ensures a kind conflict in the registry is swallowed.
    /// - Ensures a panicking gauge view does not reach the caller.
    #[test]
    fn test_hook_failures_are_contained() {
        let operation = OperationDescriptor::new("svc::Orders", "place");
        let registry = Arc::new(InMemoryMetricRegistry::new());
        registry
            .record(
                MetricKey::new(operation.prefix_handle(), INVOCATIONS_TOTAL),
                Duration::from_millis(1),
            )
            .expect("histogram");
        let metrics = Arc::new(OperationMetrics::new(&operation, registry.clone()));
        let collector = OperationMetricsCollector::new(metrics, None, None);

        collector.init(None);
        collector.run_safely("test", || panic!("hook exploded"));
        assert_eq!(registry.counter_value(&metric(INVOCATIONS_TOTAL)), None);
    }
}
