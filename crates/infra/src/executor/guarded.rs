//! Guarded execution
//!
//! Policies wrap the operation in a fixed order, outermost first:
//!
//! ```text
//! Fallback ▸ Retry ▸ CircuitBreaker ▸ Timeout ▸ Bulkhead ▸ operation
//! ```
//!
//! Each invocation gets its own [`RetryContext`] and metrics collector; the
//! breaker, bulkhead and metric binding are shared by every invocation of
//! the executor.

use std::fmt;
use std::future::{Future, Ready};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bulwark_common::resilience::{BreakerPermit, Bulkhead, BulkheadMode};
use bulwark_common::time::Clock;
use bulwark_core::breaker::CircuitBreakerPolicy;
use bulwark_core::metrics::{
    AttemptReport, BulkheadView, CircuitBreakerView, ExecutionFailure, FallbackOutcome,
    MetricsCollector, MetricsCollectorFactory,
};
use bulwark_core::retry::{RetryContext, RetryVerdict};
use bulwark_domain::{
    Failure, FaultToleranceError, OperationDescriptor, PanicPayload, RetryConfig, TimeoutConfig,
};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::builder::GuardedExecutorBuilder;

/// Clock shared by the retry budget and the circuit breaker
pub type SharedClock = Arc<dyn Clock>;

type NoFallback<T> = fn(&Failure) -> Ready<Result<T, FaultToleranceError>>;

/// Outcome of one pass through breaker, timeout and bulkhead
struct Attempt<'a, T> {
    result: Result<T, Failure>,
    /// Time spent queueing when the bulkhead queued the call
    queue_wait: Option<Duration>,
    /// Whether the call got past the bulkhead
    admitted: bool,
    /// Settled once the outcome is known; dropping it releases a trial slot
    permit: Option<BreakerPermit<'a, SharedClock>>,
}

/// Runs an operation under its configured policies
pub struct GuardedExecutor {
    descriptor: OperationDescriptor,
    retry: Option<Arc<RetryConfig>>,
    timeout: Option<TimeoutConfig>,
    breaker: Option<Arc<CircuitBreakerPolicy<SharedClock>>>,
    bulkhead: Option<Arc<Bulkhead>>,
    clock: SharedClock,
    metrics: Arc<MetricsCollectorFactory>,
}

impl GuardedExecutor {
    pub fn builder(target: impl Into<String>, name: impl Into<String>) -> GuardedExecutorBuilder {
        GuardedExecutorBuilder::new(target, name)
    }

    pub(super) fn from_parts(
        descriptor: OperationDescriptor,
        retry: Option<Arc<RetryConfig>>,
        timeout: Option<TimeoutConfig>,
        breaker: Option<Arc<CircuitBreakerPolicy<SharedClock>>>,
        bulkhead: Option<Arc<Bulkhead>>,
        clock: SharedClock,
        metrics: Arc<MetricsCollectorFactory>,
    ) -> Self {
        Self { descriptor, retry, timeout, breaker, bulkhead, clock, metrics }
    }

    pub fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    pub fn retry_config(&self) -> Option<&RetryConfig> {
        self.retry.as_deref()
    }

    pub fn timeout_config(&self) -> Option<TimeoutConfig> {
        self.timeout
    }

    pub fn circuit_breaker(&self) -> Option<&CircuitBreakerPolicy<SharedClock>> {
        self.breaker.as_deref()
    }

    pub fn bulkhead(&self) -> Option<&Bulkhead> {
        self.bulkhead.as_deref()
    }

    pub fn metrics(&self) -> &MetricsCollectorFactory {
        &self.metrics
    }

    /// Run `operation` under every configured policy
    ///
    /// `operation` is called once per attempt.
    ///
    /// # Errors
    /// Returns the failure that ended the invocation: the last classified
    /// failure once retries are exhausted, a policy rejection, or
    /// [`FaultToleranceError::NonErrorFailure`] for a panicking operation.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, FaultToleranceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FaultToleranceError>>,
    {
        self.run(operation, None::<NoFallback<T>>, None).await
    }

    /// Like [`execute`](Self::execute), substituting `fallback` for a final
    /// non-fatal failure
    ///
    /// # Errors
    /// Returns the fallback's own error when it fails, and fatal failures
    /// untouched.
    pub async fn execute_with_fallback<T, F, Fut, FB, FbFut>(
        &self,
        operation: F,
        fallback: FB,
    ) -> Result<T, FaultToleranceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FaultToleranceError>>,
        FB: FnOnce(&Failure) -> FbFut,
        FbFut: Future<Output = Result<T, FaultToleranceError>>,
    {
        self.run(operation, Some(fallback), None).await
    }

    /// Like [`execute`](Self::execute), abandoning a pending retry backoff
    /// when `interrupt` is cancelled
    ///
    /// # Errors
    /// Returns [`FaultToleranceError::Interrupted`] when the backoff is
    /// interrupted.
    pub async fn execute_interruptible<T, F, Fut>(
        &self,
        interrupt: CancellationToken,
        operation: F,
    ) -> Result<T, FaultToleranceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FaultToleranceError>>,
    {
        self.run(operation, None::<NoFallback<T>>, Some(interrupt)).await
    }

    #[instrument(name = "guarded", skip_all, fields(operation = %self.descriptor))]
    async fn run<T, F, Fut, FB, FbFut>(
        &self,
        mut operation: F,
        mut fallback: Option<FB>,
        interrupt: Option<CancellationToken>,
    ) -> Result<T, FaultToleranceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FaultToleranceError>>,
        FB: FnOnce(&Failure) -> FbFut,
        FbFut: Future<Output = Result<T, FaultToleranceError>>,
    {
        let retry = self.retry.as_ref().map(|config| {
            let context = RetryContext::with_clock(Arc::clone(config), Arc::clone(&self.clock));
            Arc::new(match interrupt {
                Some(token) => context.with_interrupt(token),
                None => context,
            })
        });
        let bulkhead_view =
            self.bulkhead.as_ref().map(|bulkhead| Arc::clone(bulkhead) as Arc<dyn BulkheadView>);
        let collector = self.metrics.create_collector(&self.descriptor, retry.clone(), bulkhead_view);
        collector.init(
            self.breaker.as_ref().map(|breaker| Arc::clone(breaker) as Arc<dyn CircuitBreakerView>),
        );

        loop {
            collector.before_execute();
            let Attempt { result, queue_wait, admitted, permit } = self.attempt(&mut operation).await;

            let failure = match result {
                Ok(value) => {
                    if let Some(permit) = permit {
                        permit.record_success();
                    }
                    let report = AttemptReport { queue_wait, fallback_used: false };
                    collector.after_success(&report);
                    collector.after_execute(&report);
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            let short_circuited = self.breaker.is_some() && permit.is_none();
            if short_circuited {
                if let Some(context) = &retry {
                    context.cancel();
                }
            }
            let is_final =
                retry.as_ref().map_or(true, |context| context.is_final_failure(&failure));

            let mut outcome = FallbackOutcome::NotInvoked;
            let mut fallback_result = None;
            if is_final && !failure.is_fatal() {
                if let Some(fallback) = fallback.take() {
                    debug!(category = ?failure.category(), "Invoking fallback");
                    let pending = fallback(&failure);
                    let result = pending.await;
                    outcome = if result.is_ok() {
                        FallbackOutcome::Recovered
                    } else {
                        FallbackOutcome::Failed
                    };
                    fallback_result = Some(result);
                }
            }

            collector.on_error(
                &ExecutionFailure::new(&failure).with_fallback(outcome).with_admitted(admitted),
            );
            if let (Some(breaker), Some(permit)) = (&self.breaker, permit) {
                breaker.record_failure(permit, &failure);
            }
            report_processed(collector.as_ref(), &failure);
            collector.after_execute(&AttemptReport {
                queue_wait,
                fallback_used: outcome == FallbackOutcome::Recovered,
            });

            if let Some(result) = fallback_result {
                return result;
            }

            match &retry {
                Some(context) if !is_final => match context.next_retry(failure).await {
                    RetryVerdict::Retry => continue,
                    RetryVerdict::Propagate(error) => return Err(error),
                },
                _ => {
                    if failure.is_fatal() {
                        warn!("Fatal failure, propagating");
                    }
                    return Err(failure.into_error());
                }
            }
        }
    }

    /// One pass through breaker, timeout and bulkhead
    async fn attempt<T, F, Fut>(&self, operation: &mut F) -> Attempt<'_, T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FaultToleranceError>>,
    {
        let permit = match &self.breaker {
            Some(breaker) => match breaker.try_acquire() {
                Some(permit) => Some(permit),
                None => {
                    debug!("Circuit breaker open, short-circuiting");
                    return Attempt {
                        result: Err(FaultToleranceError::CircuitBreakerOpen.into()),
                        queue_wait: None,
                        admitted: false,
                        permit: None,
                    };
                }
            },
            None => None,
        };

        let mut queue_wait = None;
        let mut admitted = self.bulkhead.is_none();
        let guarded = async {
            let _slot = match &self.bulkhead {
                Some(bulkhead) => match bulkhead.acquire().await {
                    Ok(slot) => {
                        admitted = true;
                        if bulkhead.mode() == BulkheadMode::Queued {
                            queue_wait = Some(slot.waited());
                        }
                        Some(slot)
                    }
                    Err(rejection) => {
                        return Err(Failure::from(FaultToleranceError::BulkheadRejected {
                            rejection,
                        }));
                    }
                },
                None => None,
            };

            match AssertUnwindSafe(operation()).catch_unwind().await {
                Ok(result) => result.map_err(Failure::from),
                Err(payload) => Err(Failure::Panic(PanicPayload::new(payload))),
            }
        };

        let result = match self.timeout {
            Some(config) => match tokio::time::timeout(config.timeout, guarded).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(timeout_ms = config.timeout.as_millis() as u64, "Attempt timed out");
                    Err(FaultToleranceError::Timeout { timeout: config.timeout }.into())
                }
            },
            None => guarded.await,
        };

        Attempt { result, queue_wait, admitted, permit }
    }
}

fn report_processed(collector: &dyn MetricsCollector, failure: &Failure) {
    match failure {
        Failure::Error(error) => collector.on_processed_error(error),
        Failure::Panic(payload) => collector
            .on_processed_error(&FaultToleranceError::NonErrorFailure { message: payload.message() }),
    }
}

impl fmt::Debug for GuardedExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedExecutor")
            .field("descriptor", &self.descriptor)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("breaker", &self.breaker)
            .field("bulkhead", &self.bulkhead)
            .field("metrics", &self.metrics)
            .finish()
    }
}
