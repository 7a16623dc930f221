//! Builder for [`GuardedExecutor`]

use std::sync::Arc;

use bulwark_common::resilience::{Bulkhead, BulkheadMode};
use bulwark_common::time::SystemClock;
use bulwark_core::breaker::{CircuitBreakerPolicy, FailurePredicate};
use bulwark_core::metrics::{InMemoryMetricRegistry, MetricsCollectorFactory};
use bulwark_domain::{
    BulkheadConfig, CircuitBreakerConfig, FailureCategory, FaultToleranceSettings,
    OperationDescriptor, RetryConfig, TimeoutConfig,
};
use tracing::debug;

use super::guarded::{GuardedExecutor, SharedClock};
use crate::errors::InfraResult;

/// Assembles the policies guarding one operation
///
/// Policies are enabled by configuring them. Settings passed through
/// [`settings`](Self::settings) only override policies that are already
/// configured; they never enable a policy on their own.
pub struct GuardedExecutorBuilder {
    target: String,
    name: String,
    retry: Option<RetryConfig>,
    timeout: Option<TimeoutConfig>,
    circuit_breaker: Option<CircuitBreakerConfig>,
    failure_predicate: Option<Arc<dyn FailurePredicate>>,
    bulkhead: Option<BulkheadConfig>,
    fallback: bool,
    asynchronous: bool,
    clock: SharedClock,
    metrics: Option<Arc<MetricsCollectorFactory>>,
    settings: Option<(FaultToleranceSettings, Vec<FailureCategory>)>,
}

impl GuardedExecutorBuilder {
    pub fn new(target: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            name: name.into(),
            retry: None,
            timeout: None,
            circuit_breaker: None,
            failure_predicate: None,
            bulkhead: None,
            fallback: false,
            asynchronous: false,
            clock: Arc::new(SystemClock),
            metrics: None,
            settings: None,
        }
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    pub fn timeout(mut self, config: TimeoutConfig) -> Self {
        self.timeout = Some(config);
        self
    }

    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(config);
        self
    }

    /// Replace the category predicate derived from the breaker config
    pub fn failure_predicate(mut self, predicate: Arc<dyn FailurePredicate>) -> Self {
        self.failure_predicate = Some(predicate);
        self
    }

    pub fn bulkhead(mut self, config: BulkheadConfig) -> Self {
        self.bulkhead = Some(config);
        self
    }

    /// Declare that invocations may supply a fallback
    pub fn fallback(mut self) -> Self {
        self.fallback = true;
        self
    }

    /// Let calls queue in the bulkhead instead of being rejected outright
    pub fn asynchronous(mut self) -> Self {
        self.asynchronous = true;
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(mut self, factory: Arc<MetricsCollectorFactory>) -> Self {
        self.metrics = Some(factory);
        self
    }

    /// Overrides looked up by the operation's metric prefix at build time
    pub fn settings(mut self, settings: &FaultToleranceSettings, catalogue: &[FailureCategory]) -> Self {
        self.settings = Some((settings.clone(), catalogue.to_vec()));
        self
    }

    /// Validate and assemble the executor
    ///
    /// # Errors
    /// Returns [`InfraError::Config`](crate::errors::InfraError::Config) when
    /// a setting override does not resolve or validate, or when a runtime
    /// rejects its configuration.
    pub fn build(self) -> InfraResult<GuardedExecutor> {
        let Self {
            target,
            name,
            mut retry,
            mut timeout,
            mut circuit_breaker,
            failure_predicate,
            mut bulkhead,
            fallback,
            asynchronous,
            clock,
            metrics,
            settings,
        } = self;

        let mut descriptor = OperationDescriptor::new(target, name);

        if let Some((settings, catalogue)) = &settings {
            if let Some(overrides) = settings.operation(descriptor.prefix()) {
                debug!(operation = %descriptor, "Applying settings overrides");
                if let (Some(config), Some(patch)) = (&retry, &overrides.retry) {
                    retry = Some(patch.apply(config.clone(), catalogue)?);
                }
                if let (Some(config), Some(patch)) = (&circuit_breaker, &overrides.circuit_breaker) {
                    circuit_breaker = Some(patch.apply(config.clone(), catalogue)?);
                }
                if let (Some(config), Some(patch)) = (&bulkhead, &overrides.bulkhead) {
                    bulkhead = Some(patch.apply(config.clone())?);
                }
                if let (Some(config), Some(patch)) = (timeout, &overrides.timeout) {
                    timeout = Some(patch.apply(config)?);
                }
            }
        }

        if retry.is_some() {
            descriptor = descriptor.with_retry();
        }
        if timeout.is_some() {
            descriptor = descriptor.with_timeout();
        }
        if circuit_breaker.is_some() {
            descriptor = descriptor.with_circuit_breaker();
        }
        if bulkhead.is_some() {
            descriptor = descriptor.with_bulkhead();
        }
        if fallback {
            descriptor = descriptor.with_fallback();
        }
        if asynchronous {
            descriptor = descriptor.asynchronous();
        }

        let breaker = match circuit_breaker {
            Some(config) => {
                let policy = CircuitBreakerPolicy::with_clock(config, Arc::clone(&clock))?;
                let policy = match failure_predicate {
                    Some(predicate) => policy.with_predicate(predicate),
                    None => policy,
                };
                Some(Arc::new(policy))
            }
            None => None,
        };

        let bulkhead = match bulkhead {
            Some(config) => {
                let mode = if asynchronous { BulkheadMode::Queued } else { BulkheadMode::Semaphore };
                Some(Arc::new(Bulkhead::new(config, mode)?))
            }
            None => None,
        };

        let metrics = metrics.unwrap_or_else(|| {
            Arc::new(MetricsCollectorFactory::with_enabled(
                Arc::new(InMemoryMetricRegistry::new()),
                false,
            ))
        });

        debug!(operation = %descriptor, capabilities = ?descriptor.capabilities(), "Guarded executor built");

        Ok(GuardedExecutor::from_parts(
            descriptor,
            retry.map(Arc::new),
            timeout,
            breaker,
            bulkhead,
            clock,
            metrics,
        ))
    }
}
