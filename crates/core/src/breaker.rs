//! Circuit breaker failure predicates
//!
//! A [`FailurePredicate`] decides whether a failure counts against the
//! breaker. [`CircuitBreakerPolicy`] pairs a predicate with the breaker
//! runtime so the executor and the metrics layer agree on every outcome.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bulwark_common::resilience::{BreakerPermit, CircuitBreaker, CircuitState};
use bulwark_common::time::{Clock, SystemClock};
use bulwark_domain::{CircuitBreakerConfig, ConfigResult, Failure, FailureCategory};

/// Decides whether a failure is a circuit breaker failure
pub trait FailurePredicate: Send + Sync + fmt::Debug {
    fn fails_on(&self, failure: &Failure) -> bool;
}

/// Every failure counts
#[derive(Debug, Clone, Copy, Default)]
pub struct AllFailures;

impl FailurePredicate for AllFailures {
    fn fails_on(&self, _failure: &Failure) -> bool {
        true
    }
}

/// Category-driven predicate
///
/// `skip_on` wins over `fail_on`. Panic payloads carry no category and
/// always count as failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryFailurePredicate {
    fail_on: Vec<FailureCategory>,
    skip_on: Vec<FailureCategory>,
}

impl CategoryFailurePredicate {
    pub fn new(fail_on: Vec<FailureCategory>, skip_on: Vec<FailureCategory>) -> Self {
        Self { fail_on, skip_on }
    }

    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self::new(config.fail_on.clone(), config.skip_on.clone())
    }
}

impl FailurePredicate for CategoryFailurePredicate {
    fn fails_on(&self, failure: &Failure) -> bool {
        match failure.category() {
            None => true,
            Some(category) => {
                !category.matches_any(&self.skip_on) && category.matches_any(&self.fail_on)
            }
        }
    }
}

/// Circuit breaker runtime plus the predicate that feeds it
pub struct CircuitBreakerPolicy<C: Clock = SystemClock> {
    breaker: CircuitBreaker<C>,
    predicate: Arc<dyn FailurePredicate>,
}

impl<C: Clock> Clone for CircuitBreakerPolicy<C> {
    fn clone(&self) -> Self {
        Self { breaker: self.breaker.clone(), predicate: Arc::clone(&self.predicate) }
    }
}

impl<C: Clock> fmt::Debug for CircuitBreakerPolicy<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerPolicy")
            .field("breaker", &self.breaker)
            .field("predicate", &self.predicate)
            .finish()
    }
}

impl CircuitBreakerPolicy<SystemClock> {
    /// Breaker using the category predicate derived from `config`
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> CircuitBreakerPolicy<C> {
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        let predicate = Arc::new(CategoryFailurePredicate::from_config(&config));
        let breaker = CircuitBreaker::with_clock(config, clock)?;
        Ok(Self { breaker, predicate })
    }

    /// Replace the predicate
    pub fn with_predicate(mut self, predicate: Arc<dyn FailurePredicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn breaker(&self) -> &CircuitBreaker<C> {
        &self.breaker
    }

    /// Admit one call, or `None` to short-circuit it
    pub fn try_acquire(&self) -> Option<BreakerPermit<'_, C>> {
        self.breaker.try_acquire()
    }

    /// Settle `permit` with a failed call; failures the predicate skips
    /// count as successes
    pub fn record_failure(&self, permit: BreakerPermit<'_, C>, failure: &Failure) {
        if self.predicate.fails_on(failure) {
            permit.record_failure();
        } else {
            permit.record_success();
        }
    }

    pub fn fails_on(&self, failure: &Failure) -> bool {
        self.predicate.fails_on(failure)
    }

    pub fn state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn time_in_state(&self, state: CircuitState) -> Duration {
        self.breaker.time_in_state(state)
    }
}
