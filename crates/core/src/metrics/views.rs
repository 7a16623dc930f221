//! Collector views over the policy runtimes

use bulwark_common::resilience::{Bulkhead, CircuitState};
use bulwark_common::time::Clock;
use bulwark_domain::Failure;

use super::collector::{BulkheadView, CircuitBreakerView};
use crate::breaker::CircuitBreakerPolicy;

fn nanos(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

impl<C: Clock> CircuitBreakerView for CircuitBreakerPolicy<C> {
    fn is_open(&self) -> bool {
        self.breaker().is_open()
    }

    fn fails_on(&self, failure: &Failure) -> bool {
        CircuitBreakerPolicy::fails_on(self, failure)
    }

    fn open_nanos(&self) -> u64 {
        nanos(self.time_in_state(CircuitState::Open))
    }

    fn closed_nanos(&self) -> u64 {
        nanos(self.time_in_state(CircuitState::Closed))
    }

    fn half_open_nanos(&self) -> u64 {
        nanos(self.time_in_state(CircuitState::HalfOpen))
    }
}

impl BulkheadView for Bulkhead {
    fn concurrent_executions(&self) -> usize {
        Bulkhead::concurrent_executions(self)
    }

    fn queue_size(&self) -> usize {
        Bulkhead::queue_size(self)
    }
}
