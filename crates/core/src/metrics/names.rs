//! Metric names
//!
//! Every metric is keyed by the operation prefix (`ft.<target>.<name>`) and
//! one of the suffixes below.

use std::fmt;
use std::sync::Arc;

pub const INVOCATIONS_TOTAL: &str = "invocations.total";
pub const INVOCATIONS_FAILED_TOTAL: &str = "invocations.failed.total";

pub const RETRY_RETRIES_TOTAL: &str = "retry.retries.total";
pub const RETRY_CALLS_SUCCEEDED_RETRIED_TOTAL: &str = "retry.callsSucceededRetried.total";
pub const RETRY_CALLS_SUCCEEDED_NOT_RETRIED_TOTAL: &str = "retry.callsSucceededNotRetried.total";
pub const RETRY_CALLS_FAILED_TOTAL: &str = "retry.callsFailed.total";

pub const TIMEOUT_EXECUTION_DURATION: &str = "timeout.executionDuration";
pub const TIMEOUT_CALLS_TIMED_OUT_TOTAL: &str = "timeout.callsTimedOut.total";
pub const TIMEOUT_CALLS_NOT_TIMED_OUT_TOTAL: &str = "timeout.callsNotTimedOut.total";

pub const CIRCUIT_BREAKER_OPENED_TOTAL: &str = "circuitbreaker.opened.total";
pub const CIRCUIT_BREAKER_OPEN_TOTAL: &str = "circuitbreaker.open.total";
pub const CIRCUIT_BREAKER_CLOSED_TOTAL: &str = "circuitbreaker.closed.total";
pub const CIRCUIT_BREAKER_HALF_OPEN_TOTAL: &str = "circuitbreaker.halfOpen.total";
pub const CIRCUIT_BREAKER_CALLS_SUCCEEDED_TOTAL: &str = "circuitbreaker.callsSucceeded.total";
pub const CIRCUIT_BREAKER_CALLS_FAILED_TOTAL: &str = "circuitbreaker.callsFailed.total";
pub const CIRCUIT_BREAKER_CALLS_PREVENTED_TOTAL: &str = "circuitbreaker.callsPrevented.total";

pub const BULKHEAD_CALLS_ACCEPTED_TOTAL: &str = "bulkhead.callsAccepted.total";
pub const BULKHEAD_CALLS_REJECTED_TOTAL: &str = "bulkhead.callsRejected.total";
pub const BULKHEAD_EXECUTION_DURATION: &str = "bulkhead.executionDuration";
pub const BULKHEAD_WAITING_DURATION: &str = "bulkhead.waitingDuration";
pub const BULKHEAD_CONCURRENT_EXECUTIONS: &str = "bulkhead.concurrentExecutions";
pub const BULKHEAD_WAITING_QUEUE_POPULATION: &str = "bulkhead.waitingQueue.population";

pub const FALLBACK_CALLS_TOTAL: &str = "fallback.calls.total";

/// Fully qualified metric key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey {
    prefix: Arc<str>,
    suffix: &'static str,
}

impl MetricKey {
    pub fn new(prefix: Arc<str>, suffix: &'static str) -> Self {
        Self { prefix, suffix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> &'static str {
        self.suffix
    }

    /// Whether this key renders as `name`
    pub fn matches(&self, name: &str) -> bool {
        name.len() == self.prefix.len() + 1 + self.suffix.len()
            && name.starts_with(&*self.prefix)
            && name.as_bytes()[self.prefix.len()] == b'.'
            && name.ends_with(self.suffix)
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.prefix, self.suffix)
    }
}
