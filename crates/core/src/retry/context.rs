//! Per-invocation retry state machine
//!
//! One [`RetryContext`] lives for the whole of a guarded invocation. Its
//! decision flag moves `Unset -> Retry | NoRetry` and back to `Unset` each
//! time a retry is actually taken, so every question asked about one failed
//! attempt gets the same answer.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bulwark_common::time::{Clock, SystemClock};
use bulwark_domain::{Failure, FaultToleranceError, MaxRetries, RetryConfig};
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::classifier::{Classification, FailureClassifier};

const DECISION_UNSET: u8 = 0;
const DECISION_RETRY: u8 = 1;
const DECISION_NO_RETRY: u8 = 2;

/// Remaining-retry sentinel for unlimited retries
const UNLIMITED: u32 = u32::MAX;

/// What the executor must do after a failed attempt
#[derive(Debug)]
pub enum RetryVerdict {
    /// Run the operation again
    Retry,
    /// Stop and surface this error
    Propagate(FaultToleranceError),
}

impl RetryVerdict {
    pub fn is_retry(&self) -> bool {
        matches!(self, RetryVerdict::Retry)
    }
}

/// Retry state for one invocation
pub struct RetryContext {
    config: Arc<RetryConfig>,
    clock: Arc<dyn Clock>,
    started_at: Instant,
    unlimited: bool,
    remaining: AtomicU32,
    retries: AtomicU32,
    decision: AtomicU8,
    interrupt: CancellationToken,
}

impl RetryContext {
    /// Context measured against the system clock
    pub fn new(config: Arc<RetryConfig>) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: Arc<RetryConfig>, clock: Arc<dyn Clock>) -> Self {
        let (unlimited, remaining) = match config.max_retries {
            MaxRetries::Unlimited => (true, UNLIMITED),
            MaxRetries::Limited(retries) => (false, retries),
        };
        let started_at = clock.now();
        Self {
            config,
            clock,
            started_at,
            unlimited,
            remaining: AtomicU32::new(remaining),
            retries: AtomicU32::new(0),
            decision: AtomicU8::new(DECISION_UNSET),
            interrupt: CancellationToken::new(),
        }
    }

    /// Interrupt backoffs when `token` is cancelled instead of through a
    /// private token
    pub fn with_interrupt(mut self, token: CancellationToken) -> Self {
        self.interrupt = token;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Handle that interrupts a pending backoff when cancelled
    pub fn interrupt_handle(&self) -> CancellationToken {
        self.interrupt.clone()
    }

    /// Interrupt a pending or future backoff
    pub fn interrupt(&self) {
        self.interrupt.cancel();
    }

    /// Permanently stop retrying: no retries remain and the decision is
    /// pinned to "no retry"
    pub fn cancel(&self) {
        self.remaining.store(0, Ordering::Release);
        self.decision.store(DECISION_NO_RETRY, Ordering::Release);
    }

    /// Whether exactly one retry remains
    pub fn is_last_attempt(&self) -> bool {
        self.remaining.load(Ordering::Acquire) == 1
    }

    /// Whether any retry remains
    pub fn should_retry(&self) -> bool {
        self.remaining.load(Ordering::Acquire) > 0
    }

    /// Retries left; `None` when unlimited
    pub fn remaining_attempts(&self) -> Option<u32> {
        let remaining = self.remaining.load(Ordering::Acquire);
        if self.unlimited && remaining != 0 {
            None
        } else {
            Some(remaining)
        }
    }

    /// Attempts started so far
    pub fn attempts_made(&self) -> u32 {
        self.retries.load(Ordering::Acquire).saturating_add(1)
    }

    pub fn has_been_retried(&self) -> bool {
        self.retries.load(Ordering::Acquire) > 0
    }

    /// Time since the invocation started
    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed_since(self.started_at)
    }

    /// Whether `failure` should be retried
    ///
    /// The first answer given for a failed attempt sticks until the retry is
    /// taken; concurrent callers all observe the winning decision.
    pub fn should_retry_on(&self, failure: &Failure) -> bool {
        match self.decision.load(Ordering::Acquire) {
            DECISION_RETRY => return true,
            DECISION_NO_RETRY => return false,
            _ => {}
        }

        let verdict = self.evaluate(failure);
        let flag = if verdict { DECISION_RETRY } else { DECISION_NO_RETRY };
        match self.decision.compare_exchange(
            DECISION_UNSET,
            flag,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => verdict,
            Err(existing) => existing == DECISION_RETRY,
        }
    }

    fn evaluate(&self, failure: &Failure) -> bool {
        if !self.should_retry() {
            return false;
        }
        match FailureClassifier::classify(failure, &self.config.retry_on, &self.config.abort_on) {
            Classification::Retryable => {}
            Classification::Fatal | Classification::Abort | Classification::NotRetryable => {
                return false
            }
        }
        if self.config.max_duration.is_zero() {
            return true;
        }
        self.elapsed() <= self.config.max_duration
    }

    /// Whether `failure` ends the invocation
    pub fn is_final_failure(&self, failure: &Failure) -> bool {
        failure.is_fatal() || !self.should_retry_on(failure)
    }

    /// Backoff for the next retry: `delay` plus a uniform offset in
    /// `[-jitter, +jitter]`, never below zero
    pub fn compute_delay(&self) -> Duration {
        let delay_ms = duration_millis(self.config.delay);
        let jitter_ms = duration_millis(self.config.jitter);
        if jitter_ms == 0 {
            return Duration::from_millis(delay_ms);
        }
        let jitter = i64::try_from(jitter_ms).unwrap_or(i64::MAX);
        let offset = rand::thread_rng().gen_range(-jitter..=jitter);
        let base = i64::try_from(delay_ms).unwrap_or(i64::MAX);
        let total = base.saturating_add(offset).max(0);
        Duration::from_millis(u64::try_from(total).unwrap_or(0))
    }

    /// Decide the fate of a failed attempt, sleeping through the backoff when
    /// another attempt follows
    ///
    /// Fatal failures propagate without consuming a retry. An interrupted
    /// backoff cancels the context and propagates
    /// [`FaultToleranceError::Interrupted`].
    pub async fn next_retry(&self, failure: Failure) -> RetryVerdict {
        if failure.is_fatal() {
            debug!("Fatal failure, propagating without retry");
            return RetryVerdict::Propagate(failure.into_error());
        }
        if !self.should_retry_on(&failure) {
            return RetryVerdict::Propagate(failure.into_error());
        }

        self.decision.store(DECISION_UNSET, Ordering::Release);
        let unlimited = self.unlimited;
        let consumed = self.remaining.fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| {
            if left == 0 {
                None
            } else if unlimited {
                Some(left)
            } else {
                Some(left - 1)
            }
        });
        if consumed.is_err() {
            return RetryVerdict::Propagate(failure.into_error());
        }
        let retry = self.retries.fetch_add(1, Ordering::AcqRel) + 1;

        let delay = self.compute_delay();
        debug!(retry, delay_ms = delay.as_millis() as u64, error = %FailureDisplay(&failure), "Retrying after failure");

        if self.interrupt.is_cancelled() {
            return self.interrupted();
        }
        if !delay.is_zero() {
            tokio::select! {
                biased;
                _ = self.interrupt.cancelled() => return self.interrupted(),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        RetryVerdict::Retry
    }

    fn interrupted(&self) -> RetryVerdict {
        warn!(attempts = self.attempts_made(), "Retry backoff interrupted");
        self.cancel();
        RetryVerdict::Propagate(FaultToleranceError::Interrupted)
    }
}

impl fmt::Debug for RetryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryContext")
            .field("max_retries", &self.config.max_retries)
            .field("remaining", &self.remaining_attempts())
            .field("retries", &self.retries.load(Ordering::Acquire))
            .field("decision", &self.decision.load(Ordering::Acquire))
            .finish()
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

struct FailureDisplay<'a>(&'a Failure);

impl fmt::Display for FailureDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Failure::Error(error) => write!(f, "{error}"),
            Failure::Panic(payload) => write!(f, "panic: {}", payload.message()),
        }
    }
}
