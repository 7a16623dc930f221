//! Circuit breaker runtime
//!
//! Rolling-window breaker: while closed it remembers the outcome of the last
//! `request_volume_threshold` calls and opens once that window is full and
//! its failure ratio reaches `failure_ratio`. After `delay` the next call is
//! let through as a trial (half-open); `success_threshold` successful trials
//! close the circuit again, any failed trial reopens it.
//!
//! Admission hands out a [`BreakerPermit`]; the call's outcome is recorded by
//! settling that permit. A trial permit dropped unsettled gives its slot back,
//! so an abandoned trial never wedges the breaker in half-open.
//!
//! The breaker also keeps the cumulative time spent in each state and the
//! number of times it opened, which the metrics layer exposes as gauges and
//! counters.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bulwark_domain::{CircuitBreakerConfig, ConfigResult};
use tracing::{debug, info, warn};

use crate::time::{Clock, SystemClock};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Calls flow normally
    Closed,
    /// Calls are rejected
    Open,
    /// A limited number of trial calls probe recovery
    HalfOpen,
}

impl CircuitState {
    fn index(self) -> usize {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    entered_at: Instant,
    /// Completed time per state, indexed by `CircuitState::index`
    accumulated: [Duration; 3],
    /// `true` marks a failure
    window: VecDeque<bool>,
    /// Bumped on every transition; permits from an earlier stay are stale
    epoch: u64,
    trial_permits: u32,
    trial_successes: u32,
}

/// Rolling-window circuit breaker
///
/// Cloning yields another handle onto the same breaker.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    config: Arc<CircuitBreakerConfig>,
    inner: Arc<Mutex<BreakerState>>,
    opened: Arc<AtomicU64>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("opened", &self.opened_count())
            .finish()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            inner: Arc::clone(&self.inner),
            opened: Arc::clone(&self.opened),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    pub fn new(config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a circuit breaker reading time from `clock`
    pub fn with_clock(config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;

        let window_capacity = config.request_volume_threshold as usize;
        Ok(Self {
            inner: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                entered_at: clock.now(),
                accumulated: [Duration::ZERO; 3],
                window: VecDeque::with_capacity(window_capacity),
                epoch: 0,
                trial_permits: 0,
                trial_successes: 0,
            })),
            config: Arc::new(config),
            opened: Arc::new(AtomicU64::new(0)),
            clock: Arc::new(clock),
        })
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Circuit breaker state lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn transition(&self, inner: &mut BreakerState, next: CircuitState) {
        let now = self.clock.now();
        let spent = now.saturating_duration_since(inner.entered_at);
        inner.accumulated[inner.state.index()] += spent;
        inner.state = next;
        inner.entered_at = now;
        inner.window.clear();
        inner.epoch += 1;
        inner.trial_permits = 0;
        inner.trial_successes = 0;
        if next == CircuitState::Open {
            self.opened.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Ask for permission to run one call
    ///
    /// Returns `None` when the call must be short-circuited. An open breaker
    /// whose delay has elapsed moves to half-open and hands out up to
    /// `success_threshold` trial permits.
    pub fn try_acquire(&self) -> Option<BreakerPermit<'_, C>> {
        let mut inner = self.lock();
        let state = inner.state;
        let trial = match state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let open_for = self.clock.elapsed_since(inner.entered_at);
                if open_for < self.config.delay {
                    return None;
                }
                self.transition(&mut inner, CircuitState::HalfOpen);
                debug!(open_for_ms = open_for.as_millis() as u64, "Circuit breaker half-open");
                inner.trial_permits = 1;
                true
            }
            CircuitState::HalfOpen => {
                if inner.trial_permits >= self.config.success_threshold {
                    return None;
                }
                inner.trial_permits += 1;
                true
            }
        };
        Some(BreakerPermit { breaker: self, epoch: inner.epoch, trial, settled: false })
    }

    fn settle(&self, epoch: u64, failed: bool) {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            debug!(failed, "Outcome of a call admitted before the last transition ignored");
            return;
        }
        let state = inner.state;
        match (state, failed) {
            (CircuitState::Closed, _) => self.push_outcome(&mut inner, failed),
            (CircuitState::HalfOpen, false) => {
                inner.trial_successes += 1;
                if inner.trial_successes >= self.config.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed);
                    info!("Circuit breaker closed after successful trial calls");
                }
            }
            (CircuitState::HalfOpen, true) => {
                self.transition(&mut inner, CircuitState::Open);
                warn!("Circuit breaker reopened after failed trial call");
            }
            (CircuitState::Open, _) => {}
        }
    }

    fn release_trial(&self, epoch: u64) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen && inner.epoch == epoch {
            inner.trial_permits = inner.trial_permits.saturating_sub(1);
            debug!("Abandoned trial call released its permit");
        }
    }

    fn push_outcome(&self, inner: &mut BreakerState, failed: bool) {
        let capacity = self.config.request_volume_threshold as usize;
        if inner.window.len() == capacity {
            inner.window.pop_front();
        }
        inner.window.push_back(failed);

        if inner.window.len() < capacity {
            return;
        }
        let failures = inner.window.iter().filter(|failed| **failed).count();
        #[allow(clippy::cast_precision_loss)]
        let ratio = failures as f64 / capacity as f64;
        if ratio >= self.config.failure_ratio {
            self.transition(inner, CircuitState::Open);
            warn!(failures, window = capacity, "Circuit breaker opened");
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Cumulative time spent in `state`, including the current stay
    pub fn time_in_state(&self, state: CircuitState) -> Duration {
        let inner = self.lock();
        let mut total = inner.accumulated[state.index()];
        if inner.state == state {
            total += self.clock.elapsed_since(inner.entered_at);
        }
        total
    }

    /// Number of closed/half-open → open transitions so far
    pub fn opened_count(&self) -> u64 {
        self.opened.load(Ordering::Acquire)
    }
}

/// Admission for one call through a [`CircuitBreaker`]
///
/// Settle it with [`record_success`](Self::record_success) or
/// [`record_failure`](Self::record_failure). Dropping an unsettled trial
/// permit returns its half-open slot.
#[must_use = "an unsettled permit records no outcome"]
pub struct BreakerPermit<'a, C: Clock = SystemClock> {
    breaker: &'a CircuitBreaker<C>,
    epoch: u64,
    trial: bool,
    settled: bool,
}

impl<C: Clock> BreakerPermit<'_, C> {
    /// Whether this permit is a half-open trial
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.settle(self.epoch, false);
    }

    pub fn record_failure(mut self) {
        self.settled = true;
        self.breaker.settle(self.epoch, true);
    }
}

impl<C: Clock> Drop for BreakerPermit<'_, C> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.release_trial(self.epoch);
        }
    }
}

impl<C: Clock> fmt::Debug for BreakerPermit<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerPermit")
            .field("epoch", &self.epoch)
            .field("trial", &self.trial)
            .field("settled", &self.settled)
            .finish()
    }
}
