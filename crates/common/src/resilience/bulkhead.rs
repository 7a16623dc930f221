//! Bulkhead runtime for limiting concurrent executions
//!
//! Two admission modes:
//! - **Semaphore** (synchronous operations): a call either takes one of the
//!   `max_concurrent` permits immediately or is rejected with
//!   [`Rejection::ConcurrencyLimit`].
//! - **Queued** (asynchronous operations): when every permit is taken the
//!   call waits in a bounded queue of `waiting_queue` slots; a call arriving
//!   at a full queue is rejected with [`Rejection::WaitingQueueFull`].

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bulwark_domain::{BulkheadConfig, ConfigResult, Rejection};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// How the bulkhead admits calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkheadMode {
    Semaphore,
    Queued,
}

/// Concurrency limiter
///
/// Cloning yields another handle onto the same bulkhead.
#[derive(Clone)]
pub struct Bulkhead {
    config: BulkheadConfig,
    mode: BulkheadMode,
    permits: Arc<Semaphore>,
    running: Arc<AtomicUsize>,
    queued: Arc<AtomicUsize>,
}

impl Bulkhead {
    pub fn new(config: BulkheadConfig, mode: BulkheadMode) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            permits: Arc::new(Semaphore::new(config.max_concurrent)),
            running: Arc::new(AtomicUsize::new(0)),
            queued: Arc::new(AtomicUsize::new(0)),
            config,
            mode,
        })
    }

    pub fn mode(&self) -> BulkheadMode {
        self.mode
    }

    pub fn config(&self) -> &BulkheadConfig {
        &self.config
    }

    /// Admit one call, waiting in the queue if the mode allows it
    ///
    /// The returned permit releases its slot when dropped.
    ///
    /// # Errors
    /// Returns the [`Rejection`] cause when the call is not admitted.
    pub async fn acquire(&self) -> Result<BulkheadPermit, Rejection> {
        if let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() {
            return Ok(self.admit(permit, Duration::ZERO));
        }

        match self.mode {
            BulkheadMode::Semaphore => {
                debug!(max_concurrent = self.config.max_concurrent, "Bulkhead rejected call");
                Err(Rejection::ConcurrencyLimit)
            }
            BulkheadMode::Queued => self.acquire_queued().await,
        }
    }

    async fn acquire_queued(&self) -> Result<BulkheadPermit, Rejection> {
        let limit = self.config.waiting_queue;
        let reserved = self
            .queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |queued| {
                (queued < limit).then_some(queued + 1)
            })
            .is_ok();
        if !reserved {
            debug!(waiting_queue = limit, "Bulkhead waiting queue full");
            return Err(Rejection::WaitingQueueFull);
        }

        let slot = QueueSlot { queued: Arc::clone(&self.queued) };
        let started = Instant::now();
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| Rejection::WaitingQueueFull)?;
        drop(slot);

        Ok(self.admit(permit, started.elapsed()))
    }

    fn admit(&self, permit: OwnedSemaphorePermit, waited: Duration) -> BulkheadPermit {
        self.running.fetch_add(1, Ordering::AcqRel);
        BulkheadPermit { _permit: permit, running: Arc::clone(&self.running), waited }
    }

    /// Calls currently executing inside the bulkhead
    pub fn concurrent_executions(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    /// Calls currently waiting for a permit
    pub fn queue_size(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Bulkhead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bulkhead")
            .field("mode", &self.mode)
            .field("max_concurrent", &self.config.max_concurrent)
            .field("waiting_queue", &self.config.waiting_queue)
            .field("concurrent_executions", &self.concurrent_executions())
            .field("queue_size", &self.queue_size())
            .finish()
    }
}

/// Releases a queue slot even if the waiting future is dropped
struct QueueSlot {
    queued: Arc<AtomicUsize>,
}

impl Drop for QueueSlot {
    fn drop(&mut self) {
        self.queued.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Admission to run one call
#[derive(Debug)]
pub struct BulkheadPermit {
    _permit: OwnedSemaphorePermit,
    running: Arc<AtomicUsize>,
    waited: Duration,
}

impl BulkheadPermit {
    /// Time spent in the waiting queue (zero when admitted immediately)
    pub fn waited(&self) -> Duration {
        self.waited
    }
}

impl Drop for BulkheadPermit {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulkhead(max_concurrent: usize, waiting_queue: usize, mode: BulkheadMode) -> Bulkhead {
        let config = BulkheadConfig::new(max_concurrent, waiting_queue).expect("valid config");
        Bulkhead::new(config, mode).expect("valid bulkhead")
    }

    /// Validates semaphore-mode rejection.
    ///
    /// Assertions:
    /// - Ensures calls beyond `max_concurrent` are rejected immediately.
    /// - Confirms releasing a permit frees the slot.
    #[tokio::test]
    async fn test_semaphore_mode_rejects_when_full() {
        let bulkhead = bulkhead(1, 5, BulkheadMode::Semaphore);

        let first = bulkhead.acquire().await.expect("first call admitted");
        assert_eq!(bulkhead.concurrent_executions(), 1);
        assert_eq!(bulkhead.acquire().await.err(), Some(Rejection::ConcurrencyLimit));

        drop(first);
        assert_eq!(bulkhead.concurrent_executions(), 0);
        assert!(bulkhead.acquire().await.is_ok());
    }

    /// Validates queued-mode waiting and queue overflow.
    ///
    /// Assertions:
    /// - Ensures a waiter is counted in `queue_size`.
    /// - Ensures a call arriving at a full queue is rejected.
    /// - Confirms the waiter is admitted once the running call finishes.
    #[tokio::test]
    async fn test_queued_mode_waits_then_rejects() {
        let bulkhead = bulkhead(1, 1, BulkheadMode::Queued);
        let running = bulkhead.acquire().await.expect("first call admitted");

        let waiter = {
            let bulkhead = bulkhead.clone();
            tokio::spawn(async move { bulkhead.acquire().await.map(|permit| permit.waited()) })
        };

        while bulkhead.queue_size() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(bulkhead.acquire().await.err(), Some(Rejection::WaitingQueueFull));

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(running);

        let waited = waiter.await.expect("waiter task").expect("waiter admitted");
        assert!(waited >= Duration::from_millis(20));
        assert_eq!(bulkhead.queue_size(), 0);
    }

    #[tokio::test]
    async fn test_immediate_admission_has_no_wait() {
        let bulkhead = bulkhead(2, 0, BulkheadMode::Queued);
        let permit = bulkhead.acquire().await.expect("admitted");
        assert_eq!(permit.waited(), Duration::ZERO);
    }
}
