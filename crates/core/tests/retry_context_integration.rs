//! Integration tests for the retry context under concurrent callers

use std::sync::Arc;
use std::time::Duration;

use bulwark_common::time::MockClock;
use bulwark_core::{RetryContext, RetryVerdict};
use bulwark_domain::{Failure, FailureCategory, FaultToleranceError, RetryConfig};

const TRANSIENT: FailureCategory = FailureCategory::child("transient", &FailureCategory::ANY);
const PERMANENT: FailureCategory = FailureCategory::child("permanent", &FailureCategory::ANY);

fn failed(category: FailureCategory) -> Failure {
    FaultToleranceError::failed(category, std::io::Error::other("boom")).into()
}

/// Validates that concurrent questions about one failure agree.
///
/// # Test Steps
/// 1. Share one context between 32 tasks
/// 2. Half ask about a retryable failure, half about a non-retryable one
/// 3. Confirm every task got the same answer
#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_decisions_agree() {
    let config = RetryConfig::builder()
        .max_retries(3)
        .retry_on([TRANSIENT])
        .no_jitter()
        .build()
        .expect("valid config");
    let ctx = Arc::new(RetryContext::new(Arc::new(config)));

    let mut handles = Vec::new();
    for index in 0..32 {
        let ctx = Arc::clone(&ctx);
        handles.push(tokio::spawn(async move {
            let category = if index % 2 == 0 { TRANSIENT } else { PERMANENT };
            ctx.should_retry_on(&failed(category))
        }));
    }

    let mut answers = Vec::new();
    for handle in handles {
        answers.push(handle.await.expect("task joined"));
    }
    assert!(answers.windows(2).all(|pair| pair[0] == pair[1]));
}

/// Validates the full attempt budget across an invocation.
///
/// # Test Steps
/// 1. Fail every attempt with a retryable failure
/// 2. Count the retries granted
/// 3. Confirm exactly `max_retries` retries then propagation of the last error
#[tokio::test(flavor = "multi_thread")]
async fn test_budget_exhaustion_propagates_last_failure() {
    let config = RetryConfig::builder()
        .max_retries(4)
        .delay(Duration::from_millis(1))
        .no_jitter()
        .build()
        .expect("valid config");
    let ctx = RetryContext::new(Arc::new(config));

    let mut retries = 0;
    let last = loop {
        match ctx.next_retry(failed(TRANSIENT)).await {
            RetryVerdict::Retry => retries += 1,
            RetryVerdict::Propagate(error) => break error,
        }
    };

    assert_eq!(retries, 4);
    assert_eq!(ctx.attempts_made(), 5);
    assert_eq!(last.category(), TRANSIENT);
}

/// Validates that the elapsed-time bound is measured from context creation.
///
/// # Test Steps
/// 1. Create a context with a 1s bound on a mock clock
/// 2. Retry once inside the bound
/// 3. Advance past the bound and confirm the next failure is final
#[tokio::test(flavor = "multi_thread")]
async fn test_max_duration_measured_from_start() {
    let clock = MockClock::new();
    let config = RetryConfig::builder()
        .max_retries(100)
        .max_duration(Duration::from_secs(1))
        .no_jitter()
        .build()
        .expect("valid config");
    let ctx = RetryContext::with_clock(Arc::new(config), Arc::new(clock.clone()));

    clock.advance_millis(900);
    assert!(ctx.next_retry(failed(TRANSIENT)).await.is_retry());

    clock.advance_millis(200);
    assert!(ctx.is_final_failure(&failed(TRANSIENT)));
    assert!(!ctx.next_retry(failed(TRANSIENT)).await.is_retry());
}
