//! Failure classification for the retry policy
//!
//! Pure decision logic: given what an attempt failed with and the retry
//! policy's category lists, decide how the retry machinery must treat it.

use bulwark_domain::{Failure, FailureCategory};

/// How a failure relates to a retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Unrecoverable: propagate immediately without consuming a retry
    Fatal,
    /// Listed in `abort_on`: propagate immediately
    Abort,
    /// Selected by `retry_on`
    Retryable,
    /// Not selected by `retry_on`
    NotRetryable,
}

impl Classification {
    pub fn is_retryable(self) -> bool {
        self == Classification::Retryable
    }
}

/// Stateless classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureClassifier;

impl FailureClassifier {
    /// Classify `failure` against the retry policy lists
    ///
    /// Fatal failures win, then `abort_on`, then `retry_on`. Matching is
    /// hierarchical. Panic payloads carry no category and are never
    /// retryable.
    pub fn classify(
        failure: &Failure,
        retry_on: &[FailureCategory],
        abort_on: &[FailureCategory],
    ) -> Classification {
        if failure.is_fatal() {
            return Classification::Fatal;
        }
        let Some(category) = failure.category() else {
            return Classification::NotRetryable;
        };
        if category.matches_any(abort_on) {
            return Classification::Abort;
        }
        if Self::selected(&category, retry_on) {
            Classification::Retryable
        } else {
            Classification::NotRetryable
        }
    }

    fn selected(category: &FailureCategory, retry_on: &[FailureCategory]) -> bool {
        match retry_on {
            [] => false,
            [only] => category.is_a(only),
            many => category.matches_any(many),
        }
    }
}
