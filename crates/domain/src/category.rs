//! Failure categories and "is-a" matching
//!
//! Policies such as retry (`retry_on` / `abort_on`) and the circuit breaker
//! (`fail_on` / `skip_on`) select failures by category rather than by exact
//! error type. A category may name a parent, which makes matching
//! hierarchical: a failure in `TRANSIENT` (child of `ANY`) matches a policy
//! entry of either `TRANSIENT` or `ANY`.
//!
//! Categories are cheap `Copy` values meant to be declared as constants:
//!
//! ```rust
//! use bulwark_domain::FailureCategory;
//!
//! const TRANSIENT: FailureCategory = FailureCategory::child("transient", &FailureCategory::ANY);
//! const CONNECT: FailureCategory = FailureCategory::child("connect", &TRANSIENT);
//!
//! assert!(CONNECT.is_a(&TRANSIENT));
//! assert!(CONNECT.is_a(&FailureCategory::ANY));
//! assert!(!TRANSIENT.is_a(&CONNECT));
//! ```

use std::fmt;

/// A named failure category with an optional parent.
///
/// Names are expected to be unique within a process; two categories with the
/// same name are treated as the same category.
#[derive(Debug, Clone, Copy)]
pub struct FailureCategory {
    name: &'static str,
    parent: Option<&'static FailureCategory>,
}

impl FailureCategory {
    /// Root of every recoverable failure.
    pub const ANY: FailureCategory = FailureCategory::root("any");

    /// Unrecoverable failures. Deliberately not a child of [`Self::ANY`], so
    /// `retry_on = [ANY]` never selects them.
    pub const FATAL: FailureCategory = FailureCategory::root("fatal");

    /// Failures raised by the fault-tolerance machinery itself.
    pub const FAULT_TOLERANCE: FailureCategory =
        FailureCategory::child("fault_tolerance", &FailureCategory::ANY);

    /// The guarded call exceeded its timeout.
    pub const TIMEOUT: FailureCategory =
        FailureCategory::child("timeout", &FailureCategory::FAULT_TOLERANCE);

    /// The call was short-circuited by an open circuit breaker.
    pub const CIRCUIT_BREAKER_OPEN: FailureCategory =
        FailureCategory::child("circuit_breaker_open", &FailureCategory::FAULT_TOLERANCE);

    /// The bulkhead had no capacity for the call.
    pub const BULKHEAD_REJECTED: FailureCategory =
        FailureCategory::child("bulkhead_rejected", &FailureCategory::FAULT_TOLERANCE);

    /// A backoff wait was interrupted.
    pub const INTERRUPTED: FailureCategory =
        FailureCategory::child("interrupted", &FailureCategory::ANY);

    /// Create a category without a parent.
    pub const fn root(name: &'static str) -> Self {
        Self { name, parent: None }
    }

    /// Create a category nested under `parent`.
    pub const fn child(name: &'static str, parent: &'static FailureCategory) -> Self {
        Self { name, parent: Some(parent) }
    }

    /// Category name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Direct parent, if any.
    pub const fn parent(&self) -> Option<&'static FailureCategory> {
        self.parent
    }

    /// Returns `true` when `self` equals `other` or descends from it.
    pub fn is_a(&self, other: &FailureCategory) -> bool {
        let mut current = Some(self);
        while let Some(category) = current {
            if category.name == other.name {
                return true;
            }
            current = category.parent;
        }
        false
    }

    /// Returns `true` when `self` is-a any entry of `candidates`.
    pub fn matches_any(&self, candidates: &[FailureCategory]) -> bool {
        candidates.iter().any(|candidate| self.is_a(candidate))
    }

    /// Built-in categories, used to resolve names from configuration files.
    pub fn builtins() -> [FailureCategory; 7] {
        [
            Self::ANY,
            Self::FATAL,
            Self::FAULT_TOLERANCE,
            Self::TIMEOUT,
            Self::CIRCUIT_BREAKER_OPEN,
            Self::BULKHEAD_REJECTED,
            Self::INTERRUPTED,
        ]
    }
}

impl PartialEq for FailureCategory {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for FailureCategory {}

impl std::hash::Hash for FailureCategory {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
