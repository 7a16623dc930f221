//! Operation identity and capabilities
//!
//! An [`OperationDescriptor`] is built once when a guarded operation is
//! registered. It carries the stable metric prefix and the set of policies
//! configured for the operation, so nothing downstream has to rediscover
//! them per call.

use std::fmt;
use std::sync::Arc;

use crate::constants::METRIC_NAMESPACE;

/// Policies configured for an operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub has_retry: bool,
    pub has_timeout: bool,
    pub has_circuit_breaker: bool,
    pub has_bulkhead: bool,
    pub has_fallback: bool,
    /// Asynchronous operations may queue in the bulkhead
    pub is_async: bool,
}

/// Identity of a guarded operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    target: String,
    name: String,
    prefix: Arc<str>,
    capabilities: Capabilities,
}

impl OperationDescriptor {
    /// Describe `name` on `target` (typically a module path such as
    /// `my_app::billing`) with no policies enabled.
    pub fn new(target: impl Into<String>, name: impl Into<String>) -> Self {
        let target = target.into();
        let name = name.into();
        let prefix = metric_prefix(&target, &name);
        Self { target, name, prefix, capabilities: Capabilities::default() }
    }

    pub fn with_retry(mut self) -> Self {
        self.capabilities.has_retry = true;
        self
    }

    pub fn with_timeout(mut self) -> Self {
        self.capabilities.has_timeout = true;
        self
    }

    pub fn with_circuit_breaker(mut self) -> Self {
        self.capabilities.has_circuit_breaker = true;
        self
    }

    pub fn with_bulkhead(mut self) -> Self {
        self.capabilities.has_bulkhead = true;
        self
    }

    pub fn with_fallback(mut self) -> Self {
        self.capabilities.has_fallback = true;
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.capabilities.is_async = true;
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Metric prefix shared by every metric of this operation
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Shared handle to the prefix, cheap to clone into metric keys
    pub fn prefix_handle(&self) -> Arc<str> {
        Arc::clone(&self.prefix)
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn has_retry(&self) -> bool {
        self.capabilities.has_retry
    }

    pub fn has_timeout(&self) -> bool {
        self.capabilities.has_timeout
    }

    pub fn has_circuit_breaker(&self) -> bool {
        self.capabilities.has_circuit_breaker
    }

    pub fn has_bulkhead(&self) -> bool {
        self.capabilities.has_bulkhead
    }

    pub fn has_fallback(&self) -> bool {
        self.capabilities.has_fallback
    }

    pub fn is_async(&self) -> bool {
        self.capabilities.is_async
    }
}

impl fmt::Display for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.target, self.name)
    }
}

fn metric_prefix(target: &str, name: &str) -> Arc<str> {
    let target = target.replace("::", ".");
    Arc::from(format!("{METRIC_NAMESPACE}.{target}.{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates metric prefix derivation.
    ///
    /// Assertions:
    /// - Confirms path separators become dots.
    /// - Confirms the namespace and operation name frame the target.
    #[test]
    fn test_prefix_format() {
        let op = OperationDescriptor::new("my_app::billing::Client", "charge");
        assert_eq!(op.prefix(), "ft.my_app.billing.Client.charge");
        assert_eq!(op.to_string(), "my_app::billing::Client::charge");
    }

    /// Validates capability flags set by the builder methods.
    ///
    /// Assertions:
    /// - Ensures a fresh descriptor has no policies.
    /// - Ensures each builder method sets exactly its flag.
    #[test]
    fn test_capability_flags() {
        let bare = OperationDescriptor::new("svc", "op");
        assert_eq!(bare.capabilities(), Capabilities::default());

        let op = OperationDescriptor::new("svc", "op").with_retry().with_bulkhead().asynchronous();
        assert!(op.has_retry());
        assert!(op.has_bulkhead());
        assert!(op.is_async());
        assert!(!op.has_timeout());
        assert!(!op.has_circuit_breaker());
        assert!(!op.has_fallback());
    }
}
