//! Serializable settings model
//!
//! The on-disk shape of fault-tolerance settings. Every field is optional so
//! a file only needs to mention what it overrides; [`OperationSettings`]
//! layers the overrides on top of programmatic policy configuration.
//!
//! ```toml
//! [metrics]
//! enabled = true
//!
//! [operations."ft.billing.Client.charge".retry]
//! max_retries = 5
//! delay_ms = 100
//! retry_on = ["transient"]
//! abort_on = ["permanent"]
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::category::FailureCategory;
use crate::config::{BulkheadConfig, CircuitBreakerConfig, MaxRetries, RetryConfig, TimeoutConfig};
use crate::constants::DEFAULT_METRICS_ENABLED;
use crate::errors::{ConfigError, ConfigResult};

/// Root settings document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultToleranceSettings {
    pub metrics: MetricsSettings,
    /// Overrides keyed by operation metric prefix
    pub operations: BTreeMap<String, OperationSettings>,
}

impl FaultToleranceSettings {
    pub fn operation(&self, prefix: &str) -> Option<&OperationSettings> {
        self.operations.get(prefix)
    }
}

/// Metrics toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { enabled: DEFAULT_METRICS_ENABLED }
    }
}

/// Per-operation policy overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationSettings {
    pub retry: Option<RetrySettings>,
    pub circuit_breaker: Option<CircuitBreakerSettings>,
    pub bulkhead: Option<BulkheadSettings>,
    pub timeout: Option<TimeoutSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: Option<i32>,
    pub max_duration_ms: Option<u64>,
    pub delay_ms: Option<u64>,
    pub jitter_ms: Option<u64>,
    pub retry_on: Option<Vec<String>>,
    pub abort_on: Option<Vec<String>>,
}

impl RetrySettings {
    /// Overlay these settings on `base`, resolving category names against
    /// `catalogue` and the built-in categories.
    ///
    /// # Errors
    /// Returns `ConfigError::UnknownCategory` for unresolvable names and
    /// `ConfigError::Invalid` if the merged configuration does not validate.
    pub fn apply(
        &self,
        mut base: RetryConfig,
        catalogue: &[FailureCategory],
    ) -> ConfigResult<RetryConfig> {
        if let Some(raw) = self.max_retries {
            base.max_retries = MaxRetries::from_raw(raw)?;
        }
        if let Some(ms) = self.max_duration_ms {
            base.max_duration = Duration::from_millis(ms);
        }
        if let Some(ms) = self.delay_ms {
            base.delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.jitter_ms {
            base.jitter = Duration::from_millis(ms);
        }
        if let Some(names) = &self.retry_on {
            base.retry_on = resolve_categories(names, catalogue)?;
        }
        if let Some(names) = &self.abort_on {
            base.abort_on = resolve_categories(names, catalogue)?;
        }
        base.validate()?;
        Ok(base)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub delay_ms: Option<u64>,
    pub request_volume_threshold: Option<u32>,
    pub failure_ratio: Option<f64>,
    pub success_threshold: Option<u32>,
    pub fail_on: Option<Vec<String>>,
    pub skip_on: Option<Vec<String>>,
}

impl CircuitBreakerSettings {
    pub fn apply(
        &self,
        mut base: CircuitBreakerConfig,
        catalogue: &[FailureCategory],
    ) -> ConfigResult<CircuitBreakerConfig> {
        if let Some(ms) = self.delay_ms {
            base.delay = Duration::from_millis(ms);
        }
        if let Some(threshold) = self.request_volume_threshold {
            base.request_volume_threshold = threshold;
        }
        if let Some(ratio) = self.failure_ratio {
            base.failure_ratio = ratio;
        }
        if let Some(threshold) = self.success_threshold {
            base.success_threshold = threshold;
        }
        if let Some(names) = &self.fail_on {
            base.fail_on = resolve_categories(names, catalogue)?;
        }
        if let Some(names) = &self.skip_on {
            base.skip_on = resolve_categories(names, catalogue)?;
        }
        base.validate()?;
        Ok(base)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkheadSettings {
    pub max_concurrent: Option<usize>,
    pub waiting_queue: Option<usize>,
}

impl BulkheadSettings {
    pub fn apply(&self, mut base: BulkheadConfig) -> ConfigResult<BulkheadConfig> {
        if let Some(max) = self.max_concurrent {
            base.max_concurrent = max;
        }
        if let Some(queue) = self.waiting_queue {
            base.waiting_queue = queue;
        }
        base.validate()?;
        Ok(base)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub timeout_ms: Option<u64>,
}

impl TimeoutSettings {
    pub fn apply(&self, base: TimeoutConfig) -> ConfigResult<TimeoutConfig> {
        match self.timeout_ms {
            Some(ms) => TimeoutConfig::new(Duration::from_millis(ms)),
            None => Ok(base),
        }
    }
}

/// Resolve a category name against `catalogue`, then the built-ins
pub fn resolve_category(
    name: &str,
    catalogue: &[FailureCategory],
) -> ConfigResult<FailureCategory> {
    catalogue
        .iter()
        .chain(FailureCategory::builtins().iter())
        .find(|category| category.name() == name)
        .copied()
        .ok_or_else(|| ConfigError::UnknownCategory { name: name.to_string() })
}

fn resolve_categories(
    names: &[String],
    catalogue: &[FailureCategory],
) -> ConfigResult<Vec<FailureCategory>> {
    names.iter().map(|name| resolve_category(name, catalogue)).collect()
}
