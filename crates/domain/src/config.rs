//! Policy configuration structures
//!
//! Every policy is configured through an immutable struct produced by a
//! validating builder, so invalid combinations fail at construction time
//! rather than on the first guarded call.

use std::time::Duration;

use crate::category::FailureCategory;
use crate::constants::{
    DEFAULT_BULKHEAD_MAX_CONCURRENT, DEFAULT_BULKHEAD_WAITING_QUEUE, DEFAULT_CB_DELAY_MS,
    DEFAULT_CB_FAILURE_RATIO, DEFAULT_CB_REQUEST_VOLUME_THRESHOLD, DEFAULT_CB_SUCCESS_THRESHOLD,
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_MS, DEFAULT_RETRY_JITTER_MS,
    DEFAULT_RETRY_MAX_DURATION_MS, DEFAULT_TIMEOUT_MS, UNLIMITED_RETRIES,
};
use crate::errors::{ConfigError, ConfigResult};

//==============================================================================
// Retry
//==============================================================================

/// Attempt limit of a retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxRetries {
    /// Retry until the failure stops being retryable or time runs out
    Unlimited,
    /// At most this many retries after the initial attempt
    Limited(u32),
}

impl MaxRetries {
    /// Interpret the conventional integer form where `-1` means unlimited
    pub fn from_raw(raw: i32) -> ConfigResult<Self> {
        match raw {
            UNLIMITED_RETRIES => Ok(Self::Unlimited),
            n if n >= 0 => Ok(Self::Limited(n.unsigned_abs())),
            n => Err(ConfigError::invalid(
                "retry",
                format!("max_retries must be -1 (unlimited) or >= 0, got {n}"),
            )),
        }
    }
}

/// Configuration for the retry policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_retries: MaxRetries,
    /// Upper bound on time spent retrying; `Duration::ZERO` disables the bound
    pub max_duration: Duration,
    /// Base delay between attempts
    pub delay: Duration,
    /// Symmetric jitter window applied around `delay`
    pub jitter: Duration,
    /// Failures selected for retry (empty: never retry)
    pub retry_on: Vec<FailureCategory>,
    /// Failures that abort immediately; wins over `retry_on`
    pub abort_on: Vec<FailureCategory>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: MaxRetries::Limited(DEFAULT_MAX_RETRIES.unsigned_abs()),
            max_duration: Duration::from_millis(DEFAULT_RETRY_MAX_DURATION_MS),
            delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            jitter: Duration::from_millis(DEFAULT_RETRY_JITTER_MS),
            retry_on: vec![FailureCategory::ANY],
            abort_on: Vec::new(),
        }
    }
}

impl RetryConfig {
    /// Create a configuration builder
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if !self.max_duration.is_zero() && self.max_duration <= self.delay {
            return Err(ConfigError::invalid(
                "retry",
                format!(
                    "max_duration ({:?}) must be greater than delay ({:?})",
                    self.max_duration, self.delay
                ),
            ));
        }
        Ok(())
    }
}

/// Builder for RetryConfig with fluent API
#[derive(Debug)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
    raw_max_retries: Option<i32>,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default(), raw_max_retries: None }
    }

    /// `-1` for unlimited, otherwise the number of retries after the first
    /// attempt
    pub fn max_retries(mut self, max_retries: i32) -> Self {
        self.raw_max_retries = Some(max_retries);
        self
    }

    pub fn unlimited_retries(self) -> Self {
        self.max_retries(UNLIMITED_RETRIES)
    }

    pub fn max_duration(mut self, max_duration: Duration) -> Self {
        self.config.max_duration = max_duration;
        self
    }

    pub fn no_max_duration(mut self) -> Self {
        self.config.max_duration = Duration::ZERO;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.config.delay = delay;
        self
    }

    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.config.jitter = jitter;
        self
    }

    pub fn no_jitter(mut self) -> Self {
        self.config.jitter = Duration::ZERO;
        self
    }

    /// Replace the retry-on list
    pub fn retry_on(mut self, categories: impl IntoIterator<Item = FailureCategory>) -> Self {
        self.config.retry_on = categories.into_iter().collect();
        self
    }

    /// Replace the abort-on list
    pub fn abort_on(mut self, categories: impl IntoIterator<Item = FailureCategory>) -> Self {
        self.config.abort_on = categories.into_iter().collect();
        self
    }

    pub fn build(mut self) -> ConfigResult<RetryConfig> {
        if let Some(raw) = self.raw_max_retries {
            self.config.max_retries = MaxRetries::from_raw(raw)?;
        }
        self.config.validate()?;
        Ok(self.config)
    }
}

//==============================================================================
// Circuit breaker
//==============================================================================

/// Configuration for circuit breaker behavior
///
/// The breaker evaluates a rolling window of the last
/// `request_volume_threshold` calls and opens once the failure ratio in a
/// full window reaches `failure_ratio`.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Time to stay open before letting trial calls through
    pub delay: Duration,
    /// Size of the rolling window
    pub request_volume_threshold: u32,
    /// Failure ratio (0.0..=1.0) that opens the circuit
    pub failure_ratio: f64,
    /// Consecutive successful trial calls needed to close from half-open
    pub success_threshold: u32,
    /// Failures counted against the breaker
    pub fail_on: Vec<FailureCategory>,
    /// Failures treated as successes; wins over `fail_on`
    pub skip_on: Vec<FailureCategory>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(DEFAULT_CB_DELAY_MS),
            request_volume_threshold: DEFAULT_CB_REQUEST_VOLUME_THRESHOLD,
            failure_ratio: DEFAULT_CB_FAILURE_RATIO,
            success_threshold: DEFAULT_CB_SUCCESS_THRESHOLD,
            fail_on: vec![FailureCategory::ANY, FailureCategory::FATAL],
            skip_on: Vec::new(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.request_volume_threshold == 0 {
            return Err(ConfigError::invalid(
                "circuit breaker",
                "request_volume_threshold must be greater than 0",
            ));
        }
        if !(0.0..=1.0).contains(&self.failure_ratio) {
            return Err(ConfigError::invalid(
                "circuit breaker",
                format!("failure_ratio must be within 0.0..=1.0, got {}", self.failure_ratio),
            ));
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::invalid(
                "circuit breaker",
                "success_threshold must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Builder for CircuitBreakerConfig
#[derive(Debug)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.config.delay = delay;
        self
    }

    pub fn request_volume_threshold(mut self, threshold: u32) -> Self {
        self.config.request_volume_threshold = threshold;
        self
    }

    pub fn failure_ratio(mut self, ratio: f64) -> Self {
        self.config.failure_ratio = ratio;
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    pub fn fail_on(mut self, categories: impl IntoIterator<Item = FailureCategory>) -> Self {
        self.config.fail_on = categories.into_iter().collect();
        self
    }

    pub fn skip_on(mut self, categories: impl IntoIterator<Item = FailureCategory>) -> Self {
        self.config.skip_on = categories.into_iter().collect();
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//==============================================================================
// Bulkhead
//==============================================================================

/// Configuration for bulkhead behavior
///
/// `waiting_queue` only applies to asynchronous operations; synchronous
/// operations are rejected as soon as every permit is taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkheadConfig {
    pub max_concurrent: usize,
    pub waiting_queue: usize,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_BULKHEAD_MAX_CONCURRENT,
            waiting_queue: DEFAULT_BULKHEAD_WAITING_QUEUE,
        }
    }
}

impl BulkheadConfig {
    pub fn new(max_concurrent: usize, waiting_queue: usize) -> ConfigResult<Self> {
        let config = Self { max_concurrent, waiting_queue };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::invalid("bulkhead", "max_concurrent must be greater than 0"));
        }
        Ok(())
    }
}

//==============================================================================
// Timeout
//==============================================================================

/// Configuration for the timeout policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    pub timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS) }
    }
}

impl TimeoutConfig {
    pub fn new(timeout: Duration) -> ConfigResult<Self> {
        if timeout.is_zero() {
            return Err(ConfigError::invalid("timeout", "timeout must be greater than 0"));
        }
        Ok(Self { timeout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates `RetryConfig::default` behavior.
    ///
    /// Assertions:
    /// - Confirms the default attempt limit, delay, duration and jitter.
    /// - Confirms retry-on defaults to `ANY` and abort-on is empty.
    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, MaxRetries::Limited(3));
        assert_eq!(config.delay, Duration::ZERO);
        assert_eq!(config.max_duration, Duration::from_secs(180));
        assert_eq!(config.jitter, Duration::from_millis(200));
        assert_eq!(config.retry_on, vec![FailureCategory::ANY]);
        assert!(config.abort_on.is_empty());
        assert!(config.validate().is_ok());
    }

    /// Validates the retry builder rejecting invalid combinations.
    ///
    /// Assertions:
    /// - Ensures `max_retries = -2` is rejected.
    /// - Ensures `max_duration <= delay` is rejected.
    /// - Ensures `-1` builds an unlimited policy.
    #[test]
    fn test_retry_config_builder_validation() {
        assert!(RetryConfig::builder().max_retries(-2).build().is_err());

        let result = RetryConfig::builder()
            .delay(Duration::from_secs(2))
            .max_duration(Duration::from_secs(1))
            .build();
        assert!(matches!(result, Err(ConfigError::Invalid { policy: "retry", .. })));

        let unlimited = RetryConfig::builder().unlimited_retries().build().expect("valid config");
        assert_eq!(unlimited.max_retries, MaxRetries::Unlimited);
    }

    #[test]
    fn test_retry_config_builder_zero_duration_disables_bound() {
        let config = RetryConfig::builder()
            .delay(Duration::from_secs(5))
            .no_max_duration()
            .build()
            .expect("zero max_duration is always valid");
        assert!(config.max_duration.is_zero());
    }

    /// Validates circuit breaker configuration bounds.
    ///
    /// Assertions:
    /// - Ensures a zero window, an out-of-range ratio and a zero success
    ///   threshold are each rejected.
    #[test]
    fn test_circuit_breaker_config_validation() {
        assert!(CircuitBreakerConfig::default().validate().is_ok());
        assert!(CircuitBreakerConfig::builder().request_volume_threshold(0).build().is_err());
        assert!(CircuitBreakerConfig::builder().failure_ratio(1.5).build().is_err());
        assert!(CircuitBreakerConfig::builder().success_threshold(0).build().is_err());
    }

    #[test]
    fn test_bulkhead_and_timeout_validation() {
        assert!(BulkheadConfig::new(0, 5).is_err());
        assert!(BulkheadConfig::new(2, 0).is_ok());
        assert!(TimeoutConfig::new(Duration::ZERO).is_err());
        assert!(TimeoutConfig::new(Duration::from_millis(10)).is_ok());
    }
}
