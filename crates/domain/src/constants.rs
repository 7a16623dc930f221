//! Policy defaults and environment names
//!
//! Centralized location for the defaults every policy configuration falls
//! back to.

// Retry defaults
pub const DEFAULT_MAX_RETRIES: i32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 0;
pub const DEFAULT_RETRY_MAX_DURATION_MS: u64 = 180_000;
pub const DEFAULT_RETRY_JITTER_MS: u64 = 200;
/// Sentinel for `max_retries` meaning "no attempt limit"
pub const UNLIMITED_RETRIES: i32 = -1;

// Circuit breaker defaults
pub const DEFAULT_CB_DELAY_MS: u64 = 5_000;
pub const DEFAULT_CB_REQUEST_VOLUME_THRESHOLD: u32 = 20;
pub const DEFAULT_CB_FAILURE_RATIO: f64 = 0.5;
pub const DEFAULT_CB_SUCCESS_THRESHOLD: u32 = 1;

// Bulkhead defaults
pub const DEFAULT_BULKHEAD_MAX_CONCURRENT: usize = 10;
pub const DEFAULT_BULKHEAD_WAITING_QUEUE: usize = 10;

// Timeout defaults
pub const DEFAULT_TIMEOUT_MS: u64 = 1_000;

// Metrics
pub const METRICS_ENABLED_ENV: &str = "BULWARK_METRICS_ENABLED";
pub const DEFAULT_METRICS_ENABLED: bool = true;
/// Prefix shared by every per-operation metric name
pub const METRIC_NAMESPACE: &str = "ft";
