//! Integration tests for the settings model
//!
//! Parses realistic settings documents in both supported formats and layers
//! them over programmatic policy configuration.

use std::time::Duration;

use bulwark_domain::{
    BulkheadConfig, CircuitBreakerConfig, ConfigError, FailureCategory, FaultToleranceSettings,
    MaxRetries, RetryConfig, TimeoutConfig,
};

const TRANSIENT: FailureCategory = FailureCategory::child("transient", &FailureCategory::ANY);
const PERMANENT: FailureCategory = FailureCategory::child("permanent", &FailureCategory::ANY);

const CATALOGUE: [FailureCategory; 2] = [TRANSIENT, PERMANENT];

// ============================================================================
// TOML
// ============================================================================

/// Validates a full TOML document with every policy section.
///
/// Assertions:
/// - Confirms the metrics toggle is read.
/// - Confirms each policy override lands on the merged configuration.
#[test]
fn test_toml_document_applies_to_every_policy() {
    let document = r#"
        [metrics]
        enabled = false

        [operations."ft.billing.Client.charge".retry]
        max_retries = -1
        max_duration_ms = 2000
        delay_ms = 50
        jitter_ms = 0
        retry_on = ["transient"]
        abort_on = ["permanent"]

        [operations."ft.billing.Client.charge".circuit_breaker]
        request_volume_threshold = 4
        failure_ratio = 0.75
        skip_on = ["permanent"]

        [operations."ft.billing.Client.charge".bulkhead]
        max_concurrent = 2
        waiting_queue = 8

        [operations."ft.billing.Client.charge".timeout]
        timeout_ms = 250
    "#;

    let settings: FaultToleranceSettings = toml::from_str(document).expect("valid TOML");
    assert!(!settings.metrics.enabled);

    let operation = settings.operation("ft.billing.Client.charge").expect("operation present");

    let retry = operation
        .retry
        .as_ref()
        .expect("retry section")
        .apply(RetryConfig::default(), &CATALOGUE)
        .expect("retry applies");
    assert_eq!(retry.max_retries, MaxRetries::Unlimited);
    assert_eq!(retry.max_duration, Duration::from_secs(2));
    assert_eq!(retry.delay, Duration::from_millis(50));
    assert!(retry.jitter.is_zero());
    assert_eq!(retry.retry_on, vec![TRANSIENT]);
    assert_eq!(retry.abort_on, vec![PERMANENT]);

    let breaker = operation
        .circuit_breaker
        .as_ref()
        .expect("breaker section")
        .apply(CircuitBreakerConfig::default(), &CATALOGUE)
        .expect("breaker applies");
    assert_eq!(breaker.request_volume_threshold, 4);
    assert!((breaker.failure_ratio - 0.75).abs() < f64::EPSILON);
    assert_eq!(breaker.skip_on, vec![PERMANENT]);

    let bulkhead = operation.bulkhead.expect("bulkhead section").apply(BulkheadConfig::default());
    assert_eq!(bulkhead, BulkheadConfig::new(2, 8));

    let timeout = operation.timeout.expect("timeout section").apply(TimeoutConfig::default());
    assert_eq!(timeout, TimeoutConfig::new(Duration::from_millis(250)));
}

/// Validates that an empty document yields defaults.
///
/// Assertions:
/// - Ensures metrics stay enabled and no operation overrides exist.
#[test]
fn test_empty_toml_document_uses_defaults() {
    let settings: FaultToleranceSettings = toml::from_str("").expect("empty TOML is valid");
    assert_eq!(settings, FaultToleranceSettings::default());
}

// ============================================================================
// JSON
// ============================================================================

/// Validates JSON documents and invalid merged configuration.
///
/// Assertions:
/// - Confirms JSON parses into the same model.
/// - Ensures a delay that exceeds the duration bound is rejected at merge.
#[test]
fn test_json_document_with_invalid_retry_bounds() {
    let document = r#"{
        "operations": {
            "ft.inventory.reserve": {
                "retry": { "delay_ms": 5000, "max_duration_ms": 1000 }
            }
        }
    }"#;

    let settings: FaultToleranceSettings = serde_json::from_str(document).expect("valid JSON");
    assert!(settings.metrics.enabled);

    let retry = settings
        .operation("ft.inventory.reserve")
        .and_then(|operation| operation.retry.as_ref())
        .expect("retry section");

    let result = retry.apply(RetryConfig::default(), &CATALOGUE);
    assert!(matches!(result, Err(ConfigError::Invalid { policy: "retry", .. })));
}
