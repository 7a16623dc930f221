//! Settings loader
//!
//! Loads [`FaultToleranceSettings`] from a file and the environment.
//!
//! ## Loading Strategy
//! 1. Load a `.env` file from the working directory, if present
//! 2. Probe the standard paths for a settings file (defaults when none)
//! 3. Apply environment overrides
//! 4. Resolve every operation override against the category catalogue so
//!    unknown names and invalid bounds fail at load time
//!
//! ## Environment Variables
//! - `BULWARK_METRICS_ENABLED`: whether metrics are collected (default
//!   `true`)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./bulwark.toml`, `./bulwark.json`, `./fault-tolerance.toml`,
//!    `./fault-tolerance.json`
//! 2. The same names in the parent directory
//! 3. The same names next to the executable

use std::path::{Path, PathBuf};

use bulwark_domain::constants::METRICS_ENABLED_ENV;
use bulwark_domain::{
    BulkheadConfig, CircuitBreakerConfig, FailureCategory, FaultToleranceSettings, RetryConfig,
    TimeoutConfig,
};
use tracing::{debug, info, warn};

use crate::errors::{InfraError, InfraResult};

const FILE_NAMES: [&str; 4] =
    ["bulwark.toml", "bulwark.json", "fault-tolerance.toml", "fault-tolerance.json"];

/// Load settings using the full strategy described in the module docs
///
/// # Errors
/// Returns an [`InfraError`] if the settings file cannot be read or parsed,
/// an environment variable holds an invalid value, or an operation override
/// does not resolve.
pub fn load(catalogue: &[FailureCategory]) -> InfraResult<FaultToleranceSettings> {
    load_dotenv();

    let settings = match probe_config_paths() {
        Some(path) => load_from_file(Some(path))?,
        None => {
            debug!("No settings file found, using defaults");
            FaultToleranceSettings::default()
        }
    };

    let settings = apply_env_overrides(settings)?;
    validate_settings(&settings, catalogue)?;
    info!(
        metrics_enabled = settings.metrics.enabled,
        operations = settings.operations.len(),
        "Fault-tolerance settings loaded"
    );
    Ok(settings)
}

/// Load a `.env` file into the process environment, if one exists
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => info!(path = %path.display(), "Loaded .env file"),
        Err(error) if error.not_found() => debug!("No .env file found"),
        Err(error) => warn!(error = %error, "Could not load .env file"),
    }
}

/// Load settings from a file
///
/// If `path` is `None`, probes the standard locations. The format is
/// detected by extension (`.toml` or `.json`).
///
/// # Errors
/// Returns [`InfraError::ConfigNotFound`] for a missing explicit path,
/// [`InfraError::NoConfigFile`] when probing finds nothing, and a parse
/// error for malformed contents.
pub fn load_from_file(path: Option<PathBuf>) -> InfraResult<FaultToleranceSettings> {
    let config_path = match path {
        Some(path) => {
            if !path.exists() {
                return Err(InfraError::ConfigNotFound { path });
            }
            path
        }
        None => probe_config_paths().ok_or(InfraError::NoConfigFile)?,
    };

    info!(path = %config_path.display(), "Loading settings from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|source| InfraError::Read { path: config_path.clone(), source })?;

    parse_settings(&contents, &config_path)
}

fn parse_settings(contents: &str, path: &Path) -> InfraResult<FaultToleranceSettings> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => Ok(toml::from_str(contents)?),
        "json" => Ok(serde_json::from_str(contents)?),
        other => Err(InfraError::UnsupportedFormat(other.to_string())),
    }
}

/// First existing settings file among the standard locations
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd.clone());
        dirs.push(cwd.join(".."));
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.push(exe_dir.to_path_buf());
        }
    }

    dirs.iter()
        .flat_map(|dir| FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

/// Layer environment variables over `settings`
///
/// # Errors
/// Returns [`InfraError::InvalidEnv`] when a variable holds an unrecognised
/// value.
pub fn apply_env_overrides(
    mut settings: FaultToleranceSettings,
) -> InfraResult<FaultToleranceSettings> {
    settings.metrics.enabled = env_bool(METRICS_ENABLED_ENV, settings.metrics.enabled)?;
    Ok(settings)
}

/// Resolve every operation override against the default policy configs
///
/// # Errors
/// Returns [`InfraError::Config`] for unknown category names or overrides
/// that produce an invalid configuration.
pub fn validate_settings(
    settings: &FaultToleranceSettings,
    catalogue: &[FailureCategory],
) -> InfraResult<()> {
    for (prefix, operation) in &settings.operations {
        debug!(operation = %prefix, "Validating operation overrides");
        if let Some(retry) = &operation.retry {
            retry.apply(RetryConfig::default(), catalogue)?;
        }
        if let Some(breaker) = &operation.circuit_breaker {
            breaker.apply(CircuitBreakerConfig::default(), catalogue)?;
        }
        if let Some(bulkhead) = &operation.bulkhead {
            bulkhead.apply(BulkheadConfig::default())?;
        }
        if let Some(timeout) = &operation.timeout {
            timeout.apply(TimeoutConfig::default())?;
        }
    }
    Ok(())
}

/// Parse a boolean environment variable
///
/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off`
/// (case-insensitive). Unset variables yield `default`.
fn env_bool(key: &str, default: bool) -> InfraResult<bool> {
    let Ok(raw) = std::env::var(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(InfraError::InvalidEnv { key: key.to_string(), value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use once_cell::sync::Lazy;
    use tempfile::NamedTempFile;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    fn temp_settings(contents: &str, extension: &str) -> (NamedTempFile, PathBuf) {
        let mut temp_file = NamedTempFile::new().expect("temp file");
        temp_file.write_all(contents.as_bytes()).expect("write settings");
        let path = temp_file.path().with_extension(extension);
        std::fs::copy(temp_file.path(), &path).expect("copy settings");
        (temp_file, path)
    }

    #[test]
    fn test_env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        std::env::set_var("BULWARK_TEST_BOOL_ON", "On");
        std::env::set_var("BULWARK_TEST_BOOL_OFF", "0");
        std::env::set_var("BULWARK_TEST_BOOL_BAD", "maybe");
        std::env::remove_var("BULWARK_TEST_BOOL_MISSING");

        assert!(env_bool("BULWARK_TEST_BOOL_ON", false).expect("valid"));
        assert!(!env_bool("BULWARK_TEST_BOOL_OFF", true).expect("valid"));
        assert!(env_bool("BULWARK_TEST_BOOL_MISSING", true).expect("default"));
        assert!(matches!(
            env_bool("BULWARK_TEST_BOOL_BAD", true),
            Err(InfraError::InvalidEnv { .. })
        ));

        std::env::remove_var("BULWARK_TEST_BOOL_ON");
        std::env::remove_var("BULWARK_TEST_BOOL_OFF");
        std::env::remove_var("BULWARK_TEST_BOOL_BAD");
    }

    /// Validates the metrics toggle override.
    ///
    /// Assertions:
    /// - Ensures the environment wins over the file value.
    /// - Ensures the file value survives when the variable is unset.
    #[test]
    fn test_env_overrides_metrics_toggle() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        std::env::set_var(METRICS_ENABLED_ENV, "false");
        let settings = apply_env_overrides(FaultToleranceSettings::default()).expect("valid env");
        assert!(!settings.metrics.enabled);

        std::env::remove_var(METRICS_ENABLED_ENV);
        let settings = apply_env_overrides(FaultToleranceSettings::default()).expect("valid env");
        assert!(settings.metrics.enabled);
    }

    #[test]
    fn test_load_from_file_toml() {
        let (_temp, path) = temp_settings(
            r#"
[metrics]
enabled = false

[operations."ft.billing.Client.charge".retry]
max_retries = 5
delay_ms = 100
"#,
            "toml",
        );

        let settings = load_from_file(Some(path.clone())).expect("valid TOML settings");
        assert!(!settings.metrics.enabled);
        let retry = settings
            .operation("ft.billing.Client.charge")
            .and_then(|operation| operation.retry.as_ref())
            .expect("retry override present");
        assert_eq!(retry.max_retries, Some(5));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_from_file_json() {
        let (_temp, path) = temp_settings(
            r#"{ "operations": { "ft.svc.op": { "timeout": { "timeout_ms": 250 } } } }"#,
            "json",
        );

        let settings = load_from_file(Some(path.clone())).expect("valid JSON settings");
        assert!(settings.metrics.enabled);
        assert_eq!(
            settings.operation("ft.svc.op").and_then(|op| op.timeout).and_then(|t| t.timeout_ms),
            Some(250)
        );

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_from_file_not_found() {
        let result = load_from_file(Some(PathBuf::from("/nonexistent/bulwark.toml")));
        assert!(matches!(result, Err(InfraError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_parse_settings_errors() {
        assert!(matches!(
            parse_settings("{ not json", Path::new("bulwark.json")),
            Err(InfraError::Json(_))
        ));
        assert!(matches!(
            parse_settings("[metrics\n", Path::new("bulwark.toml")),
            Err(InfraError::Toml(_))
        ));
        assert!(matches!(
            parse_settings("a: b", Path::new("bulwark.yaml")),
            Err(InfraError::UnsupportedFormat(_))
        ));
    }

    /// Validates override resolution.
    ///
    /// Assertions:
    /// - Ensures names from the catalogue resolve.
    /// - Ensures unknown names are rejected.
    /// - Ensures invalid bounds are rejected.
    #[test]
    fn test_validate_settings() {
        const TRANSIENT: FailureCategory =
            FailureCategory::child("transient", &FailureCategory::ANY);

        let valid: FaultToleranceSettings = toml::from_str(
            r#"
[operations."ft.svc.op".retry]
retry_on = ["transient", "timeout"]
"#,
        )
        .expect("valid TOML");
        assert!(validate_settings(&valid, &[TRANSIENT]).is_ok());
        assert!(matches!(validate_settings(&valid, &[]), Err(InfraError::Config(_))));

        let invalid: FaultToleranceSettings = toml::from_str(
            r#"
[operations."ft.svc.op".bulkhead]
max_concurrent = 0
"#,
        )
        .expect("valid TOML");
        assert!(matches!(validate_settings(&invalid, &[]), Err(InfraError::Config(_))));
    }
}
