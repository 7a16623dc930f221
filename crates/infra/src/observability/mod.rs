//! Tracing initialisation
//!
//! Installs a global `tracing` subscriber. The filter comes from `RUST_LOG`
//! when set, otherwise from the caller's default directive. Output is
//! human-readable by default; set `BULWARK_LOG_FORMAT=json` for JSON lines.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::{InfraError, InfraResult};

pub const LOG_FORMAT_ENV: &str = "BULWARK_LOG_FORMAT";

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// Read the format from `BULWARK_LOG_FORMAT`; anything but `json` is pretty
    pub fn from_env() -> Self {
        match std::env::var(LOG_FORMAT_ENV) {
            Ok(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Install the global subscriber
///
/// # Errors
/// Returns [`InfraError::Tracing`] if the directive does not parse or a
/// global subscriber is already installed.
pub fn init_tracing(default_directive: &str, format: LogFormat) -> InfraResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)
            .map_err(|e| InfraError::Tracing(e.to_string()))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(false)).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };

    result.map_err(|e| InfraError::Tracing(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates global subscriber installation.
    ///
    /// Assertions:
    /// - Ensures the first installation succeeds.
    /// - Ensures a second installation is reported as an error, not a panic.
    #[test]
    fn test_init_tracing_only_once() {
        assert!(init_tracing("info", LogFormat::Pretty).is_ok());
        assert!(matches!(init_tracing("debug", LogFormat::Json), Err(InfraError::Tracing(_))));
    }
}
