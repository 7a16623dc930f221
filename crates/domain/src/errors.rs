//! Error types used throughout the workspace
//!
//! [`FaultToleranceError`] is what a guarded call fails with and what the
//! policies propagate. [`Failure`] widens it with the one outcome that is not
//! exception-shaped: a caught panic payload.

use std::any::Any;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::category::FailureCategory;

/// Boxed error type carried as the source of classified failures
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why a bulkhead turned a call away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Asynchronous operations: every execution slot is busy and the waiting
    /// queue is full.
    WaitingQueueFull,
    /// Synchronous operations: every execution permit is taken.
    ConcurrencyLimit,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::WaitingQueueFull => write!(f, "waiting queue full"),
            Rejection::ConcurrencyLimit => write!(f, "concurrency limit reached"),
        }
    }
}

/// Failure surfaced by a guarded call or by one of the policies around it
#[derive(Debug, Error)]
pub enum FaultToleranceError {
    /// Unrecoverable failure: never retried, never wrapped
    #[error("Unrecoverable failure: {source}")]
    Fatal {
        #[source]
        source: BoxedError,
    },

    /// Application failure tagged with a category
    #[error("Operation failed ({category}): {source}")]
    Failed {
        category: FailureCategory,
        #[source]
        source: BoxedError,
    },

    /// The guarded call failed with something that is not an error value
    #[error("Operation failed with a non-error payload: {message}")]
    NonErrorFailure { message: String },

    /// The guarded call did not finish in time
    #[error("Operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The circuit breaker is open
    #[error("Circuit breaker is open, call short-circuited")]
    CircuitBreakerOpen,

    /// The bulkhead had no capacity
    #[error("Bulkhead rejected call: {rejection}")]
    BulkheadRejected { rejection: Rejection },

    /// A retry backoff was interrupted
    #[error("Retry backoff interrupted")]
    Interrupted,
}

impl FaultToleranceError {
    /// Classified application failure
    pub fn failed<E>(category: FailureCategory, error: E) -> Self
    where
        E: Into<BoxedError>,
    {
        Self::Failed { category, source: error.into() }
    }

    /// Unrecoverable failure
    pub fn fatal<E>(error: E) -> Self
    where
        E: Into<BoxedError>,
    {
        Self::Fatal { source: error.into() }
    }

    /// Category used for policy matching
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::Fatal { .. } => FailureCategory::FATAL,
            Self::Failed { category, .. } => *category,
            Self::NonErrorFailure { .. } => FailureCategory::FAULT_TOLERANCE,
            Self::Timeout { .. } => FailureCategory::TIMEOUT,
            Self::CircuitBreakerOpen => FailureCategory::CIRCUIT_BREAKER_OPEN,
            Self::BulkheadRejected { .. } => FailureCategory::BULKHEAD_REJECTED,
            Self::Interrupted => FailureCategory::INTERRUPTED,
        }
    }

    /// Whether this failure belongs to the fatal hierarchy
    pub fn is_fatal(&self) -> bool {
        self.category().is_a(&FailureCategory::FATAL)
    }

    /// Exactly a timeout (not merely something categorised under one)
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Panic payload caught from a guarded call
pub struct PanicPayload(Box<dyn Any + Send + 'static>);

impl PanicPayload {
    pub fn new(payload: Box<dyn Any + Send + 'static>) -> Self {
        Self(payload)
    }

    /// Best-effort text of the payload (`&str` and `String` panics)
    pub fn message(&self) -> String {
        if let Some(message) = self.0.downcast_ref::<&'static str>() {
            (*message).to_string()
        } else if let Some(message) = self.0.downcast_ref::<String>() {
            message.clone()
        } else {
            "opaque panic payload".to_string()
        }
    }

    /// Hand back the raw payload, e.g. to resume unwinding
    pub fn into_inner(self) -> Box<dyn Any + Send + 'static> {
        self.0
    }
}

impl fmt::Debug for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PanicPayload").field(&self.message()).finish()
    }
}

/// Outcome of an attempt that did not succeed
#[derive(Debug)]
pub enum Failure {
    /// Exception-shaped failure
    Error(FaultToleranceError),
    /// Non-exception-shaped failure
    Panic(PanicPayload),
}

impl Failure {
    /// Category of the failure; panics have none
    pub fn category(&self) -> Option<FailureCategory> {
        match self {
            Failure::Error(error) => Some(error.category()),
            Failure::Panic(_) => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Failure::Error(error) if error.is_fatal())
    }

    pub fn as_error(&self) -> Option<&FaultToleranceError> {
        match self {
            Failure::Error(error) => Some(error),
            Failure::Panic(_) => None,
        }
    }

    /// Convert into a propagatable error, wrapping panic payloads
    pub fn into_error(self) -> FaultToleranceError {
        match self {
            Failure::Error(error) => error,
            Failure::Panic(payload) => {
                FaultToleranceError::NonErrorFailure { message: payload.message() }
            }
        }
    }
}

impl From<FaultToleranceError> for Failure {
    fn from(error: FaultToleranceError) -> Self {
        Failure::Error(error)
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid {policy} configuration: {message}")]
    Invalid { policy: &'static str, message: String },

    #[error("Unknown failure category '{name}'")]
    UnknownCategory { name: String },
}

impl ConfigError {
    pub fn invalid(policy: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid { policy, message: message.into() }
    }
}

/// Result type alias for configuration building
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
