//! # Bulwark Domain
//!
//! Shared vocabulary of the fault-tolerance engine.
//!
//! This crate contains:
//! - Failure categories and hierarchical "is-a" matching
//! - Error types (`FaultToleranceError`, `Failure`, `ConfigError`)
//! - Policy configuration structures with validating builders
//! - Operation descriptors
//! - The serializable settings model
//!
//! ## Architecture
//! - No dependencies on other Bulwark crates
//! - Only external dependencies allowed

pub mod category;
pub mod config;
pub mod constants;
pub mod errors;
pub mod operation;
pub mod settings;

// Re-export commonly used items
pub use category::FailureCategory;
pub use config::*;
pub use errors::*;
pub use operation::{Capabilities, OperationDescriptor};
pub use settings::{
    resolve_category, BulkheadSettings, CircuitBreakerSettings, FaultToleranceSettings,
    MetricsSettings, OperationSettings, RetrySettings, TimeoutSettings,
};
