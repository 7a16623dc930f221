//! # Bulwark Infrastructure
//!
//! Everything in Bulwark that touches the process environment or the clock
//! of a running system.
//!
//! This crate contains:
//! - The settings loader (`.env`, TOML/JSON files, environment overrides)
//! - Tracing subscriber initialisation
//! - The guarded executor composing fallback, retry, circuit breaker,
//!   timeout and bulkhead around an operation
//!
//! ## Architecture
//! - Builds on the decision logic in `bulwark-core`
//! - Depends on `bulwark-domain` and `bulwark-common`

pub mod config;
pub mod errors;
pub mod executor;
pub mod observability;

// Re-export commonly used items
pub use errors::{InfraError, InfraResult};
pub use executor::{GuardedExecutor, GuardedExecutorBuilder};
pub use observability::{init_tracing, LogFormat};
