//! Guarded executor
//!
//! Composes the configured policies around an async operation and drives
//! the metrics collector hooks for every attempt.
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use bulwark_domain::{FaultToleranceError, RetryConfig};
//! use bulwark_infra::executor::GuardedExecutor;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = GuardedExecutor::builder("billing::client", "charge")
//!     .retry(RetryConfig::builder().max_retries(2).delay(Duration::from_millis(10)).build()?)
//!     .build()?;
//!
//! let receipt = executor
//!     .execute(|| async { Ok::<_, FaultToleranceError>("receipt-42") })
//!     .await?;
//! assert_eq!(receipt, "receipt-42");
//! # Ok(())
//! # }
//! ```

mod builder;
mod guarded;

pub use builder::GuardedExecutorBuilder;
pub use guarded::{GuardedExecutor, SharedClock};
