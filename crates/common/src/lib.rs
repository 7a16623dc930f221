//! Runtime building blocks shared across Bulwark crates.
//!
//! - [`time`]: monotonic clock abstraction with a mock for tests
//! - [`resilience`]: circuit breaker, bulkhead and histogram runtimes

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod resilience;
pub mod time;

// Re-export commonly used types
pub use resilience::{
    BreakerPermit, Bulkhead, BulkheadMode, BulkheadPermit, CircuitBreaker, CircuitState,
    Histogram, HistogramSnapshot,
};
pub use time::{Clock, MockClock, SystemClock};
