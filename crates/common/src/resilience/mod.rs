//! Runtime resilience primitives
//!
//! - **Circuit Breaker**: rolling-window breaker with per-state time
//!   accounting
//! - **Bulkhead**: concurrency limiter with optional waiting queue
//! - **Histogram**: lock-free duration distribution
//!
//! Policy configuration lives in `bulwark-domain`; these types only hold
//! runtime state.

pub mod bulkhead;
pub mod circuit_breaker;
pub mod histogram;

// Re-export commonly used items
pub use bulkhead::{Bulkhead, BulkheadMode, BulkheadPermit};
pub use circuit_breaker::{BreakerPermit, CircuitBreaker, CircuitState};
pub use histogram::{Histogram, HistogramSnapshot};
