//! Time abstractions
//!
//! - **[`clock`]**: real and mock monotonic clocks

pub mod clock;

// Re-export commonly used items
pub use clock::{Clock, MockClock, SystemClock};
