//! Retry decision state machine

pub mod context;

pub use context::{RetryContext, RetryVerdict};
