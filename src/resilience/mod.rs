//! Resilience helpers shared by the tiers.

pub mod retry;

pub use retry::{retry, RetryConfig};
