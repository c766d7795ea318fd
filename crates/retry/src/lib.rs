//! Retry helpers for calls against the DataKitchen platform
//!
//! - `ExponentialBackoff`: delay sequence with a multiplicative factor and a cap
//! - `RetryPolicy`: attempt count plus backoff parameters
//! - `retry_server_errors`: re-runs an async operation while its error is retryable

pub mod backoff;
pub mod policy;

pub use backoff::ExponentialBackoff;
pub use policy::{retry_server_errors, RetryPolicy, Retryable};
