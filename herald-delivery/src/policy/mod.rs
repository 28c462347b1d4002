//! Policies applied by the worker pool

mod retry;

pub use retry::{RetryDecision, RetryPolicy};
