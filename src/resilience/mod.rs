//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Usage recording dispatch:
//!     → retry.rs (bounded retries, backoff between attempts)
//!     → predicate decides which errors are worth another attempt
//! ```
//!
//! # Design Decisions
//! - Only best-effort work is retried; the quota check and the wrapped
//!   operation run exactly once
//! - Jittered backoff prevents retry storms when many events fail together

pub mod retry;

pub use retry::{with_retry, with_retry_if, BackoffStrategy, RetryPolicy};
