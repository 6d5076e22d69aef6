//! Bounded retries with selectable backoff.
//!
//! # Responsibilities
//! - Compute per-attempt delays (fixed, linear, exponential) with optional
//!   cap and jitter
//! - Execute an async operation with bounded retries
//! - Let callers cut retries short with a predicate
//!
//! # Design Decisions
//! - Jittered backoff prevents thundering herd
//! - The predicate sees the error and the attempt number, so callers can
//!   retry only transient failure classes
//! - Each retry emits a debug event and a metrics counter before sleeping

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::schema::RetryConfig;
use crate::observability::metrics;

/// Shape of the delay curve between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Every delay equals the initial delay.
    Fixed,
    /// Delay grows as `initial * attempt`.
    Linear,
    /// Delay grows as `initial * 2^(attempt-1)`.
    Exponential,
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential
    }
}

/// Retry policy: how many times, and how long to wait between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries permitted after the initial attempt.
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Delay curve.
    pub backoff: BackoffStrategy,

    /// Cap on any single delay. `None` = uncapped.
    pub max_delay: Option<Duration>,

    /// Add 0-10% random spread to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(250),
            backoff: BackoffStrategy::Exponential,
            max_delay: Some(Duration::from_secs(5)),
            jitter: false,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            backoff: config.backoff,
            max_delay: config.max_delay_ms.map(Duration::from_millis),
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based). All arithmetic
    /// saturates; the optional cap applies before jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.initial_delay.as_millis() as u64;
        let delay_ms = match self.backoff {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Linear => base_ms.saturating_mul(attempt as u64),
            BackoffStrategy::Exponential => {
                base_ms.saturating_mul(2u64.saturating_pow(attempt - 1))
            }
        };
        let capped = match self.max_delay {
            Some(max) => delay_ms.min(max.as_millis() as u64),
            None => delay_ms,
        };

        // Apply jitter (0 to 10% of the delay)
        let jitter = if self.jitter && capped >= 10 {
            rand::thread_rng().gen_range(0..capped / 10)
        } else {
            0
        };

        Duration::from_millis(capped.saturating_add(jitter))
    }
}

/// Run `operation`, retrying every failure up to the policy's budget.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    with_retry_if(policy, |_, _| true, operation).await
}

/// Run `operation`, retrying failures for which `should_retry(&err, attempt)`
/// returns true. The last permitted attempt, or a `false` predicate,
/// propagates the error immediately.
pub async fn with_retry_if<T, E, P, F, Fut>(
    policy: &RetryPolicy,
    mut should_retry: P,
    mut operation: F,
) -> Result<T, E>
where
    P: FnMut(&E, u32) -> bool,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt > policy.max_retries || !should_retry(&err, attempt) {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after failure"
                );
                metrics::record_retry("usage_recording");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
