//! Uniform bounded retry for external calls.
//!
//! Every call that leaves the process (LLM turns, judge synthesis, summary
//! fetches, price lookups, experience retrieval) goes through `with_retry`:
//! a per-attempt timeout, exponential backoff between attempts, and a fixed
//! attempt budget. Non-retryable errors short-circuit immediately.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::types::AgoraError;

/// Retry knobs, loaded from the `[retry]` config section.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 500,
            timeout_secs: 60,
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `n + 1`, doubling per failed attempt.
    /// The exponent is capped so pathological configs cannot overflow.
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let exp = failed_attempts.saturating_sub(1).min(6);
        Duration::from_millis(self.base_backoff_ms.saturating_mul(1 << exp))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Run `call` under the policy: timeout each attempt, back off between
/// attempts, give up after `max_attempts` or on a non-retryable error.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, AgoraError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AgoraError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match tokio::time::timeout(policy.timeout(), call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) if err.is_retryable() && attempt < attempts => {
                warn!(operation, attempt, error = %err, "Retryable failure, backing off");
            }
            Ok(Err(err)) => return Err(err),
            Err(_) if attempt < attempts => {
                warn!(
                    operation,
                    attempt,
                    timeout_secs = policy.timeout_secs,
                    "Attempt timed out, backing off"
                );
            }
            Err(_) => {
                return Err(AgoraError::Timeout {
                    operation: operation.to_string(),
                    seconds: policy.timeout_secs,
                })
            }
        }
        tokio::time::sleep(policy.backoff(attempt)).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
