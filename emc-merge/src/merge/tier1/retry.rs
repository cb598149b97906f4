//! Lookup Retry Logic
//!
//! Implements bounded exponential backoff for transient lookup failures.
//! Every attempt runs under its own timeout so a stalled service can never
//! block the run indefinitely.

use emc_common::config::ResolverConfig;
use std::future::Future;
use std::time::{Duration, Instant};

use super::lookup::{LookupError, LookupResult};

/// Timeout and backoff settings for one lookup call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Per-attempt timeout
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ResolverConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Retry a lookup with exponential backoff.
///
/// **Algorithm:**
/// 1. Attempt operation under `policy.timeout`
/// 2. If it answers (hit or not found), return it
/// 3. If the error is transient (timeout, transport, throttling):
///    a. If retries remain: log WARN, backoff, retry
///    b. Otherwise: log ERROR, return the last error
/// 4. Any other error is returned immediately (no retry)
///
/// **Backoff Strategy:**
/// - Initial delay: `policy.initial_backoff`
/// - Multiplier: 2.0, capped at `policy.max_backoff`
///
/// # Returns
/// The final result and the number of attempts made
pub async fn retry_lookup<F, Fut>(
    operation_name: &str,
    policy: &RetryPolicy,
    operation: F,
) -> (LookupResult, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LookupResult>,
{
    retry_with_backoff(operation_name, policy, operation).await
}

/// `retry_lookup` for any lookup answer, e.g. a batch of names
pub async fn retry_with_backoff<T, F, Fut>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> (Result<T, LookupError>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LookupError>>,
{
    let start_time = Instant::now();
    let mut attempt = 0u32;
    let mut backoff = policy.initial_backoff;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(operation = operation_name, attempt, "Retrying lookup");
        }

        let outcome = match tokio::time::timeout(policy.timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(LookupError::Timeout(policy.timeout.as_millis() as u64)),
        };

        match outcome {
            Ok(answer) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis(),
                        "Lookup succeeded after retry"
                    );
                }
                return (Ok(answer), attempt);
            }
            Err(err) if !err.is_transient() => {
                tracing::warn!(operation = operation_name, attempt, error = %err, "Lookup failed");
                return (Err(err), attempt);
            }
            Err(err) => {
                if attempt > policy.max_retries {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis(),
                        error = %err,
                        "Lookup failed: retries exhausted"
                    );
                    return (Err(err), attempt);
                }

                let delay = backoff.min(policy.max_backoff);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = delay.as_millis(),
                    error = %err,
                    "Transient lookup failure, will retry after backoff"
                );

                tokio::time::sleep(delay).await;
                backoff = (backoff * 2).min(policy.max_backoff);
            }
        }
    }
}
