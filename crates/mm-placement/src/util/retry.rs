//! Bounded exponential backoff.

use crate::config::RetryConfig;
use std::fmt;
use std::future::Future;
use tracing::warn;

/// Run `op`, retrying on failure with exponentially growing delays.
///
/// The policy bounds the number of retries; the final error is returned
/// unchanged. Backoff applies per call, not per reconciler cycle.
pub async fn retry_exp<T, E, F, Fut>(mut op: F, policy: &RetryConfig) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.attempts {
                    return Err(err);
                }
                let delay = policy.base_delay() * 2u32.saturating_pow(attempt);
                warn!(
                    retry = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "ledger call failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
