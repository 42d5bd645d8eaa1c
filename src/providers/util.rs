use crate::core::error::QuoteUnavailable;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Bounded exponential backoff for quote requests.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Retries an async operation while it fails with a transient error
///
/// # Parameters
/// - `policy`: Attempt bound and backoff delays
/// - `label`: Describes the operation in logs
/// - `operation`: Closure returning a future
///
/// # Returns
/// Either the successful result, the first non-transient error, or the last
/// transient error once attempts are exhausted
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, QuoteUnavailable>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, QuoteUnavailable>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                debug!(
                    "Attempt {}/{} for {} failed: {}. Retrying in {:?}...",
                    attempt, max_attempts, label, err, delay
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
