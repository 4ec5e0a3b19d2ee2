use crate::error::ForgeError;
use crate::retry::timeout::with_timeout;
use futures::future::join_all;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Backoff configuration for [`retry_with_backoff`]
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; a permanent failure runs `max_retries + 1` times
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fractional jitter applied to each delay (0.1 = ±10%)
    pub jitter: f64,
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.1,
            attempt_timeout: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Default::default()
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31) as i32;
        let raw = self.base_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());

        let jittered = if self.jitter > 0.0 {
            let spread = (rand::random::<f64>() - 0.5) * 2.0 * self.jitter;
            (capped * (1.0 + spread)).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered)
    }
}

/// Result of a retried operation
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, ForgeError>,
    pub attempts: u32,
    pub total_duration: Duration,
}

impl<T> RetryOutcome<T> {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> Result<T, ForgeError> {
        self.result
    }
}

/// Retry `op` while its failures are recoverable.
///
/// `op` receives the 1-based attempt number.
pub async fn retry_with_backoff<T, F, Fut>(operation: &str, policy: &RetryPolicy, op: F) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ForgeError>>,
{
    retry_with_backoff_if(operation, policy, ForgeError::is_recoverable, op).await
}

/// Retry `op` while `should_retry` accepts its failure
pub async fn retry_with_backoff_if<T, F, Fut, P>(
    operation: &str,
    policy: &RetryPolicy,
    should_retry: P,
    mut op: F,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ForgeError>>,
    P: Fn(&ForgeError) -> bool,
{
    let started = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = match policy.attempt_timeout {
            Some(limit) => with_timeout(operation, limit, op(attempt)).await,
            None => op(attempt).await,
        };

        let error = match result {
            Ok(value) => {
                if attempt > 1 {
                    debug!("Operation '{}' succeeded on attempt {}", operation, attempt);
                }
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                    total_duration: started.elapsed(),
                };
            }
            Err(error) => error,
        };

        let retries_used = attempt - 1;
        if retries_used >= policy.max_retries || !should_retry(&error) {
            if retries_used >= policy.max_retries && should_retry(&error) {
                warn!(
                    "Operation '{}' failed after {} attempts: {}",
                    operation, attempt, error
                );
            } else {
                debug!(
                    "Operation '{}' failed with non-retryable error on attempt {}: {}",
                    operation, attempt, error
                );
            }
            return RetryOutcome {
                result: Err(error),
                attempts: attempt,
                total_duration: started.elapsed(),
            };
        }

        let delay = policy.delay_for(attempt);
        debug!(
            "Operation '{}' attempt {} failed ({}), retrying in {:?}",
            operation,
            attempt,
            error.code(),
            delay
        );
        tokio::time::sleep(delay).await;
    }
}

/// Apply [`retry_with_backoff`] to every item independently.
///
/// Items run concurrently; one item's failure never cancels the others. Outcomes
/// are returned in input order.
pub async fn retry_batch<I, T, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    items: Vec<I>,
    op: F,
) -> Vec<RetryOutcome<T>>
where
    I: Clone,
    F: Fn(I, u32) -> Fut,
    Fut: Future<Output = Result<T, ForgeError>>,
{
    let op = &op;
    let runs = items.into_iter().enumerate().map(|(index, item)| async move {
        let name = format!("{}[{}]", operation, index);
        retry_with_backoff(&name, policy, |attempt| op(item.clone(), attempt)).await
    });
    join_all(runs).await
}
