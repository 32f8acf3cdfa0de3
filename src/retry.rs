use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng as _;

/// Retry decision returned by the error classifier callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    Retry,
    Abort,
}

/// Exponential backoff configuration with jitter so the three category
/// pipelines don't retry against the server in lockstep.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Compute the delay before retry number `retry` (0-indexed).
    ///
    /// Formula: `d = min(base_delay * 2^retry, max_delay)`, then a random
    /// value in `d/2..=d` so the cap is never exceeded.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(1u64.checked_shl(retry).unwrap_or(u64::MAX));
        let capped = exp_ms.min(max_ms);
        let half = capped / 2;
        let jittered = if capped > 0 {
            half + rand::thread_rng().gen_range(0..=capped - half)
        } else {
            0
        };
        Duration::from_millis(jittered)
    }
}

/// One failed attempt that is about to be retried.
#[derive(Debug)]
pub struct RetryEvent<'a> {
    pub operation: &'a str,
    /// 1-based number of the attempt that just failed.
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay: Duration,
    pub reason: String,
}

/// Receives a report for every attempt that is going to be retried, before
/// the executor sleeps.
pub trait RetryObserver: Send + Sync {
    fn on_retry(&self, event: &RetryEvent<'_>);
}

/// Production observer: turns retry events into `tracing` warnings.
#[derive(Debug, Default)]
pub struct TracingRetryObserver;

impl RetryObserver for TracingRetryObserver {
    fn on_retry(&self, event: &RetryEvent<'_>) {
        tracing::warn!(
            operation = event.operation,
            attempt = event.attempt,
            max_attempts = event.max_attempts,
            delay_ms = event.delay.as_millis() as u64,
            "{} failed, retrying: {}",
            event.operation,
            event.reason
        );
    }
}

/// Retry an async operation with exponential backoff and jitter.
///
/// - `config`: retry configuration
/// - `operation_name`: label carried on every retry event
/// - `observer`: notified of each failed attempt that will be retried
/// - `classifier`: inspects an error and returns `Retry` or `Abort`
/// - `operation`: the async closure to retry
///
/// Returns the first `Ok` result, or the last error unchanged if attempts
/// are exhausted or the classifier returns `Abort`.
pub async fn retry_with_backoff<F, Fut, T, E, C>(
    config: &RetryConfig,
    operation_name: &str,
    observer: &dyn RetryObserver,
    classifier: C,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> RetryAction,
    E: std::fmt::Display,
{
    let total_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if classifier(&e) == RetryAction::Abort || attempt >= total_attempts {
                    return Err(e);
                }
                let delay = config.delay_for_retry(attempt - 1);
                observer.on_retry(&RetryEvent {
                    operation: operation_name,
                    attempt,
                    max_attempts: total_attempts,
                    delay,
                    reason: e.to_string(),
                });
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// A retry configuration bound to an observer, shared by every call site
/// that talks to the remote service.
#[derive(Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    observer: Arc<dyn RetryObserver>,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RetryExecutor {
    pub fn new(config: RetryConfig, observer: Arc<dyn RetryObserver>) -> Self {
        Self { config, observer }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub async fn run<F, Fut, T, E, C>(
        &self,
        operation_name: &str,
        classifier: C,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> RetryAction,
        E: std::fmt::Display,
    {
        retry_with_backoff(
            &self.config,
            operation_name,
            self.observer.as_ref(),
            classifier,
            operation,
        )
        .await
    }
}
