//! Retry with per-attempt timeout and exponential backoff.
//!
//! Every driver funnels its network I/O through [`RetryPolicy::run`]. State is
//! local to the call, so concurrent operations never share a backoff.

use std::future::Future;
use std::time::Duration;

use log::warn;
use tokio_util::sync::CancellationToken;

use crate::error::{NetTraceError, NetTraceResult};

/// Upper bound for a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Bounded retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    retries: u32,
    delay: Duration,
    timeout: Duration,
}

impl RetryPolicy {
    /// `retries` extra attempts after the first, starting `delay` apart, each bounded by `timeout`.
    pub const fn new(retries: u32, delay: Duration, timeout: Duration) -> Self {
        Self {
            retries,
            delay,
            timeout,
        }
    }

    /// A single attempt bounded by `timeout`.
    pub const fn no_retry(timeout: Duration) -> Self {
        Self::new(0, Duration::ZERO, timeout)
    }

    pub const fn retries(&self) -> u32 {
        self.retries
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or retries run out.
    ///
    /// `op` receives the zero-based attempt number. Each attempt is cut off after
    /// the policy timeout (reported as `NETWORK_TIMEOUT`); cancelling `cancel`
    /// aborts immediately with `CANCELLED`, including during a backoff sleep.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        operation: &str,
        mut op: F,
    ) -> NetTraceResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = NetTraceResult<T>>,
    {
        let mut attempt = 0;
        loop {
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(NetTraceError::cancelled(operation)),
                r = tokio::time::timeout(self.timeout, op(attempt)) => r,
            };

            let err = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => NetTraceError::timeout(operation, self.timeout),
            };

            if attempt >= self.retries || !err.is_retryable() {
                return Err(err);
            }

            let delay = self.backoff_delay(attempt);
            warn!(
                "[RETRY] {} failed (attempt {}/{}), retrying in {:.1}s: {}",
                operation,
                attempt + 1,
                self.retries + 1,
                delay.as_secs_f32(),
                err
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(NetTraceError::cancelled(operation)),
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    /// Backoff before retry number `attempt + 1`: `delay`, `2 * delay`, `4 * delay`, ...
    ///
    /// Capped at 10 seconds.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let capped_attempt = attempt.min(20); // Prevent 2^attempt from overflowing
        self.delay
            .saturating_mul(1_u32 << capped_attempt)
            .min(MAX_BACKOFF)
    }
}
