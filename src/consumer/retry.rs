//! Bounded retry with exponential back-off and jitter.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::consumer::error::{ConsumerError, ConsumerResult, ErrorKind};

/// Retry discipline for transient failures.
///
/// `attempt` is everywhere the 0-indexed count of failed attempts so far: a
/// policy with `max_retries = 0` permits exactly one attempt.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Hard ceiling; once reached, the record is routed to the DLQ.
    pub max_retries: u32,
    /// Initial back-off delay.
    pub base_delay: Duration,
    /// Cap so the worker never sleeps unbounded.
    pub max_delay: Duration,
    /// Exponential factor, typically 2.0.
    pub multiplier: f64,
    /// Fraction of the delay randomised, in `[0, 1]`.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter_ratio: 0.3,
        }
    }
}

impl RetryPolicy {
    /// True when the failure is transient and the budget is not exhausted.
    pub fn should_retry(&self, kind: ErrorKind, attempt: u32) -> bool {
        kind == ErrorKind::Transient && attempt < self.max_retries
    }

    /// Back-off delay for attempt `n` (0-indexed).
    ///
    /// Computed in floating point so exponential growth cannot overflow;
    /// clamped to `max_delay` before jitter is applied.
    pub fn delay(&self, attempt: u32) -> Duration {
        let mut delay = self.base_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let max = self.max_delay.as_secs_f64();
        if delay > max {
            delay = max;
        }

        // ±jitter_ratio of the clamped delay
        let jitter = delay * self.jitter_ratio * (rand::random::<f64>() * 2.0 - 1.0);
        delay += jitter;
        if delay < 0.0 {
            delay = self.base_delay.as_secs_f64();
        }

        Duration::from_secs_f64(delay)
    }

    /// Sleep for `delay(attempt)`, returning early with
    /// [`ConsumerError::Cancelled`] if shutdown fires first.
    pub async fn sleep(&self, attempt: u32, cancel: &CancellationToken) -> ConsumerResult<()> {
        let d = self.delay(attempt);
        debug!(attempt, delay_ms = d.as_millis() as u64, "backing off before retry");
        tokio::select! {
            _ = cancel.cancelled() => Err(ConsumerError::Cancelled),
            _ = tokio::time::sleep(d) => Ok(()),
        }
    }
}
