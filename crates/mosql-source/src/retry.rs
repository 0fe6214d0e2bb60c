//! Connect retry with exponential backoff and jitter.
//!
//! Used when opening source and destination connections so a briefly
//! unavailable database does not fail a whole export run at startup.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::errors::{SourceError, SourceResult};

/// Exponential backoff policy. The backoff doubles after each attempt up to
/// `max`, with random jitter applied to avoid thundering herds.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
    /// Jitter factor in `[0.0, 1.0]`, applied as a ± fraction.
    pub jitter: f64,
    /// `None` retries until cancelled.
    pub max_retries: Option<u32>,
    current: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            jitter: 0.2,
            max_retries: Some(5),
            current: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(initial: Duration, max: Duration, jitter: f64, max_retries: Option<u32>) -> Self {
        Self {
            initial,
            max,
            jitter: jitter.clamp(0.0, 1.0),
            max_retries,
            current: initial,
        }
    }

    /// Next backoff duration, advancing the internal state.
    pub fn next_backoff(&mut self) -> Duration {
        let current = self.current;
        self.current = current.saturating_mul(2).min(self.max);

        if self.jitter > 0.0 {
            let factor = 1.0 + rand::rng().random_range(-self.jitter..self.jitter);
            current.mul_f64(factor).max(Duration::from_nanos(1))
        } else {
            current
        }
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        self.max_retries.map_or(true, |max| attempt < max)
    }
}

/// Run `op` until it succeeds, the policy is exhausted, or `cancel` fires.
pub async fn retry_connect<T, Fut, Op>(
    mut op: Op,
    mut policy: RetryPolicy,
    cancel: &CancellationToken,
    label: &'static str,
) -> SourceResult<T>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = SourceResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(SourceError::Cancelled);
        }

        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !policy.should_retry(attempt) {
                    return Err(err);
                }
                let backoff = policy.next_backoff();
                warn!(
                    label,
                    attempt,
                    error = %err,
                    backoff_ms = backoff.as_millis(),
                    "connect failed, backing off"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(SourceError::Cancelled),
                    _ = sleep(backoff) => {}
                }
            }
        }
    }
}
