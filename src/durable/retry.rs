use crate::error::{ActivityError, ActivityFailure, FailureKind};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How many times an activity may be attempted. Non-retryable errors stop
/// either policy after the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryPolicy {
    Unbounded,
    Bounded(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    pub initial_interval: Duration,
    pub coefficient: f64,
    pub maximum_interval: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            coefficient: 2.0,
            maximum_interval: Duration::from_secs(100),
        }
    }
}

impl Backoff {
    /// Delay after the `attempt`-th failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let secs = self.initial_interval.as_secs_f64() * self.coefficient.powi(exponent);
        let capped = secs.min(self.maximum_interval.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// policy runs out of attempts.
pub async fn retry<T, F, Fut>(
    step: &str,
    policy: RetryPolicy,
    backoff: &Backoff,
    mut op: F,
) -> Result<T, ActivityFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ActivityError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.retryable {
            return Err(failure(step, err, attempt, FailureKind::NonRetryable));
        }
        if let RetryPolicy::Bounded(max) = policy
            && attempt >= max.max(1)
        {
            return Err(failure(step, err, attempt, FailureKind::RetriesExhausted));
        }
        let delay = backoff.delay(attempt);
        warn!(step, attempt, ?delay, error = %err, "activity failed, retrying");
        tokio::time::sleep(delay).await;
    }
}

fn failure(step: &str, err: ActivityError, attempts: u32, kind: FailureKind) -> ActivityFailure {
    ActivityFailure {
        step: step.to_string(),
        message: err.message,
        attempts,
        kind,
    }
}
