use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            backoff_multiplier: 1.5,
        }
    }
}

impl RetryConfig {
    /// Clamps to at least one attempt and a non-shrinking delay.
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_multiplier: f64) -> Self {
        let backoff_multiplier = if backoff_multiplier.is_finite() {
            backoff_multiplier.max(1.0)
        } else {
            1.0
        };
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            backoff_multiplier,
        }
    }
}

/// Run `op` until it succeeds or `max_attempts` is used up, sleeping
/// between attempts (never after the last). Returns the first success or
/// the last failure.
pub async fn retry<T, E, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let config = RetryConfig::new(
        config.max_attempts,
        config.initial_delay,
        config.backoff_multiplier,
    );
    let mut delay = config.initial_delay;
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= config.max_attempts => return Err(err),
            Err(_) => {
                debug!(
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed; retrying"
                );
                sleep(delay).await;
                delay = delay.mul_f64(config.backoff_multiplier);
                attempt += 1;
            }
        }
    }
}

/// Like [`retry`] for operations with no structural error: a value that
/// fails `accept` counts as a failure. Returns the last value either way.
pub async fn retry_until<T, F, Fut, P>(config: &RetryConfig, mut op: F, accept: P) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
    P: Fn(&T) -> bool,
{
    let accept = &accept;
    let outcome = retry(config, move || {
        let attempt = op();
        async move {
            let value = attempt.await;
            if accept(&value) {
                Ok(value)
            } else {
                Err(value)
            }
        }
    })
    .await;
    match outcome {
        Ok(value) | Err(value) => value,
    }
}
