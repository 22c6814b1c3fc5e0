//! Exponential backoff for bus (re)connection.
//!
//! Not a polling loop: each failed attempt sleeps via
//! [`tokio::time::sleep`], which is a cancellable suspension point, not
//! a busy wait. Callers race the sleep against the shutdown signal so
//! the retry chain can be cut short.

use std::time::Duration;

/// Connects with exponential backoff: initial delay, multiplied each
/// attempt up to a cap, bounded by `max_attempts`. After exhausting
/// attempts the caller is expected to fall back to a slower background
/// retry loop.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            multiplier: 1.5,
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl BackoffPolicy {
    /// The delay before attempt number `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt.saturating_sub(1) as i32);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }

    /// Runs `connect` up to `max_attempts` times, sleeping between
    /// failures per [`Self::delay_for_attempt`]. Returns the last error
    /// if every attempt fails.
    pub async fn retry<F, Fut, T, E>(&self, mut connect: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match connect().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "bus connect attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_by_multiplier_until_cap() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs_f64(3.0));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs_f64(4.5));
        // Keeps climbing until it saturates at the cap.
        assert_eq!(policy.delay_for_attempt(20), policy.max_delay);
    }

    #[tokio::test]
    async fn retry_succeeds_once_connect_stops_failing() {
        let policy = BackoffPolicy {
            initial_delay: Duration::from_millis(1),
            multiplier: 1.0,
            max_delay: Duration::from_millis(1),
            max_attempts: 5,
        };

        let mut attempts = 0;
        let result: Result<i32, &str> = policy
            .retry(|| {
                attempts += 1;
                async move {
                    if attempts < 3 {
                        Err("not yet")
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_attempts() {
        let policy = BackoffPolicy {
            initial_delay: Duration::from_millis(1),
            multiplier: 1.0,
            max_delay: Duration::from_millis(1),
            max_attempts: 3,
        };

        let mut attempts = 0;
        let result: Result<i32, &str> = policy
            .retry(|| {
                attempts += 1;
                async move { Err("always fails") }
            })
            .await;

        assert_eq!(result, Err("always fails"));
        assert_eq!(attempts, 3);
    }
}
