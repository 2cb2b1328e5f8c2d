use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::app::config::Config;
use crate::services::gateways::GatewayError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Espera antes da tentativa `attempt + 1` (attempt começa em 1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_backoff.as_secs_f64());

        let factor = if self.jitter {
            rand::thread_rng().gen_range(0.8..=1.2)
        } else {
            1.0
        };
        Duration::from_secs_f64((capped * factor).min(self.max_backoff.as_secs_f64()))
    }
}

/// Per-attempt timeout plus bounded retry of transient errors.
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    pub retry: RetryPolicy,
    pub attempt_timeout: Duration,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub struct DispatchOutcome<T> {
    pub result: Result<T, GatewayError>,
    pub attempts: u32,
}

impl DispatchPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry: RetryPolicy {
                max_attempts: config.retry_max_attempts.max(1),
                initial_backoff: Duration::from_millis(config.retry_initial_backoff_ms),
                max_backoff: Duration::from_millis(config.retry_max_backoff_ms),
                multiplier: 2.0,
                jitter: config.retry_jitter,
            },
            attempt_timeout: config.attempt_timeout(),
        }
    }

    /// Runs `op(attempt)` until it succeeds, fails permanently, or the attempt
    /// budget runs out. `on_retry` is told about every retry before the backoff.
    pub async fn run<T, F, Fut, R>(&self, mut op: F, mut on_retry: R) -> DispatchOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
        R: FnMut(u32, &GatewayError),
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = match timeout(self.attempt_timeout, op(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::Timeout(self.attempt_timeout)),
            };

            match result {
                Ok(value) => {
                    return DispatchOutcome {
                        result: Ok(value),
                        attempts: attempt,
                    }
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!("Attempt {} failed ({}), retrying in {:?}", attempt, e, delay);
                    on_retry(attempt, &e);
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!("Giving up after attempt {}: {}", attempt, e);
                    return DispatchOutcome {
                        result: Err(e),
                        attempts: attempt,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> DispatchPolicy {
        DispatchPolicy {
            retry: RetryPolicy {
                max_attempts,
                jitter: false,
                ..RetryPolicy::default()
            },
            attempt_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let retry = RetryPolicy {
            jitter: false,
            ..RetryPolicy::default()
        };
        assert_eq!(retry.backoff(1), Duration::from_millis(200));
        assert_eq!(retry.backoff(2), Duration::from_millis(400));
        assert_eq!(retry.backoff(3), Duration::from_millis(800));
        assert_eq!(retry.backoff(10), Duration::from_secs(2));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let retry = RetryPolicy::default();
        for _ in 0..100 {
            let delay = retry.backoff(2);
            assert!(delay >= Duration::from_millis(319) && delay <= Duration::from_millis(481));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let mut retries = Vec::new();

        let outcome = policy(3)
            .run(
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt < 3 {
                            Err(GatewayError::Transient("503".into()))
                        } else {
                            Ok(attempt)
                        }
                    }
                },
                |attempt, _| retries.push(attempt),
            )
            .await;

        assert_eq!(outcome.result.unwrap(), 3);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retries, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let outcome: DispatchOutcome<()> = policy(5)
            .run(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(GatewayError::Declined("card declined".into())) }
                },
                |_, _| {},
            )
            .await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(outcome.result, Err(GatewayError::Declined(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_attempt_times_out_and_budget_is_bounded() {
        let outcome: DispatchOutcome<()> = policy(2)
            .run(
                |_| async {
                    sleep(Duration::from_secs(3600)).await;
                    Ok(())
                },
                |_, _| {},
            )
            .await;

        assert_eq!(outcome.attempts, 2);
        assert!(matches!(outcome.result, Err(GatewayError::Timeout(_))));
    }
}
