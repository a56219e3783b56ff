use std::future::Future;
use std::time::Duration;

use drivethru_core::config::RetryConfig;
use rand::Rng;
use thiserror::Error;
use tracing::warn;

use crate::llm::DecisionError;

#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub backoff_factor: f64,
    pub max_interval: Duration,
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_interval: config.initial_interval(),
            backoff_factor: config.backoff_factor,
            max_interval: config.max_interval(),
            jitter_ratio: config.jitter_ratio.clamp(0.0, 1.0),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt + 1`. `jitter` is a sample in `[-1, 1]`.
    /// The result never exceeds `max_interval`, jitter included.
    pub fn delay_for(&self, attempt: u32, jitter: f64) -> Duration {
        let exponent = attempt.min(16) as i32;
        let base_ms = self.initial_interval.as_millis() as f64 * self.backoff_factor.powi(exponent);
        let max_ms = self.max_interval.as_millis() as f64;
        let jittered_ms = base_ms.min(max_ms) * (1.0 + self.jitter_ratio * jitter.clamp(-1.0, 1.0));
        Duration::from_millis(jittered_ms.clamp(0.0, max_ms).round() as u64)
    }

    fn next_delay(&self, attempt: u32, error: &DecisionError) -> Duration {
        let sample = rand::thread_rng().gen_range(-1.0..=1.0);
        let backoff = self.delay_for(attempt, sample);
        match error.retry_after() {
            Some(hint) => backoff.max(hint).min(self.max_interval),
            None => backoff.min(self.max_interval),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RetryError {
    #[error("decision provider failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: DecisionError },
    #[error(transparent)]
    NonRetryable(DecisionError),
}

/// Re-runs the Reason call on transient provider failures with jittered
/// exponential backoff.
#[derive(Clone, Debug, Default)]
pub struct RetrySupervisor {
    policy: RetryPolicy,
}

impl RetrySupervisor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DecisionError>>,
    {
        let mut attempt = 0_u32;
        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            if !error.is_transient() {
                return Err(RetryError::NonRetryable(error));
            }

            attempt += 1;
            if attempt >= self.policy.max_attempts {
                return Err(RetryError::Exhausted { attempts: attempt, last: error });
            }

            let delay = self.policy.next_delay(attempt - 1, &error);
            warn!(
                event_name = "retry.attempt_failed",
                attempt,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transient decision failure, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::{RetryError, RetryPolicy, RetrySupervisor};
    use crate::llm::DecisionError;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_interval: Duration::from_millis(1),
            backoff_factor: 2.0,
            max_interval: Duration::from_millis(4),
            jitter_ratio: 0.25,
        }
    }

    #[test]
    fn delay_grows_by_factor_and_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_interval: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_interval: Duration::from_millis(3_000),
            jitter_ratio: 0.25,
        };

        assert_eq!(policy.delay_for(0, 0.0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1, 0.0), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(2, 0.0), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(3, 0.0), Duration::from_millis(3_000));
        assert_eq!(policy.delay_for(40, 0.0), Duration::from_millis(3_000));
    }

    #[test]
    fn jitter_stays_within_ratio() {
        let policy = RetryPolicy { initial_interval: Duration::from_millis(1_000), ..policy(3) };
        let policy = RetryPolicy { max_interval: Duration::from_millis(10_000), ..policy };

        assert_eq!(policy.delay_for(0, 1.0), Duration::from_millis(1_250));
        assert_eq!(policy.delay_for(0, -1.0), Duration::from_millis(750));
        assert_eq!(policy.delay_for(0, 7.0), Duration::from_millis(1_250));
    }

    #[test]
    fn jitter_never_pushes_a_capped_delay_past_the_max_interval() {
        let policy = RetryPolicy {
            max_attempts: 6,
            initial_interval: Duration::from_millis(500),
            backoff_factor: 2.0,
            max_interval: Duration::from_millis(3_000),
            jitter_ratio: 0.25,
        };

        assert_eq!(policy.delay_for(10, 1.0), Duration::from_millis(3_000));
        assert_eq!(policy.delay_for(10, -1.0), Duration::from_millis(2_250));
        for attempt in 0..20 {
            assert!(policy.delay_for(attempt, 1.0) <= policy.max_interval);
        }
    }

    #[test]
    fn retry_after_hint_is_honored_up_to_the_max_interval() {
        let policy = RetryPolicy { max_interval: Duration::from_millis(3_000), ..policy(3) };

        let short = DecisionError::RateLimited { retry_after: Some(Duration::from_millis(2_000)) };
        let delay = policy.next_delay(0, &short);
        assert!(delay >= Duration::from_millis(2_000) && delay <= policy.max_interval);

        let long = DecisionError::RateLimited { retry_after: Some(Duration::from_secs(60)) };
        assert_eq!(policy.next_delay(0, &long), policy.max_interval);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let supervisor = RetrySupervisor::new(policy(3));

        let result = supervisor
            .run(|| {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call < 2 {
                        Err(DecisionError::Timeout(Duration::from_secs(1)))
                    } else {
                        Ok("answer")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("answer"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_attempts_and_last_error() {
        let calls = AtomicU32::new(0);
        let supervisor = RetrySupervisor::new(policy(2));

        let result: Result<(), RetryError> = supervisor
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DecisionError::RateLimited { retry_after: None }) }
            })
            .await;

        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                attempts: 2,
                last: DecisionError::RateLimited { retry_after: None },
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn malformed_output_is_not_retried() {
        let calls = AtomicU32::new(0);
        let supervisor = RetrySupervisor::new(policy(5));

        let result: Result<(), RetryError> = supervisor
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DecisionError::MalformedOutput("not json".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(RetryError::NonRetryable(DecisionError::MalformedOutput(_)))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
