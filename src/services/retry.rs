use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_MS: u64 = 1_000;

/// Declarative retry contract: a shared attempt budget, a fixed backoff before
/// every retry, and a secondary cap on validation-driven retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub max_validation_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
            max_validation_retries: DEFAULT_MAX_ATTEMPTS - 1,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        let max_attempts = max_attempts.max(1);
        Self {
            max_attempts,
            backoff,
            max_validation_retries: max_attempts - 1,
        }
    }

    pub fn with_validation_retries(mut self, retries: u32) -> Self {
        self.max_validation_retries = retries;
        self
    }
}

/// How a single attempt failed.
#[derive(Debug)]
pub enum AttemptError<T, E> {
    /// Transport or parse failure; retry while budget remains.
    Retryable(E),
    /// The attempt produced a value that failed a semantic check.
    Validation { value: T, error: E },
    /// Stop immediately.
    Fatal(E),
}

#[derive(Debug)]
pub enum RetryError<T, E> {
    /// Every attempt failed and none produced a usable value.
    Exhausted { attempts: u32, last: E },
    /// The budget ran out, but at least one attempt produced a value that only
    /// failed validation. `value` is the most recent such value.
    ValidationExhausted { attempts: u32, value: T, error: E },
    Fatal { attempts: u32, error: E },
}

impl<T, E> RetryError<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. }
            | Self::ValidationExhausted { attempts, .. }
            | Self::Fatal { attempts, .. } => *attempts,
        }
    }
}

/// Runs `op` under `policy`. `op` receives the 1-based attempt number.
pub async fn attempt_with_policy<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, RetryError<T, E>>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError<T, E>>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut validation_failures = 0u32;
    let mut degraded: Option<T> = None;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let last_error = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fatal(error)) => {
                return Err(RetryError::Fatal { attempts: attempt, error });
            }
            Err(AttemptError::Retryable(error)) => error,
            Err(AttemptError::Validation { value, error }) => {
                validation_failures += 1;
                degraded = Some(value);
                if validation_failures > policy.max_validation_retries {
                    return Err(finish(attempt, degraded, error));
                }
                error
            }
        };

        if attempt >= max_attempts {
            return Err(finish(attempt, degraded, last_error));
        }

        warn!(
            operation = label,
            attempt,
            max_attempts,
            error = %last_error,
            backoff_ms = policy.backoff.as_millis() as u64,
            "attempt failed, retrying"
        );
        sleep(policy.backoff).await;
    }
}

fn finish<T, E>(attempts: u32, degraded: Option<T>, error: E) -> RetryError<T, E> {
    match degraded {
        Some(value) => RetryError::ValidationExhausted { attempts, value, error },
        None => RetryError::Exhausted { attempts, last: error },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_budget_with_backoff_between_attempts() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), _> = attempt_with_policy(&policy(), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(AttemptError::Retryable("boom")) }
        })
        .await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, last: "boom" })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_later_attempt() {
        let result = attempt_with_policy(&policy(), "test", |attempt| async move {
            if attempt < 2 {
                Err(AttemptError::Retryable("flaky"))
            } else {
                Ok(attempt)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = attempt_with_policy(&policy(), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(AttemptError::Fatal("no key")) }
        })
        .await;
        assert_eq!(result.unwrap_err().attempts(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn validation_exhaustion_keeps_latest_value() {
        let result = attempt_with_policy(&policy(), "test", |attempt| async move {
            Err::<u32, _>(AttemptError::Validation { value: attempt, error: "short" })
        })
        .await;
        match result {
            Err(RetryError::ValidationExhausted { attempts, value, .. }) => {
                assert_eq!(attempts, 3);
                assert_eq!(value, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn validation_budget_is_separate_but_shares_the_counter() {
        let calls = AtomicU32::new(0);
        let policy = policy().with_validation_retries(0);
        let result = attempt_with_policy(&policy, "test", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 1 {
                    Err(AttemptError::Retryable("transport"))
                } else {
                    Err(AttemptError::Validation { value: attempt, error: "short" })
                }
            }
        })
        .await;
        assert!(matches!(result, Err(RetryError::ValidationExhausted { attempts: 2, value: 2, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
