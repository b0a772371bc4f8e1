//! Retry policy for external calls.
//!
//! Attempts are bounded, backoff is linear in the number of failures so far,
//! and a caller-supplied predicate decides which errors are worth retrying.
//! Non-retryable errors end the loop after the attempt that produced them.
use super::cancel::CancelSignal;
use std::future::Future;
use std::time::Duration;

/// Backoff added per failure (the n-th retry waits n steps).
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

/// How a retry loop ended.
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { attempts: u32, last_error: E },
    Aborted { attempts: u32, error: E },
    Cancelled { attempts: u32 },
}

impl RetryPolicy {
    /// Build a policy; `max_attempts` is clamped to at least one attempt.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_step: DEFAULT_BACKOFF_STEP,
        }
    }

    pub fn with_backoff_step(mut self, step: Duration) -> Self {
        self.backoff_step = step;
        self
    }

    pub fn backoff(&self, failures: u32) -> Duration {
        self.backoff_step * failures
    }

    /// Drive `op` until it succeeds, fails with a non-retryable error,
    /// runs out of attempts, or `cancel` fires.
    ///
    /// `op` receives the 1-based attempt number. Cancellation interrupts both
    /// the in-flight attempt and the backoff sleep.
    pub async fn run<T, E, F, Fut, P>(
        &self,
        cancel: &CancelSignal,
        is_retryable: P,
        mut op: F,
    ) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut attempts = 0;
        loop {
            if cancel.is_cancelled() {
                return RetryOutcome::Cancelled { attempts };
            }
            attempts += 1;
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return RetryOutcome::Cancelled { attempts },
                result = op(attempts) => result,
            };
            let error = match result {
                Ok(value) => return RetryOutcome::Succeeded { value, attempts },
                Err(error) => error,
            };
            if !is_retryable(&error) {
                return RetryOutcome::Aborted { attempts, error };
            }
            if attempts >= self.max_attempts {
                return RetryOutcome::Exhausted {
                    attempts,
                    last_error: error,
                };
            }
            let delay = self.backoff(attempts);
            tracing::debug!(
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "retrying after transient failure"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return RetryOutcome::Cancelled { attempts },
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoke::cancel;
    use std::cell::Cell;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Flaky,
        Broken,
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts).with_backoff_step(Duration::ZERO)
    }

    #[test]
    fn backoff_grows_linearly() {
        let policy = RetryPolicy::new(5);
        assert_eq!(policy.backoff(1), Duration::from_millis(150));
        assert_eq!(policy.backoff(3), Duration::from_millis(450));
    }

    #[test]
    fn zero_attempts_are_clamped_to_one() {
        assert_eq!(RetryPolicy::new(0).max_attempts, 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = Cell::new(0);
        let outcome = policy(5)
            .run(
                &CancelSignal::never(),
                |err: &TestError| *err == TestError::Flaky,
                |_| {
                    calls.set(calls.get() + 1);
                    let current = calls.get();
                    async move {
                        if current < 3 {
                            Err(TestError::Flaky)
                        } else {
                            Ok(current)
                        }
                    }
                },
            )
            .await;
        assert!(matches!(
            outcome,
            RetryOutcome::Succeeded {
                value: 3,
                attempts: 3
            }
        ));
    }

    #[tokio::test]
    async fn non_retryable_error_stops_after_one_attempt() {
        let outcome: RetryOutcome<(), _> = policy(5)
            .run(
                &CancelSignal::never(),
                |err: &TestError| *err == TestError::Flaky,
                |_| async { Err(TestError::Broken) },
            )
            .await;
        assert!(matches!(
            outcome,
            RetryOutcome::Aborted {
                attempts: 1,
                error: TestError::Broken
            }
        ));
    }

    #[tokio::test]
    async fn cancel_interrupts_backoff_sleep() {
        let (handle, signal) = cancel::channel();
        let slow = RetryPolicy::new(5).with_backoff_step(Duration::from_secs(30));
        let started = std::time::Instant::now();
        let outcome: RetryOutcome<(), _> = slow
            .run(
                &signal,
                |_: &TestError| true,
                |_| {
                    handle.cancel();
                    async { Err(TestError::Flaky) }
                },
            )
            .await;
        assert!(matches!(outcome, RetryOutcome::Cancelled { attempts: 1 }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
