//! Deadline-bounded retry loop
//!
//! The unit of work reports one of three outcomes per invocation. Retries
//! happen at a fixed interval (no exponential backoff) until the deadline.

use crate::classify::ClassifiedError;
use crate::context::deadline_after;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Outcome of one invocation of a unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T, E> {
    /// Finished with a value
    Done(T),
    /// Not finished yet, try again; the reason is logged and kept for timeouts
    Retry(String),
    /// Finished with an error that must not be retried
    Fail(E),
}

impl<T> Attempt<T, ClassifiedError> {
    /// Map a classified call result onto an attempt outcome
    pub fn from_classified(result: Result<T, ClassifiedError>) -> Self {
        match result {
            Ok(value) => Attempt::Done(value),
            Err(err) if !err.class.stops_retry() => Attempt::Retry(err.to_string()),
            Err(err) => Attempt::Fail(err),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    #[error("{0}")]
    Fatal(E),

    #[error("gave up after {attempts} attempt(s) in {waited:?}: {last_reason}")]
    TimedOut {
        attempts: u32,
        waited: Duration,
        last_reason: String,
    },
}

/// Fixed-interval retry controller
#[derive(Debug, Clone, Copy)]
pub struct RetryController {
    interval: Duration,
}

impl RetryController {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Invoke `unit` until it is done, fails, or `deadline` passes
    ///
    /// The first invocation always happens. An invocation still running at
    /// `deadline + interval` is abandoned, so the call returns within that
    /// bound.
    pub async fn run<T, E, F, Fut>(&self, deadline: Instant, mut unit: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Attempt<T, E>>,
    {
        let started = Instant::now();
        let abandon_at = deadline_after(deadline, self.interval);
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let reason = match tokio::time::timeout_at(abandon_at, unit()).await {
                Ok(Attempt::Done(value)) => return Ok(value),
                Ok(Attempt::Fail(err)) => return Err(RetryError::Fatal(err)),
                Ok(Attempt::Retry(reason)) => reason,
                Err(_) => {
                    return Err(RetryError::TimedOut {
                        attempts,
                        waited: started.elapsed(),
                        last_reason: "attempt still running at the deadline".to_string(),
                    });
                }
            };

            let now = Instant::now();
            if now >= deadline {
                return Err(RetryError::TimedOut {
                    attempts,
                    waited: now - started,
                    last_reason: reason,
                });
            }

            let pause = self.interval.min(deadline - now);
            tracing::debug!(attempt = attempts, reason = %reason, pause = ?pause, "retrying");
            tokio::time::sleep(pause).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorClass;
    use crate::transport::TransportError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_done_on_first_attempt() {
        let controller = RetryController::new(Duration::from_secs(1));
        let deadline = Instant::now() + Duration::from_secs(10);
        let result: Result<u32, RetryError<String>> =
            controller.run(deadline, || async { Attempt::Done(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_is_invoked_at_least_twice() {
        let controller = RetryController::new(Duration::from_secs(1));
        let calls = &AtomicU32::new(0);
        let deadline = Instant::now() + Duration::from_secs(5);

        let result = controller
            .run(deadline, move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Attempt::<_, String>::Retry(format!("busy {n}"))
                } else {
                    Attempt::Done(n)
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_stops_immediately() {
        let controller = RetryController::new(Duration::from_secs(1));
        let calls = &AtomicU32::new(0);
        let deadline = Instant::now() + Duration::from_secs(5);

        let result: Result<(), _> = controller
            .run(deadline, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Attempt::Fail("denied".to_string())
            })
            .await;

        assert_eq!(result, Err(RetryError::Fatal("denied".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_within_bounds() {
        let interval = Duration::from_secs(2);
        let budget = Duration::from_secs(7);
        let controller = RetryController::new(interval);
        let start = Instant::now();

        let result: Result<(), RetryError<String>> = controller
            .run(start + budget, || async {
                Attempt::Retry("still running".to_string())
            })
            .await;

        let elapsed = Instant::now() - start;
        assert!(elapsed >= budget, "returned early: {elapsed:?}");
        assert!(elapsed <= budget + interval, "returned late: {elapsed:?}");
        match result {
            Err(RetryError::TimedOut {
                attempts,
                last_reason,
                ..
            }) => {
                assert!(attempts >= 2);
                assert_eq!(last_reason, "still running");
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_shorter_than_interval() {
        let controller = RetryController::new(Duration::from_secs(10));
        let calls = &AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<(), RetryError<String>> = controller
            .run(start + Duration::from_secs(3), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Attempt::Retry("pending".to_string())
            })
            .await;

        assert!(matches!(result, Err(RetryError::TimedOut { attempts: 2, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(Instant::now() - start, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_attempt_is_abandoned() {
        let interval = Duration::from_secs(1);
        let controller = RetryController::new(interval);
        let start = Instant::now();

        let result: Result<(), RetryError<String>> = controller
            .run(start + Duration::from_secs(5), || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Attempt::Done(())
            })
            .await;

        assert!(matches!(result, Err(RetryError::TimedOut { attempts: 1, .. })));
        assert_eq!(Instant::now() - start, Duration::from_secs(6));
    }

    #[test]
    fn test_from_classified() {
        let busy = ClassifiedError {
            class: ErrorClass::Retryable,
            source: TransportError::api("ResourceBusy", "locked"),
        };
        assert!(matches!(
            Attempt::<(), _>::from_classified(Err(busy)),
            Attempt::Retry(_)
        ));

        let gone = ClassifiedError {
            class: ErrorClass::NotFound,
            source: TransportError::api("ResourceNotFound", "gone"),
        };
        assert!(matches!(
            Attempt::<(), _>::from_classified(Err(gone)),
            Attempt::Fail(_)
        ));
        assert_eq!(Attempt::<_, ClassifiedError>::from_classified(Ok(1)), Attempt::Done(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_far_deadline_does_not_overflow() {
        let controller = RetryController::new(Duration::from_secs(1));
        let calls = &AtomicU32::new(0);
        let deadline = deadline_after(Instant::now(), Duration::MAX);

        let result: Result<u32, RetryError<String>> = controller
            .run(deadline, move || async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 => Attempt::Retry("busy".to_string()),
                    n => Attempt::Done(n),
                }
            })
            .await;

        assert_eq!(result, Ok(1));
    }
}
