//! Retry-with-backoff for flaky portal calls.
//!
//! Attempts are spaced linearly: the wait after attempt `n` is
//! `base_delay * n`. Rate-limited backends in front of the portal rely on
//! that exact growth, so keep it linear.
//!
//! A [`Liveness`] handle lets the caller's context abort retries. When it
//! ends, the pending wait is abandoned and the call resolves to
//! [`RetryError::Cancelled`], never to a stale result.

mod liveness;

pub use liveness::{Lifetime, Liveness};

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Attempts made when no policy is configured.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base delay between attempts when no policy is configured.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Zero behaves as one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Wait after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.checked_mul(attempt).unwrap_or(Duration::MAX)
    }

    pub async fn run<T, E, F, Fut>(
        &self,
        liveness: &Liveness,
        operation: F,
    ) -> Result<T, RetryError<E>>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        retry(self, liveness, operation).await
    }
}

#[derive(Error, Debug)]
pub enum RetryError<E> {
    /// The owning context ended; not a fetch failure and not worth showing
    /// to the user.
    #[error("Operation cancelled - caller is gone")]
    Cancelled,

    /// The last attempt's error.
    #[error("{0}")]
    Failed(E),
}

impl<E> RetryError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled)
    }

    pub fn into_failure(self) -> Option<E> {
        match self {
            RetryError::Failed(e) => Some(e),
            RetryError::Cancelled => None,
        }
    }

    pub fn map_err<F>(self, f: impl FnOnce(E) -> F) -> RetryError<F> {
        match self {
            RetryError::Failed(e) => RetryError::Failed(f(e)),
            RetryError::Cancelled => RetryError::Cancelled,
        }
    }
}

/// Run `operation` until it succeeds or `policy.max_attempts` is used up.
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    liveness: &Liveness,
    operation: F,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_when(policy, liveness, |_| true, operation).await
}

/// Like [`retry`], but an error for which `should_retry` is false is
/// returned at once without further attempts.
pub async fn retry_when<T, E, P, F, Fut>(
    policy: &RetryPolicy,
    liveness: &Liveness,
    should_retry: P,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    E: Display,
    P: Fn(&E) -> bool,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        if !liveness.is_alive() {
            debug!(attempt, "Caller gone before attempt, cancelling");
            return Err(RetryError::Cancelled);
        }

        let outcome = operation().await;
        if !liveness.is_alive() {
            debug!(attempt, "Caller gone during attempt, discarding result");
            return Err(RetryError::Cancelled);
        }
        let error = match outcome {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if attempt >= max_attempts || !should_retry(&error) {
            warn!(attempt, max_attempts, error = %error, "Attempt failed, giving up");
            return Err(RetryError::Failed(error));
        }

        let delay = policy.delay_for(attempt);
        warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Attempt failed, backing off"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = liveness.ended() => {
                debug!(attempt, "Caller gone during backoff, cancelling");
                return Err(RetryError::Cancelled);
            }
        }

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(10))
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_delay_grows_linearly() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(4), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_first_success_makes_one_call() {
        let calls = AtomicU32::new(0);

        let result = retry(&fast_policy(), &Liveness::always(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>("ok")
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result = retry(&fast_policy(), &Liveness::always(), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Err::<(), _>(format!("failure {}", n))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(RetryError::Failed(e)) => assert_eq!(e, "failure 3"),
            other => panic!("expected Failed, got {:?}", other),
        }
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_success_after_failures() {
        let calls = AtomicU32::new(0);

        let result = retry(&fast_policy(), &Liveness::always(), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(format!("failure {}", n))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_behaves_as_one() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(0, Duration::from_millis(10));

        let result = retry(&policy, &Liveness::always(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>("nope")
        })
        .await;

        assert!(matches!(result, Err(RetryError::Failed("nope"))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let lifetime = Lifetime::new();
        let liveness = lifetime.liveness();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let policy = RetryPolicy::new(3, Duration::from_millis(500));

        let task = tokio::spawn(async move {
            retry(&policy, &liveness, || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("flaky")
                }
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let started = Instant::now();
        lifetime.end();

        let result = task.await.unwrap();
        assert!(result.as_ref().is_err_and(RetryError::is_cancelled));
        assert!(started.elapsed() < Duration::from_millis(400));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dead_caller_is_never_called() {
        let lifetime = Lifetime::new();
        let liveness = lifetime.liveness();
        drop(lifetime);
        let calls = AtomicU32::new(0);

        let result = retry(&fast_policy(), &liveness, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(())
        })
        .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_caller_gone_mid_attempt_discards_failure() {
        let lifetime = std::sync::Mutex::new(Some(Lifetime::new()));
        let liveness = lifetime.lock().unwrap().as_ref().unwrap().liveness();
        let policy = RetryPolicy::new(1, Duration::from_millis(10));

        let result = retry(&policy, &liveness, || {
            lifetime.lock().unwrap().take();
            async { Err::<(), _>("late failure") }
        })
        .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
    }

    #[tokio::test]
    async fn test_caller_gone_mid_attempt_discards_success() {
        let lifetime = Lifetime::new();
        let liveness = lifetime.liveness();

        let result = retry(&fast_policy(), &liveness, || async {
            lifetime.end();
            Ok::<_, String>("stale")
        })
        .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
    }

    #[tokio::test]
    async fn test_retry_when_stops_on_permanent_error() {
        let calls = AtomicU32::new(0);

        let result = retry_when(
            &fast_policy(),
            &Liveness::always(),
            |e: &&str| *e != "not found",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("not found")
            },
        )
        .await;

        assert!(matches!(result, Err(RetryError::Failed("not found"))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retry_error_helpers() {
        let cancelled: RetryError<String> = RetryError::Cancelled;
        assert!(cancelled.is_cancelled());
        assert_eq!(cancelled.to_string(), "Operation cancelled - caller is gone");
        assert_eq!(cancelled.into_failure(), None);

        let failed = RetryError::Failed("boom".to_string());
        assert_eq!(failed.to_string(), "boom");
        let mapped = failed.map_err(|e| e.len());
        assert_eq!(mapped.into_failure(), Some(4));
    }
}
