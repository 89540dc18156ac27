use core::time::Duration;

use crate::{
    error::{Error, Result},
    worker::CoordinationError,
};

/// Bounded exponential backoff for coordination calls made during startup.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    pub const fn none() -> Self {
        Self {
            attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Starts a budget that several calls can draw from.
    pub const fn budget(&self) -> RetryBudget {
        RetryBudget {
            policy: *self,
            failures: 0,
            backoff: self.initial_backoff,
        }
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CoordinationUnavailable`] carrying the last failure.
    pub async fn run<T, F, Fut>(&self, what: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoordinationError>>,
    {
        self.budget().run(what, op).await
    }
}

/// Failure accounting shared across a sequence of coordination calls.
///
/// Every failed attempt, in any call, draws from the same
/// [`RetryPolicy::attempts`]; successful calls are free. The backoff keeps
/// doubling across calls.
#[derive(Copy, Clone, Debug)]
pub struct RetryBudget {
    policy: RetryPolicy,
    failures: u32,
    backoff: Duration,
}

impl RetryBudget {
    /// Failed attempts so far.
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// shared budget is spent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CoordinationUnavailable`] carrying the last failure.
    pub async fn run<T, F, Fut>(&mut self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoordinationError>>,
    {
        let budget = self.policy.attempts.max(1);

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    self.failures += 1;
                    if !e.is_retryable() || self.failures >= budget {
                        return Err(Error::CoordinationUnavailable {
                            attempts: self.failures,
                            reason: format!("{what}: {e}"),
                        });
                    }
                    tracing::warn!(
                        attempt = self.failures,
                        budget,
                        backoff_ms = self.backoff.as_millis() as u64,
                        error = %e,
                        "{what} failed; backing off"
                    );
                    tokio::time::sleep(self.backoff).await;
                    self.backoff = self.backoff.saturating_mul(2).min(self.policy.max_backoff);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portable_atomic::{AtomicU32, Ordering};

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let calls = &AtomicU32::new(0);
        let value = quick(5)
            .run("claim", move || async move {
                if calls.fetch_add(1, Ordering::Relaxed) < 3 {
                    Err(CoordinationError::Unreachable("down".into()))
                } else {
                    Ok(42)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::Relaxed), 4);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let calls = &AtomicU32::new(0);
        let err = quick(3)
            .run("claim", move || async move {
                calls.fetch_add(1, Ordering::Relaxed);
                Err::<(), _>(CoordinationError::Unreachable("down".into()))
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::Relaxed), 3);
        assert!(matches!(err, Error::CoordinationUnavailable { attempts: 3, .. }), "{err:?}");
    }

    #[tokio::test]
    async fn budget_is_shared_across_calls() {
        let calls = &AtomicU32::new(0);
        let mut budget = quick(3).budget();

        let first = budget
            .run("first", move || async move {
                if calls.fetch_add(1, Ordering::Relaxed) < 2 {
                    Err(CoordinationError::Unreachable("down".into()))
                } else {
                    Ok(1)
                }
            })
            .await
            .unwrap();
        assert_eq!(first, 1);
        assert_eq!(budget.failures(), 2);

        let err = budget
            .run("second", || async {
                Err::<(), _>(CoordinationError::Unreachable("down".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CoordinationUnavailable { attempts: 3, .. }), "{err:?}");
    }

    #[tokio::test]
    async fn closed_session_is_not_retried() {
        let calls = &AtomicU32::new(0);
        let err = quick(5)
            .run("claim", move || async move {
                calls.fetch_add(1, Ordering::Relaxed);
                Err::<(), _>(CoordinationError::SessionClosed)
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert!(matches!(err, Error::CoordinationUnavailable { attempts: 1, .. }));
    }
}
