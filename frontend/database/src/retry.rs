use std::future::Future;
use tokio::time;
use tracing::debug;

/// Errors the conditional update retrier can classify.
pub trait Retryable: Sized {
    /// Returns true if the error reports a write made against a stale document version.
    fn is_precondition_failed(&self) -> bool;

    /// The error returned once every attempt has failed its precondition.
    fn retries_exhausted(attempts: usize) -> Self;
}

/// Bounds the retries of a conditional update.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_backoff: time::Duration,
    pub max_backoff: time::Duration,
}

// === impl RetryPolicy ===

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff: time::Duration::from_millis(10),
            max_backoff: time::Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Invokes `mutate` until it succeeds or fails with an error other than a precondition
    /// failure.
    ///
    /// `mutate` must re-read the document on every invocation so that each attempt applies its
    /// change to the latest version. Attempts are separated by an exponentially growing backoff.
    /// Once `max_attempts` invocations have failed their precondition,
    /// [`Retryable::retries_exhausted`] is returned.
    pub async fn retry_on_precondition_failed<T, E, F, Fut>(&self, mut mutate: F) -> Result<T, E>
    where
        E: Retryable,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut backoff = self.initial_backoff;
        for attempt in 1..=max_attempts {
            match mutate().await {
                Err(error) if error.is_precondition_failed() => {
                    debug!(attempt, "Precondition failed");
                    if attempt < max_attempts {
                        time::sleep(backoff).await;
                        backoff = (backoff * 2).min(self.max_backoff);
                    }
                }
                res => return res,
            }
        }
        Err(E::retries_exhausted(max_attempts))
    }
}

impl Retryable for crate::Error {
    fn is_precondition_failed(&self) -> bool {
        matches!(self, Self::PreconditionFailed)
    }

    fn retries_exhausted(attempts: usize) -> Self {
        Self::RetriesExhausted { attempts }
    }
}

impl Retryable for rp_frontend_core::Error {
    fn is_precondition_failed(&self) -> bool {
        matches!(self, Self::PreconditionFailed)
    }

    fn retries_exhausted(attempts: usize) -> Self {
        Self::Conflict { attempts }
    }
}
