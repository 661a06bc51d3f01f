//! Bounded retry for locked-database failures.
//!
//! Store operations return plain `Result`s; the caller classifies each
//! outcome as an [`Attempt`] and decides whether to go again.

use std::future::Future;
use std::time::Duration;

use crate::Error;

/// How often, and how patiently, to retry a locked database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 10, backoff: Duration::from_millis(500) }
    }
}

/// Outcome of a single store operation.
#[derive(Debug)]
pub enum Attempt<T> {
    /// The operation went through.
    Applied(T),
    /// Another connection holds the lock; worth another try.
    Busy(Error),
    /// Anything else. Not retried.
    Failed(Error),
}

impl<T> From<Result<T, Error>> for Attempt<T> {
    fn from(result: Result<T, Error>) -> Self {
        match result {
            Ok(value) => Attempt::Applied(value),
            Err(e) if e.is_busy() => Attempt::Busy(e),
            Err(e) => Attempt::Failed(e),
        }
    }
}

/// Run `op` until it is applied, fails for a non-lock reason, or the
/// policy's attempts are used up.
///
/// `should_stop` is polled before each backoff; once it returns true no
/// further attempt is made.
///
/// # Errors
///
/// Returns the first non-lock error, or `Error::StoreBusy` when every
/// attempt found the database locked.
pub async fn with_retry<T, F, Fut, S>(policy: &RetryPolicy, op: &str, should_stop: S, mut run: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
    S: Fn() -> bool,
{
    let limit = policy.attempts.max(1);
    let mut made = 0;

    while made < limit {
        made += 1;
        match Attempt::from(run().await) {
            Attempt::Applied(value) => return Ok(value),
            Attempt::Failed(e) => return Err(e),
            Attempt::Busy(e) => {
                tracing::debug!(op, attempt = made, error = %e, "database locked, retrying");
                if made == limit || should_stop() {
                    break;
                }
                tokio::time::sleep(policy.backoff).await;
            }
        }
    }

    Err(Error::StoreBusy { attempts: made })
}
