//! Convenience entry points built on [`Lock`].
//!
//! - [`obtain_lock`] - one acquisition attempt, busy becomes an error
//! - [`run_with_lock`] - bounded retries, run a unit of work, always release

use crate::errors::LockError;
use crate::lock::{sleep_or_cancel, Lock};
use crate::options::LockOptions;
use crate::store::LockStore;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Create a lock and try to acquire it once.
///
/// # Errors
///
/// Returns `LockError::CannotGetLock` if the key is busy (after waiting up to
/// `wait_timeout`), or the store error if the store could not be reached.
pub async fn obtain_lock<S: LockStore>(
    store: S,
    key: impl Into<String>,
    options: Option<LockOptions>,
) -> Result<Lock<S>, LockError> {
    let mut lock = Lock::new(store, key, options);
    if lock.lock().await? {
        Ok(lock)
    } else {
        Err(LockError::CannotGetLock)
    }
}

/// Run `work` while holding the lock on `key`.
///
/// Acquisition is tried `1 + retries_count` times with `wait_retry` between
/// busy attempts. The lock is released after `work` finishes, whether it
/// succeeded or not.
///
/// # Errors
///
/// - `LockError::CannotGetLock` (converted into `E`) when every attempt found
///   the key busy
/// - the store error (converted into `E`) when acquisition failed for any
///   other reason; it is not retried
/// - the error returned by `work`
/// - the release error if `work` succeeded but the release failed
pub async fn run_with_lock<S, F, Fut, T, E>(
    store: S,
    key: impl Into<String>,
    options: Option<LockOptions>,
    work: F,
) -> Result<T, E>
where
    S: LockStore,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<LockError>,
{
    run_guarded(Lock::new(store, key, options), None, work).await
}

/// [`run_with_lock`] that stops waiting or retrying once `cancel` fires.
///
/// Cancellation only interrupts acquisition. Once `work` has started it runs
/// to completion and the lock is released as usual.
pub async fn run_with_lock_cancellable<S, F, Fut, T, E>(
    store: S,
    key: impl Into<String>,
    options: Option<LockOptions>,
    cancel: &CancellationToken,
    work: F,
) -> Result<T, E>
where
    S: LockStore,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<LockError>,
{
    run_guarded(Lock::new(store, key, options), Some(cancel), work).await
}

async fn run_guarded<S, F, Fut, T, E>(
    mut lock: Lock<S>,
    cancel: Option<&CancellationToken>,
    work: F,
) -> Result<T, E>
where
    S: LockStore,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<LockError>,
{
    let attempts = lock.options().attempts();
    let wait_retry = lock.options().wait_retry;

    let mut acquired = false;
    for attempt in 1..=attempts {
        if lock.acquire(cancel).await? {
            acquired = true;
            break;
        }
        debug!(
            target: "redis_lock.helpers",
            key = %lock.key(),
            attempt,
            attempts,
            "Lock busy"
        );
        if attempt < attempts {
            sleep_or_cancel(wait_retry, cancel).await?;
        }
    }

    if !acquired {
        return Err(LockError::CannotGetLock.into());
    }

    let result = work().await;

    match (result, lock.unlock().await) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(unlock_err)) => {
            warn!(
                target: "redis_lock.helpers",
                key = %lock.key(),
                error = %unlock_err,
                "Failed to release lock after work completed"
            );
            Err(unlock_err.into())
        }
        (Err(work_err), Ok(())) => Err(work_err),
        (Err(work_err), Err(unlock_err)) => {
            warn!(
                target: "redis_lock.helpers",
                key = %lock.key(),
                error = %unlock_err,
                "Failed to release lock after work failed"
            );
            Err(work_err)
        }
    }
}
