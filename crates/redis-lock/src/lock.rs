//! Lock state machine.
//!
//! A [`Lock`] owns one key in the store. It is either unheld (no token) or
//! held (the token it last wrote into the key). Local state is only a belief:
//! every `lock()` call re-validates it against the store.
//!
//! # Acquisition
//!
//! ```text
//! lock()
//!  ├── held and not locally expired ── refresh (compare-and-PEXPIRE)
//!  │                                    ├── ok ─────────────── Ok(true)
//!  │                                    └── lost ── clear ──┐
//!  └── unheld ──────────────────────────────────────────────┤
//!                                                           v
//!                     SET NX PX with a fresh token ── ok ── Ok(true)
//!                                │ busy
//!                                v
//!                 wait_timeout == 0 ─────────────────────── Ok(false)
//!                 else poll until deadline, sleeping
//!                 min(foreign TTL, wait_retry) ── deadline ─ Ok(false)
//! ```
//!
//! The lock is not released on drop; an abandoned key expires after
//! `lock_timeout`.

use crate::errors::LockError;
use crate::options::LockOptions;
use crate::store::{KeyTtl, LockStore};
use crate::token::generate_token;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Shortest sleep between polls of a busy key.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Cap for deadlines that would overflow `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Distributed lock on a single store key.
///
/// Not shareable between tasks: every state-changing operation takes
/// `&mut self`. Use one `Lock` per competitor.
pub struct Lock<S> {
    store: S,
    key: String,
    options: LockOptions,
    token: Option<String>,
    /// Local estimate of when the store key expires.
    held_until: Option<Instant>,
}

/// Debug output omits the token.
impl<S> fmt::Debug for Lock<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("key", &self.key)
            .field("options", &self.options)
            .field("locked", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl<S: LockStore> Lock<S> {
    /// Create an unheld lock for `key`. `None` options mean all-zero defaults;
    /// options are normalized either way.
    pub fn new(store: S, key: impl Into<String>, options: Option<LockOptions>) -> Self {
        Self {
            store,
            key: key.into(),
            options: LockOptions::normalize_opt(options),
            token: None,
            held_until: None,
        }
    }

    /// Store key guarded by this lock.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Normalized options.
    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    /// Token currently believed to be stored under the key.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Whether this instance believes it holds the lock.
    ///
    /// Does not contact the store; use the result of [`Lock::lock`] for
    /// ground truth.
    pub fn is_locked(&self) -> bool {
        self.token.is_some()
    }

    /// Acquire or refresh the lock.
    ///
    /// Returns `Ok(false)` when the key is held by someone else and
    /// `wait_timeout` elapsed (or is zero).
    ///
    /// # Errors
    ///
    /// Store failures and token generation failures. Local state is left as it
    /// was before the failing store call.
    #[instrument(skip_all, fields(key = %self.key))]
    pub async fn lock(&mut self) -> Result<bool, LockError> {
        self.acquire(None).await
    }

    /// Like [`Lock::lock`], but returns `LockError::Cancelled` as soon as
    /// `cancel` fires while waiting for a foreign lock.
    #[instrument(skip_all, fields(key = %self.key))]
    pub async fn lock_with_cancellation(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<bool, LockError> {
        self.acquire(Some(cancel)).await
    }

    /// Release the lock if the key still holds our token.
    ///
    /// Local state is cleared in every case, including when the store call
    /// fails. Releasing an unheld lock is a no-op.
    #[instrument(skip_all, fields(key = %self.key))]
    pub async fn unlock(&mut self) -> Result<(), LockError> {
        self.held_until = None;
        let Some(token) = self.token.take() else {
            debug!(target: "redis_lock.lock", key = %self.key, "Unlock without a held token");
            return Ok(());
        };

        if self.store.delete_if_value_equals(&self.key, &token).await? {
            debug!(target: "redis_lock.lock", key = %self.key, "Released lock");
        } else {
            warn!(
                target: "redis_lock.lock",
                key = %self.key,
                "Lock key expired or was taken over before release"
            );
        }
        Ok(())
    }

    /// Remaining TTL of the key, if it still holds our token.
    ///
    /// Read-only status query; the answer may be stale by the time it is used.
    pub async fn ttl(&self) -> Result<Option<Duration>, LockError> {
        let Some(token) = self.token.as_deref() else {
            return Ok(None);
        };

        if self.store.get(&self.key).await?.as_deref() != Some(token) {
            return Ok(None);
        }

        match self.store.remaining_ttl(&self.key).await? {
            KeyTtl::Expires(ttl) => Ok(Some(ttl)),
            KeyTtl::Missing | KeyTtl::Persistent => Ok(None),
        }
    }

    pub(crate) async fn acquire(
        &mut self,
        cancel: Option<&CancellationToken>,
    ) -> Result<bool, LockError> {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(LockError::Cancelled);
        }

        if self.token.is_some() && self.refresh().await? {
            return Ok(true);
        }

        self.create(cancel).await
    }

    /// Extend a held lock. Returns false (and clears local state) when the key
    /// no longer holds our token, whether it was deleted or overwritten.
    async fn refresh(&mut self) -> Result<bool, LockError> {
        let started = Instant::now();
        if self.held_until.is_some_and(|until| started >= until) {
            debug!(
                target: "redis_lock.lock",
                key = %self.key,
                "Held lock outlived its timeout, re-acquiring"
            );
            self.clear();
            return Ok(false);
        }

        let Some(token) = self.token.as_deref() else {
            return Ok(false);
        };

        let refreshed = self
            .store
            .set_ttl_if_value_equals(&self.key, token, self.options.lock_timeout)
            .await?;

        if refreshed {
            self.held_until = Some(deadline_after(started, self.options.lock_timeout));
            debug!(target: "redis_lock.lock", key = %self.key, "Refreshed lock");
        } else {
            warn!(
                target: "redis_lock.lock",
                key = %self.key,
                "Lock was lost before refresh"
            );
            self.clear();
        }
        Ok(refreshed)
    }

    /// Claim the key with a fresh token, waiting up to `wait_timeout` for a
    /// foreign holder to expire.
    async fn create(&mut self, cancel: Option<&CancellationToken>) -> Result<bool, LockError> {
        let token = generate_token(&self.options.token_prefix)?;
        let deadline = deadline_after(Instant::now(), self.options.wait_timeout);

        loop {
            let attempt_started = Instant::now();
            let created = self
                .store
                .set_if_absent(&self.key, &token, self.options.lock_timeout)
                .await?;

            if created {
                self.token = Some(token);
                self.held_until = Some(deadline_after(attempt_started, self.options.lock_timeout));
                debug!(target: "redis_lock.lock", key = %self.key, "Acquired lock");
                return Ok(true);
            }

            if self.options.wait_timeout.is_zero() {
                debug!(target: "redis_lock.lock", key = %self.key, "Lock busy, not waiting");
                return Ok(false);
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(
                    target: "redis_lock.lock",
                    key = %self.key,
                    wait_timeout_ms = self.options.wait_timeout.as_millis(),
                    "Gave up waiting for lock"
                );
                return Ok(false);
            }

            let step = match self.store.remaining_ttl(&self.key).await? {
                // Freed between the SET and the PTTL; try again right away
                KeyTtl::Missing => continue,
                KeyTtl::Persistent => self.options.wait_retry,
                KeyTtl::Expires(ttl) => ttl.min(self.options.wait_retry),
            };
            let delay = step
                .max(MIN_POLL_INTERVAL)
                .min(deadline.saturating_duration_since(now));

            sleep_or_cancel(delay, cancel).await?;
        }
    }

    fn clear(&mut self) {
        self.token = None;
        self.held_until = None;
    }
}

fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

/// Sleep for `delay`, returning early with `LockError::Cancelled` if `cancel` fires.
pub(crate) async fn sleep_or_cancel(
    delay: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<(), LockError> {
    match cancel {
        Some(cancel) => tokio::select! {
            () = cancel.cancelled() => Err(LockError::Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        },
        None => {
            tokio::time::sleep(delay).await;
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_after_saturates() {
        let now = Instant::now();
        assert_eq!(
            deadline_after(now, Duration::from_millis(5)),
            now + Duration::from_millis(5)
        );
        assert_eq!(deadline_after(now, Duration::MAX), now + FAR_FUTURE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_or_cancel_without_token_sleeps() {
        let started = Instant::now();
        sleep_or_cancel(Duration::from_millis(30), None).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_or_cancel_returns_on_cancel() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = sleep_or_cancel(Duration::from_secs(10), Some(&cancel)).await;

        assert!(matches!(result, Err(LockError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
