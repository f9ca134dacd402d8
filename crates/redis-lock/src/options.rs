//! Lock options and their normalization.

use std::time::Duration;

/// Smallest TTL a lock key is ever given.
pub const MIN_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

/// Smallest polling interval used while waiting for a foreign lock.
pub const MIN_WAIT_RETRY: Duration = Duration::from_millis(10);

/// Lock configuration.
///
/// `Default` is the all-zero configuration; it becomes usable once passed
/// through [`LockOptions::normalize`], which every constructor in this crate
/// does before the options are stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockOptions {
    /// Extra acquisition attempts made by [`run_with_lock`](crate::run_with_lock).
    pub retries_count: i32,
    /// TTL assigned to the key on acquire and refresh.
    pub lock_timeout: Duration,
    /// Polling interval while waiting for a foreign lock to expire, and the
    /// sleep between outer retries.
    pub wait_retry: Duration,
    /// Upper bound on how long a single `lock()` call waits. Zero disables waiting.
    pub wait_timeout: Duration,
    /// Prepended to every generated token.
    pub token_prefix: String,
}

impl LockOptions {
    /// Clamp options into their valid ranges.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        if self.retries_count < 0 {
            self.retries_count = 0;
        }
        if self.lock_timeout < MIN_LOCK_TIMEOUT {
            self.lock_timeout = MIN_LOCK_TIMEOUT;
        }
        if self.wait_retry < MIN_WAIT_RETRY {
            self.wait_retry = MIN_WAIT_RETRY;
        }
        self
    }

    /// Normalize optional options, treating `None` as all-zero defaults.
    #[must_use]
    pub fn normalize_opt(options: Option<Self>) -> Self {
        options.unwrap_or_default().normalize()
    }

    /// Builder-style setter for `retries_count`.
    #[must_use]
    pub fn with_retries_count(mut self, retries_count: i32) -> Self {
        self.retries_count = retries_count;
        self
    }

    /// Builder-style setter for `lock_timeout`.
    #[must_use]
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Builder-style setter for `wait_retry`.
    #[must_use]
    pub fn with_wait_retry(mut self, wait_retry: Duration) -> Self {
        self.wait_retry = wait_retry;
        self
    }

    /// Builder-style setter for `wait_timeout`.
    #[must_use]
    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    /// Builder-style setter for `token_prefix`.
    #[must_use]
    pub fn with_token_prefix(mut self, token_prefix: impl Into<String>) -> Self {
        self.token_prefix = token_prefix.into();
        self
    }

    /// Total acquisition attempts for the guarded-execution helper.
    pub(crate) fn attempts(&self) -> u32 {
        u32::try_from(self.retries_count.max(0))
            .unwrap_or(0)
            .saturating_add(1)
    }
}

/// Convert signed milliseconds into a duration, clamping negatives to zero.
pub fn duration_from_millis(ms: i64) -> Duration {
    u64::try_from(ms).map_or(Duration::ZERO, Duration::from_millis)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_defaults() {
        let opts = LockOptions::normalize_opt(None);

        assert_eq!(opts.retries_count, 0);
        assert_eq!(opts.lock_timeout, MIN_LOCK_TIMEOUT);
        assert_eq!(opts.wait_retry, MIN_WAIT_RETRY);
        assert_eq!(opts.wait_timeout, Duration::ZERO);
        assert!(opts.token_prefix.is_empty());
    }

    #[test]
    fn test_normalize_clamps_negative_retries() {
        let opts = LockOptions::default().with_retries_count(-1).normalize();
        assert_eq!(opts.retries_count, 0);
        assert_eq!(opts.attempts(), 1);
    }

    #[test]
    fn test_normalize_raises_values_below_floor() {
        let opts = LockOptions::default()
            .with_lock_timeout(Duration::from_millis(5))
            .with_wait_retry(Duration::from_millis(1))
            .normalize();

        assert_eq!(opts.lock_timeout, MIN_LOCK_TIMEOUT);
        assert_eq!(opts.wait_retry, MIN_WAIT_RETRY);
    }

    #[test]
    fn test_normalize_keeps_valid_values() {
        let opts = LockOptions::default()
            .with_retries_count(6)
            .with_lock_timeout(Duration::from_secs(1))
            .with_wait_retry(Duration::from_millis(25))
            .with_wait_timeout(Duration::from_millis(100))
            .with_token_prefix("worker-1:")
            .normalize();

        assert_eq!(opts.retries_count, 6);
        assert_eq!(opts.attempts(), 7);
        assert_eq!(opts.lock_timeout, Duration::from_secs(1));
        assert_eq!(opts.wait_retry, Duration::from_millis(25));
        assert_eq!(opts.wait_timeout, Duration::from_millis(100));
        assert_eq!(opts.token_prefix, "worker-1:");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = LockOptions::default().with_retries_count(-3).normalize();
        assert_eq!(once.clone().normalize(), once);
    }

    #[test]
    fn test_duration_from_millis_clamps_negative() {
        assert_eq!(duration_from_millis(-1), Duration::ZERO);
        assert_eq!(duration_from_millis(0), Duration::ZERO);
        assert_eq!(duration_from_millis(1500), Duration::from_millis(1500));
    }
}
