//! Store adapter for lock keys.
//!
//! This module provides:
//! - `LockStore` - the operations the lock protocol needs from a key-value store
//! - `RedisLockStore` - the Redis implementation
//! - Lua scripts for the atomic compare-and-act operations
//!
//! Every mutating operation is atomic at the store. The lock never reads a
//! value and then writes based on it in a separate round-trip.

pub mod lua_scripts;
pub mod redis;

pub use self::redis::RedisLockStore;

use crate::errors::LockError;
use std::time::Duration;

/// Remaining lifetime of a key, as reported by `PTTL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist.
    Missing,
    /// The key exists without an expiry.
    Persistent,
    /// The key expires after this duration.
    Expires(Duration),
}

impl KeyTtl {
    /// Map a raw `PTTL` reply (-2 missing, -1 no expiry, otherwise ms).
    pub fn from_pttl(reply: i64) -> Self {
        match reply {
            -2 => KeyTtl::Missing,
            ms if ms < 0 => KeyTtl::Persistent,
            ms => KeyTtl::Expires(Duration::from_millis(ms.unsigned_abs())),
        }
    }
}

/// Operations the lock protocol requires from the store (enables mocking).
#[async_trait::async_trait]
pub trait LockStore: Send + Sync {
    /// Set `key` to `value` with `ttl`, only if the key does not exist.
    ///
    /// Returns true iff this call created the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, LockError>;

    /// Reset the TTL of `key` to `ttl` if its value equals `expected`.
    async fn set_ttl_if_value_equals(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, LockError>;

    /// Delete `key` if its value equals `expected`.
    async fn delete_if_value_equals(&self, key: &str, expected: &str) -> Result<bool, LockError>;

    /// Read the current value of `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, LockError>;

    /// Remaining lifetime of `key`.
    async fn remaining_ttl(&self, key: &str) -> Result<KeyTtl, LockError>;
}

/// TTL in whole milliseconds as sent to the store (at least 1ms).
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ttl_from_pttl() {
        assert_eq!(KeyTtl::from_pttl(-2), KeyTtl::Missing);
        assert_eq!(KeyTtl::from_pttl(-1), KeyTtl::Persistent);
        assert_eq!(KeyTtl::from_pttl(0), KeyTtl::Expires(Duration::ZERO));
        assert_eq!(
            KeyTtl::from_pttl(150),
            KeyTtl::Expires(Duration::from_millis(150))
        );
    }

    #[test]
    fn test_ttl_millis_rounds_up_to_one() {
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::from_secs(1)), 1000);
    }
}
