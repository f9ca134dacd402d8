//! In-memory lock store for testing.
//!
//! Mirrors the Redis semantics the lock relies on:
//! - `SET NX PX` creates a key only if absent (expired keys count as absent)
//! - compare-and-PEXPIRE / compare-and-DEL act only on a matching value
//! - `PTTL` reports missing (-2), persistent (-1) or remaining milliseconds
//!
//! Expiry uses `tokio::time::Instant`, so tests can run with paused time.
//! Every operation holds one mutex for its whole duration, which gives the
//! same atomicity as a Lua script on a single Redis server.
//!
//! # Example
//!
//! ```rust,ignore
//! let store = MockLockStore::new().with_value("jobs:report", "ABCD");
//! store.fail_next(1);
//!
//! // The next store call returns LockError::Store
//! ```

use redis_lock::{KeyTtl, LockError, LockStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Mock lock store.
///
/// Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockLockStore {
    inner: Arc<Mutex<MockStoreInner>>,
}

#[derive(Debug, Default)]
struct MockStoreInner {
    entries: HashMap<String, Entry>,
    /// Number of upcoming operations that fail.
    failures_remaining: usize,
    /// Fail every operation until cleared.
    failing: bool,
    /// Operations executed (including failed ones).
    operations: usize,
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

impl MockStoreInner {
    /// Drop `key` if it has expired and return the live entry.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| !e.is_live(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn begin(&mut self, operation: &str) -> Result<(), LockError> {
        self.operations += 1;
        if self.failing {
            return Err(LockError::Store(format!("mock store unavailable: {operation}")));
        }
        if self.failures_remaining > 0 {
            self.failures_remaining -= 1;
            return Err(LockError::Store(format!("mock store failure: {operation}")));
        }
        Ok(())
    }
}

impl MockLockStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a persistent key.
    #[must_use]
    pub fn with_value(self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    /// Set a key without expiry (like `SET key value`).
    pub fn set(&self, key: &str, value: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
    }

    /// Set a key that expires after `ttl` (like `SET key value PX ttl`).
    pub fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
    }

    /// Delete a key out-of-band.
    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.remove(key).is_some()
    }

    /// Current value of a live key.
    pub fn value(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock().unwrap();
        inner.live(key).map(|e| e.value.clone())
    }

    /// Remaining TTL of a live key with an expiry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        inner
            .live(key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Make the next `count` operations fail with `LockError::Store`.
    pub fn fail_next(&self, count: usize) {
        let mut inner = self.inner.lock().unwrap();
        inner.failures_remaining = count;
    }

    /// Make every operation fail until called again with `false`.
    pub fn set_failing(&self, failing: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.failing = failing;
    }

    /// Number of store operations executed so far.
    pub fn operation_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.operations
    }

    /// Clear all state.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockStoreInner::default();
    }
}

#[async_trait::async_trait]
impl LockStore for MockLockStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        let mut inner = self.inner.lock().unwrap();
        inner.begin("set_if_absent")?;

        if inner.live(key).is_some() {
            return Ok(false);
        }
        inner.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn set_ttl_if_value_equals(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        let mut inner = self.inner.lock().unwrap();
        inner.begin("set_ttl_if_value_equals")?;

        match inner.live(key) {
            Some(entry) if entry.value == expected => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_if_value_equals(&self, key: &str, expected: &str) -> Result<bool, LockError> {
        let mut inner = self.inner.lock().unwrap();
        inner.begin("delete_if_value_equals")?;

        let matches = inner.live(key).is_some_and(|e| e.value == expected);
        if matches {
            inner.entries.remove(key);
        }
        Ok(matches)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LockError> {
        let mut inner = self.inner.lock().unwrap();
        inner.begin("get")?;
        Ok(inner.live(key).map(|e| e.value.clone()))
    }

    async fn remaining_ttl(&self, key: &str) -> Result<KeyTtl, LockError> {
        let mut inner = self.inner.lock().unwrap();
        inner.begin("remaining_ttl")?;

        let now = Instant::now();
        Ok(match inner.live(key) {
            None => KeyTtl::Missing,
            Some(Entry {
                expires_at: None, ..
            }) => KeyTtl::Persistent,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => KeyTtl::Expires(at.saturating_duration_since(now)),
        })
    }
}
