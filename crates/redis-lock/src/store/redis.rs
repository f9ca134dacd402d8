//! Redis lock store.
//!
//! # Commands
//!
//! - acquire: `SET key token NX PX ttl`
//! - refresh: [`REFRESH`](super::lua_scripts::REFRESH) script (compare, then `PEXPIRE`)
//! - release: [`RELEASE`](super::lua_scripts::RELEASE) script (compare, then `DEL`)
//! - status: `GET`, `PTTL`
//!
//! # Connection Pattern
//!
//! The redis-rs `MultiplexedConnection` is cheap to clone and safe to use
//! concurrently, so every operation clones it instead of locking. Cloning a
//! `RedisLockStore` shares the same underlying connection.
//!
//! # Usage
//!
//! ```rust,ignore
//! let store = RedisLockStore::new("redis://localhost:6379").await?;
//! let mut lock = Lock::new(store.clone(), "jobs:nightly-report", None);
//! ```

use super::{lua_scripts, ttl_millis, KeyTtl, LockStore};
use crate::errors::LockError;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Lock store backed by a single Redis server.
#[derive(Clone)]
pub struct RedisLockStore {
    connection: MultiplexedConnection,
    refresh_script: Script,
    release_script: Script,
}

impl RedisLockStore {
    /// Connect to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL (e.g., `redis://localhost:6379/9`)
    ///
    /// # Errors
    ///
    /// Returns `LockError::Store` if the URL is invalid or the connection fails.
    pub async fn new(redis_url: &str) -> Result<Self, LockError> {
        let client = Client::open(redis_url).map_err(|e| {
            // Do NOT log redis_url, it may contain credentials
            error!(
                target: "redis_lock.store",
                error = %e,
                "Failed to open Redis client"
            );
            LockError::Store(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(
                    target: "redis_lock.store",
                    error = %e,
                    "Failed to connect to Redis"
                );
                LockError::Store(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self::from_connection(connection))
    }

    /// Wrap an existing connection. The caller keeps ownership of its lifecycle.
    pub fn from_connection(connection: MultiplexedConnection) -> Self {
        Self {
            connection,
            refresh_script: Script::new(lua_scripts::REFRESH),
            release_script: Script::new(lua_scripts::RELEASE),
        }
    }

    /// Check that the server answers.
    pub async fn ping(&self) -> Result<(), LockError> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| store_error("ping", &e))?;
        Ok(())
    }
}

fn store_error(operation: &str, e: &redis::RedisError) -> LockError {
    warn!(
        target: "redis_lock.store",
        error = %e,
        operation = operation,
        "Redis lock operation failed"
    );
    LockError::Store(format!("Failed to {operation}: {e}"))
}

#[async_trait::async_trait]
impl LockStore for RedisLockStore {
    #[instrument(skip_all, fields(key = %key))]
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        let mut conn = self.connection.clone();

        // Reply is "OK" when set, nil when the key already exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| store_error("set lock key", &e))?;

        let created = reply.is_some();
        debug!(target: "redis_lock.store", key = %key, created, "SET NX");
        Ok(created)
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn set_ttl_if_value_equals(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        let mut conn = self.connection.clone();

        let result: i64 = self
            .refresh_script
            .key(key)
            .arg(expected)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| store_error("refresh lock key", &e))?;

        debug!(target: "redis_lock.store", key = %key, result, "Refresh script");
        Ok(result == 1)
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn delete_if_value_equals(&self, key: &str, expected: &str) -> Result<bool, LockError> {
        let mut conn = self.connection.clone();

        let result: i64 = self
            .release_script
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| store_error("release lock key", &e))?;

        debug!(target: "redis_lock.store", key = %key, result, "Release script");
        Ok(result == 1)
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn get(&self, key: &str) -> Result<Option<String>, LockError> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| store_error("get lock key", &e))?;
        Ok(value)
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn remaining_ttl(&self, key: &str) -> Result<KeyTtl, LockError> {
        let mut conn = self.connection.clone();
        let reply: i64 = conn
            .pttl(key)
            .await
            .map_err(|e| store_error("read lock key TTL", &e))?;
        Ok(KeyTtl::from_pttl(reply))
    }
}
