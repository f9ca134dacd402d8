//! Redis Lock Library
//!
//! A distributed mutual-exclusion lock on top of a single Redis server.
//! Independent processes coordinate exclusive access to a named resource
//! without a lock manager; a crashed holder's key simply expires.
//!
//! # How it works
//!
//! - A lock is a key whose value is a random ownership token
//! - Acquire: `SET key token NX PX lock_timeout`
//! - Refresh and release compare the stored token and act in one Lua script
//! - A busy `lock()` call polls until the foreign key expires or
//!   `wait_timeout` elapses
//! - [`run_with_lock`] adds an outer retry loop bounded by `retries_count`
//!
//! This is an advisory lock. It delivers no fencing tokens and does not
//! survive store-side data loss or failover.
//!
//! # Usage
//!
//! ```rust,ignore
//! use redis_lock::{run_with_lock, LockError, LockOptions, RedisLockStore};
//!
//! let store = RedisLockStore::new("redis://localhost:6379").await?;
//! let options = LockOptions::default().with_retries_count(3);
//!
//! run_with_lock(store, "jobs:nightly-report", Some(options), || async {
//!     generate_report().await?;
//!     Ok::<_, anyhow::Error>(())
//! })
//! .await?;
//! ```
//!
//! # Modules
//!
//! - [`lock`] - Acquire/refresh/release state machine
//! - [`helpers`] - `obtain_lock` and `run_with_lock`
//! - [`store`] - Store trait and the Redis implementation
//! - [`options`] - Options and normalization
//! - [`config`] - Configuration from environment
//! - [`errors`] - Error types

pub mod config;
pub mod errors;
pub mod helpers;
pub mod lock;
pub mod options;
pub mod store;
pub mod token;

pub use errors::LockError;
pub use helpers::{obtain_lock, run_with_lock, run_with_lock_cancellable};
pub use lock::Lock;
pub use options::{LockOptions, MIN_LOCK_TIMEOUT, MIN_WAIT_RETRY};
pub use store::{KeyTtl, LockStore, RedisLockStore};
