//! # Lock Test Utilities
//!
//! Shared test utilities for `redis-lock`.
//!
//! ## Modules
//!
//! - `mock_store` - In-memory `LockStore` with millisecond TTLs on tokio's clock
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lock_test_utils::MockLockStore;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_example() {
//!     let store = MockLockStore::new();
//!     store.set_with_ttl("jobs:report", "ABCD", Duration::from_millis(50));
//!
//!     let mut lock = Lock::new(store.clone(), "jobs:report", None);
//!     // ...
//! }
//! ```

pub mod mock_store;

pub use mock_store::*;
