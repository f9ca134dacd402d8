//! Tests against a real Redis server.
//!
//! Requires `--features redis-tests` and a server at `REDIS_URL`
//! (default `redis://127.0.0.1:6379/9`). Tests share one key and run serially.

#![cfg(feature = "redis-tests")]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use redis::AsyncCommands;
use redis_lock::token::TOKEN_LEN;
use redis_lock::{obtain_lock, run_with_lock, Lock, LockError, LockOptions, LockStore, RedisLockStore};
use serial_test::serial;
use tokio::time::Instant;

const TEST_KEY: &str = "__redis_lock_integration_test__";

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/9".to_string())
}

/// Store plus a raw connection for out-of-band manipulation. Clears the key.
async fn setup() -> (RedisLockStore, redis::aio::MultiplexedConnection) {
    let client = redis::Client::open(redis_url()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    let _: () = conn.del(TEST_KEY).await.unwrap();
    (RedisLockStore::from_connection(conn.clone()), conn)
}

fn test_options() -> LockOptions {
    LockOptions::default()
        .with_wait_timeout(Duration::from_millis(100))
        .with_lock_timeout(Duration::from_secs(1))
}

async fn pttl(conn: &mut redis::aio::MultiplexedConnection) -> Duration {
    let ms: i64 = conn.pttl(TEST_KEY).await.unwrap();
    Duration::from_millis(u64::try_from(ms).unwrap())
}

fn assert_about(actual: Duration, expected: Duration) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(
        diff <= Duration::from_millis(15),
        "expected ~{expected:?}, got {actual:?}"
    );
}

#[tokio::test]
#[serial]
async fn test_store_ping() {
    let (store, _conn) = setup().await;
    store.ping().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_obtains_fresh_lock() {
    let (store, mut conn) = setup().await;
    let mut lock = Lock::new(store, TEST_KEY, Some(test_options()));

    assert!(lock.lock().await.unwrap());

    let value: String = conn.get(TEST_KEY).await.unwrap();
    assert_eq!(value.len(), TOKEN_LEN);
    assert_eq!(lock.token(), Some(value.as_str()));
    assert_about(pttl(&mut conn).await, Duration::from_secs(1));

    lock.unlock().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_waits_for_expiring_lock() {
    let (store, mut conn) = setup().await;
    let _: () = conn.pset_ex(TEST_KEY, "ABCD", 50).await.unwrap();
    let mut lock = Lock::new(store, TEST_KEY, Some(test_options()));

    assert!(lock.lock().await.unwrap());

    let value: String = conn.get(TEST_KEY).await.unwrap();
    assert_eq!(lock.token(), Some(value.as_str()));
    assert_about(pttl(&mut conn).await, Duration::from_secs(1));

    lock.unlock().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_gives_up_after_wait_timeout() {
    let (store, mut conn) = setup().await;
    let _: () = conn.pset_ex(TEST_KEY, "ABCD", 150).await.unwrap();
    let mut lock = Lock::new(store, TEST_KEY, Some(test_options()));

    let started = Instant::now();
    assert!(!lock.lock().await.unwrap());
    assert_about(started.elapsed(), Duration::from_millis(100));

    let value: String = conn.get(TEST_KEY).await.unwrap();
    assert_eq!(value, "ABCD");
    assert_about(pttl(&mut conn).await, Duration::from_millis(50));
}

#[tokio::test]
#[serial]
async fn test_does_not_wait_without_wait_timeout() {
    let (store, mut conn) = setup().await;
    let _: () = conn.pset_ex(TEST_KEY, "ABCD", 150).await.unwrap();
    let mut lock = Lock::new(store, TEST_KEY, None);

    assert!(!lock.lock().await.unwrap());
    assert_about(pttl(&mut conn).await, Duration::from_millis(150));
}

#[tokio::test]
#[serial]
async fn test_refresh_and_release() {
    let (store, mut conn) = setup().await;
    let mut lock = Lock::new(store, TEST_KEY, Some(test_options()));

    assert!(lock.lock().await.unwrap());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_about(pttl(&mut conn).await, Duration::from_millis(950));

    assert!(lock.lock().await.unwrap());
    assert_about(pttl(&mut conn).await, Duration::from_secs(1));

    lock.unlock().await.unwrap();
    let value: Option<String> = conn.get(TEST_KEY).await.unwrap();
    assert_eq!(value, None);
}

#[tokio::test]
#[serial]
async fn test_does_not_release_someone_elses_lock() {
    let (store, mut conn) = setup().await;
    let _: () = conn.set(TEST_KEY, "ABCD").await.unwrap();

    // Foreign value is left alone by the compare-and-delete script
    assert!(!store.delete_if_value_equals(TEST_KEY, "mine").await.unwrap());

    let mut lock = Lock::new(store, TEST_KEY, Some(test_options()));
    lock.unlock().await.unwrap();

    let value: String = conn.get(TEST_KEY).await.unwrap();
    assert_eq!(value, "ABCD");
    let _: () = conn.del(TEST_KEY).await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_shortcut_and_helper() {
    let (store, _conn) = setup().await;

    let mut held = obtain_lock(store.clone(), TEST_KEY, None).await.unwrap();
    assert!(matches!(
        obtain_lock(store.clone(), TEST_KEY, None).await,
        Err(LockError::CannotGetLock)
    ));
    held.unlock().await.unwrap();

    let value = run_with_lock(store, TEST_KEY, None, || async { Ok::<_, LockError>(7) })
        .await
        .unwrap();
    assert_eq!(value, 7);
}
