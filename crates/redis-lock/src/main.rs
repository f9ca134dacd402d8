//! Redis Lock
//!
//! Runs a command while holding a distributed lock.
//!
//! ```text
//! LOCK_KEY=jobs:nightly-report REDIS_URL=redis://localhost:6379 \
//!     redis-lock ./generate-report.sh --full
//! ```
//!
//! # Flow
//!
//! 1. Load configuration from environment
//! 2. Connect to Redis
//! 3. Acquire the lock (retries per `LOCK_RETRIES_COUNT`; Ctrl-C cancels)
//! 4. Run the command, release the lock, exit with the command's status

#![warn(clippy::pedantic)]

use redis_lock::config::Config;
use redis_lock::{run_with_lock_cancellable, LockError, RedisLockStore};
use secrecy::ExposeSecret;
use std::process::ExitCode;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit code when the lock is held elsewhere.
const EXIT_LOCK_BUSY: u8 = 75;

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "redis_lock=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(program) = args.next() else {
        error!("Usage: redis-lock <command> [args...]");
        return Ok(ExitCode::from(2));
    };
    let program_args: Vec<String> = args.collect();

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        key = %config.key,
        retries_count = config.options.retries_count,
        lock_timeout_ms = config.options.lock_timeout.as_millis(),
        wait_timeout_ms = config.options.wait_timeout.as_millis(),
        "Configuration loaded successfully"
    );

    let store = RedisLockStore::new(config.redis_url.expose_secret())
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to connect to Redis");
            e
        })?;

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl-C, no longer waiting for lock");
            ctrl_c_cancel.cancel();
        }
    });

    let key = config.key.clone();
    let result = run_with_lock_cancellable(
        store,
        config.key.clone(),
        Some(config.lock_options()),
        &cancel,
        move || async move {
            info!(key = %key, program = %program, "Lock acquired, running command");
            let status = Command::new(&program)
                .args(&program_args)
                .status()
                .await
                .map_err(|e| RunError::Spawn(e.to_string()))?;
            Ok::<_, RunError>(status.code().unwrap_or(1))
        },
    )
    .await;

    match result {
        Ok(code) => {
            info!(key = %config.key, code, "Command finished, lock released");
            Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
        }
        Err(RunError::Lock(LockError::CannotGetLock)) => {
            warn!(key = %config.key, "Lock is held elsewhere");
            Ok(ExitCode::from(EXIT_LOCK_BUSY))
        }
        Err(e) => {
            error!(key = %config.key, error = %e, "Failed to run command under lock");
            Ok(ExitCode::FAILURE)
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("Failed to spawn command: {0}")]
    Spawn(String),
}
