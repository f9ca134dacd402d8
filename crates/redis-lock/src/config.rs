//! Lock configuration.
//!
//! Configuration is loaded from environment variables. The Redis URL may carry
//! credentials and is redacted in Debug output.

use crate::options::{duration_from_millis, LockOptions};
use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default Redis URL used when `REDIS_URL` is not set.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Lock configuration.
#[derive(Clone)]
pub struct Config {
    /// Redis connection URL.
    /// Protected by `SecretString` to prevent accidental logging.
    pub redis_url: SecretString,

    /// Key to lock.
    pub key: String,

    /// Lock options, normalized.
    pub options: LockOptions,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("redis_url", &"[REDACTED]")
            .field("key", &self.key)
            .field("options", &self.options)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let redis_url = SecretString::from(
            vars.get("REDIS_URL")
                .cloned()
                .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
        );

        let key = vars
            .get("LOCK_KEY")
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("LOCK_KEY".to_string()))?
            .clone();

        let retries_count = parse_var::<i32>(vars, "LOCK_RETRIES_COUNT")?.unwrap_or(0);
        let lock_timeout = parse_var::<i64>(vars, "LOCK_TIMEOUT_MS")?.unwrap_or(0);
        let wait_retry = parse_var::<i64>(vars, "LOCK_WAIT_RETRY_MS")?.unwrap_or(0);
        let wait_timeout = parse_var::<i64>(vars, "LOCK_WAIT_TIMEOUT_MS")?.unwrap_or(0);
        let token_prefix = vars.get("LOCK_TOKEN_PREFIX").cloned().unwrap_or_default();

        let options = LockOptions {
            retries_count,
            lock_timeout: duration_from_millis(lock_timeout),
            wait_retry: duration_from_millis(wait_retry),
            wait_timeout: duration_from_millis(wait_timeout),
            token_prefix,
        }
        .normalize();

        Ok(Config {
            redis_url,
            key,
            options,
        })
    }

    /// Options to build locks with.
    pub fn lock_options(&self) -> LockOptions {
        self.options.clone()
    }
}

fn parse_var<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
) -> Result<Option<T>, ConfigError> {
    match vars.get(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(format!("{name}={raw}"))),
    }
}
