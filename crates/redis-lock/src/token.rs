//! Ownership token generation.
//!
//! A token is the value written into the lock key. Only the instance that
//! generated it can refresh or release the key, so tokens must be
//! unpredictable: they come from `ring`'s system CSPRNG.

use crate::errors::LockError;
use base64::{engine::general_purpose::URL_SAFE, Engine};
use ring::rand::{SecureRandom, SystemRandom};

/// Random bytes per token. 16 bytes encode to 24 base64 characters.
const TOKEN_BYTES: usize = 16;

/// Length of the random part of a token.
pub const TOKEN_LEN: usize = 24;

/// Generate a new ownership token, optionally prefixed.
///
/// # Errors
///
/// Returns `LockError::TokenGeneration` if the system random source fails.
/// The caller must not fall back to a weaker token.
pub fn generate_token(prefix: &str) -> Result<String, LockError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    SystemRandom::new().fill(&mut bytes).map_err(|_| {
        tracing::error!(target: "redis_lock.token", "Failed to generate random bytes");
        LockError::TokenGeneration
    })?;

    let mut token = String::with_capacity(prefix.len() + TOKEN_LEN);
    token.push_str(prefix);
    URL_SAFE.encode_string(bytes, &mut token);
    Ok(token)
}
