//! Lock error types.
//!
//! A busy lock is not an error for [`Lock::lock`](crate::Lock::lock); it is
//! reported as `Ok(false)`. The shortcut and the guarded-execution helper turn
//! the busy case into [`LockError::CannotGetLock`] so callers can match on it.

use thiserror::Error;

/// Errors returned by lock operations.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock is held by someone else and could not be acquired.
    #[error("cannot get lock")]
    CannotGetLock,

    /// Store operation failed (connection, protocol, script).
    #[error("Store error: {0}")]
    Store(String),

    /// The secure random source failed while generating a token.
    #[error("Token generation failed")]
    TokenGeneration,

    /// Acquisition was aborted through a cancellation token.
    #[error("Lock acquisition cancelled")]
    Cancelled,
}

impl LockError {
    /// True for the "lock is busy" sentinel.
    pub fn is_cannot_get_lock(&self) -> bool {
        matches!(self, LockError::CannotGetLock)
    }
}
