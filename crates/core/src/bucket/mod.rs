//! Token buckets.
//!
//! A token bucket controls the relative rates of two processes: one fills the
//! bucket, the other empties it.
//!
//! - [`BoundedTokenBucket`]: hard-capped counter that starts empty
//! - [`LeakyTokenBucket`]: tokens expire after roughly a TTL, on top of a
//!   constant reserve

mod bounded;
mod leaky;

use std::fmt::Debug;

pub use bounded::BoundedTokenBucket;
pub use leaky::LeakyTokenBucket;
use thiserror::Error;
use tollgate_common::{impl_error_classification, CommonError, ErrorClassification, ErrorSeverity};

use crate::window::WindowError;

/// Capability shared by the bucket implementations.
///
/// Implementations are safe to share between threads without extra locking.
pub trait TokenBucket: Send + Sync + Debug {
    /// Put `n` tokens into the bucket.
    ///
    /// # Errors
    ///
    /// [`TokenBucketError::InvalidAmount`] when `n` is outside the range the
    /// implementation accepts.
    fn put(&self, n: u64) -> Result<(), TokenBucketError>;

    /// Take `n` tokens out of the bucket if at least `n` are available.
    ///
    /// Returns `Ok(false)` and leaves the bucket untouched otherwise.
    ///
    /// # Errors
    ///
    /// [`TokenBucketError::InvalidAmount`] as for [`put`](Self::put).
    fn try_get(&self, n: u64) -> Result<bool, TokenBucketError>;

    /// Tokens currently available.
    fn count(&self) -> i64;
}

/// Errors raised by token buckets
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenBucketError {
    /// A token amount the bucket cannot accept.
    #[error("invalid token amount {amount} for {operation}: {reason}")]
    InvalidAmount { operation: &'static str, amount: u64, reason: &'static str },

    /// The backing window could not be built.
    #[error(transparent)]
    Window(#[from] WindowError),

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl_error_classification!(
    TokenBucketError,
    Common,
    Self::InvalidAmount { .. } => {
        retryable: false,
        severity: ErrorSeverity::Error,
        critical: false,
    },
    Self::Window(e) => {
        retryable: e.is_retryable(),
        severity: e.severity(),
        critical: e.is_critical(),
    },
);

/// Largest amount that fits the signed window arithmetic.
pub(crate) fn signed_amount(operation: &'static str, n: u64) -> Result<i64, TokenBucketError> {
    i64::try_from(n).map_err(|_| TokenBucketError::InvalidAmount {
        operation,
        amount: n,
        reason: "exceeds i64::MAX",
    })
}
