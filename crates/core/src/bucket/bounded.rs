use std::sync::atomic::{AtomicU64, Ordering};

use tollgate_common::CommonError;

use super::{signed_amount, TokenBucket, TokenBucketError};

/// Token bucket that never holds more than `limit` tokens.
///
/// Starts empty. Both operations are CAS loops on one counter, so the
/// check-and-subtract in [`try_get`](TokenBucket::try_get) is atomic.
#[derive(Debug)]
pub struct BoundedTokenBucket {
    limit: u64,
    counter: AtomicU64,
}

impl BoundedTokenBucket {
    /// Create an empty bucket capped at `limit` tokens.
    ///
    /// # Errors
    ///
    /// `limit` must be positive and fit in an `i64`.
    pub fn new(limit: u64) -> Result<Self, TokenBucketError> {
        if limit == 0 {
            return Err(CommonError::validation_with_value("limit", "must be positive", limit).into());
        }
        signed_amount("limit", limit)?;
        Ok(Self { limit, counter: AtomicU64::new(0) })
    }

    /// Upper bound on the token count.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    fn require_positive(operation: &'static str, n: u64) -> Result<(), TokenBucketError> {
        if n == 0 {
            return Err(TokenBucketError::InvalidAmount {
                operation,
                amount: n,
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

impl TokenBucket for BoundedTokenBucket {
    /// Saturates at `limit` instead of overflowing.
    fn put(&self, n: u64) -> Result<(), TokenBucketError> {
        Self::require_positive("put", n)?;
        let mut current = self.counter.load(Ordering::Acquire);
        loop {
            let next = current.saturating_add(n).min(self.limit);
            match self.counter.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    fn try_get(&self, n: u64) -> Result<bool, TokenBucketError> {
        Self::require_positive("try_get", n)?;
        let mut current = self.counter.load(Ordering::Acquire);
        loop {
            if current < n {
                return Ok(false);
            }
            match self.counter.compare_exchange_weak(
                current,
                current - n,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(true),
                Err(actual) => current = actual,
            }
        }
    }

    fn count(&self) -> i64 {
        // Never above `limit`, which was checked to fit at construction.
        self.counter.load(Ordering::Acquire) as i64
    }
}
