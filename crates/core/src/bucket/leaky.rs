use std::fmt;

use tollgate_common::time::{Clock, SystemClock};
use tollgate_common::CommonError;
use tracing::debug;

use super::{signed_amount, TokenBucket, TokenBucketError};
use crate::window::WindowedAdder;

/// Sub-windows used to age tokens out.
const LEAKY_SLICES: usize = 10;

/// Token bucket whose tokens expire after roughly `ttl_ms`.
///
/// A bucket left alone empties itself down to `reserve`, which is always
/// available on top of whatever was put in during the last TTL. Withdrawals
/// are recorded as negative additions, so a drained reserve recovers once
/// those withdrawals age out.
pub struct LeakyTokenBucket<C: Clock = SystemClock> {
    ttl_ms: u64,
    reserve: i64,
    window: WindowedAdder<C>,
}

impl LeakyTokenBucket<SystemClock> {
    /// Create a bucket on the process clock.
    pub fn new(ttl_ms: u64, reserve: u64) -> Result<Self, TokenBucketError> {
        Self::with_clock(ttl_ms, reserve, SystemClock)
    }
}

impl<C: Clock> LeakyTokenBucket<C> {
    /// Create a bucket reading time from `clock`.
    ///
    /// # Errors
    ///
    /// `ttl_ms` must be at least 10 ms so each of the ten sub-windows is
    /// non-empty; `reserve` must fit in an `i64`.
    pub fn with_clock(ttl_ms: u64, reserve: u64, clock: C) -> Result<Self, TokenBucketError> {
        let reserve = i64::try_from(reserve).map_err(|_| {
            CommonError::validation_with_value("reserve", "exceeds i64::MAX", reserve)
        })?;
        let window = WindowedAdder::with_clock(ttl_ms, LEAKY_SLICES, clock)?;
        Ok(Self { ttl_ms, reserve, window })
    }

    /// Approximate lifetime of a token in milliseconds.
    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    /// Tokens available regardless of recent activity.
    pub fn reserve(&self) -> i64 {
        self.reserve
    }
}

impl<C: Clock> TokenBucket for LeakyTokenBucket<C> {
    fn put(&self, n: u64) -> Result<(), TokenBucketError> {
        let n = signed_amount("put", n)?;
        self.window.add(n);
        Ok(())
    }

    /// Check and withdrawal are two steps, so concurrent callers can
    /// overdraw by at most one withdrawal each.
    fn try_get(&self, n: u64) -> Result<bool, TokenBucketError> {
        let n = signed_amount("try_get", n)?;
        let available = self.count();
        if available < n {
            debug!(requested = n, available, "leaky bucket refused withdrawal");
            return Ok(false);
        }
        self.window.add(-n);
        Ok(true)
    }

    fn count(&self) -> i64 {
        self.window.sum().saturating_add(self.reserve)
    }
}

impl<C: Clock> fmt::Debug for LeakyTokenBucket<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeakyTokenBucket")
            .field("ttl_ms", &self.ttl_ms)
            .field("reserve", &self.reserve)
            .field("window", &self.window)
            .finish()
    }
}
