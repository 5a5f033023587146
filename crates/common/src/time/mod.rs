//! Millisecond clock abstraction.
//!
//! Every time-dependent type in tollgate takes a [`Clock`] at construction.
//! Only differences between two readings matter, so implementations may start
//! counting from any origin, but readings must never decrease.
//!
//! ```
//! use tollgate_common::time::{Clock, SystemClock};
//!
//! let clock = SystemClock;
//! let start = clock.now_millis();
//! assert!(clock.now_millis() >= start);
//! ```

use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::Lazy;

/// Trait for reading the current time in whole milliseconds
///
/// Implementations must be non-decreasing; a clock that moves backwards
/// leaves windowed sums stale until it catches up again.
pub trait Clock: Send + Sync + 'static {
    /// Milliseconds elapsed since this clock's origin
    fn now_millis(&self) -> u64;
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now_millis(&self) -> u64 {
        (**self).now_millis()
    }
}

static PROCESS_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Real monotonic clock
///
/// Reads `Instant::now()` relative to a process-wide origin captured on first
/// use, so readings are immune to wall-clock adjustments.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        u64::try_from(PROCESS_EPOCH.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}
