//! Deterministic clock for tests
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use tollgate_common::testing::FrozenClock;
//! use tollgate_common::time::Clock;
//!
//! let clock = FrozenClock::at(0);
//! clock.advance(Duration::from_secs(5));
//! assert_eq!(clock.now_millis(), 5_000);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::time::{Clock, SystemClock};

/// Clock that only moves when told to
///
/// Clones share the same reading, so a test can hand one clone to the code
/// under test and advance another.
#[derive(Debug, Clone)]
pub struct FrozenClock {
    millis: Arc<AtomicU64>,
}

impl FrozenClock {
    /// Frozen at the current reading of [`SystemClock`]
    pub fn new() -> Self {
        Self::from_parent(&SystemClock)
    }

    /// Frozen at the current reading of `parent`
    pub fn from_parent<C: Clock>(parent: &C) -> Self {
        Self::at(parent.now_millis())
    }

    /// Frozen at an explicit millisecond reading
    pub fn at(millis: u64) -> Self {
        Self { millis: Arc::new(AtomicU64::new(millis)) }
    }

    /// Move the clock forward by `duration`, truncated to whole milliseconds
    pub fn advance(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.advance_millis(millis);
    }

    /// Move the clock forward by whole seconds
    pub fn advance_secs(&self, secs: u64) {
        self.advance_millis(secs.saturating_mul(1000));
    }

    /// Move the clock forward by whole milliseconds
    pub fn advance_millis(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Default for FrozenClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FrozenClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}
