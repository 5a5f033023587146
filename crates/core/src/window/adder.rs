use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tollgate_common::time::{Clock, SystemClock};
use tollgate_common::CommonError;
use tracing::debug;

use super::{StripedAdder, WindowError};

/// Time-windowed running sum.
///
/// The `range_ms` window is cut into `slices` equal sub-windows. The live
/// sub-window is a [`StripedAdder`]; the other `slices - 1` are frozen sums
/// kept in a ring. Once a sub-window's worth of time has elapsed the next
/// `add` or `sum` rotates: the live value is frozen into the ring, and any
/// sub-windows that passed without activity are zeroed.
///
/// Rotations stay aligned to sub-window boundaries counted from creation
/// (or the last [`reset`](Self::reset)), however irregularly the adder is
/// read. `sum()` therefore reflects additions made during the last
/// `range_ms` milliseconds, give or take one sub-window.
pub struct WindowedAdder<C: Clock = SystemClock> {
    /// Width of one sub-window in milliseconds.
    window_ms: u64,
    /// Frozen sums of past sub-windows.
    slots: Box<[AtomicI64]>,
    /// Live sub-window.
    writer: StripedAdder,
    /// Completed rotations.
    generation: AtomicU64,
    /// Rotation claimed by a caller; runs one ahead of `generation` while a
    /// rotation is in flight.
    expired_generation: AtomicU64,
    /// Ring slot the next rotation freezes into.
    index: AtomicUsize,
    /// Clock reading at the last rotation.
    old: AtomicU64,
    clock: Arc<C>,
}

impl WindowedAdder<SystemClock> {
    /// Create an adder on the process clock.
    pub fn new(range_ms: u64, slices: usize) -> Result<Self, WindowError> {
        Self::with_clock(range_ms, slices, SystemClock)
    }
}

impl<C: Clock> WindowedAdder<C> {
    /// Create an adder reading time from `clock`.
    ///
    /// # Errors
    ///
    /// `range_ms` must be positive, `slices` greater than one, and the range
    /// wide enough to give each slice at least one millisecond.
    pub fn with_clock(range_ms: u64, slices: usize, clock: C) -> Result<Self, WindowError> {
        if range_ms == 0 {
            return Err(CommonError::validation_with_value(
                "range_ms",
                "must be positive",
                range_ms,
            )
            .into());
        }
        if slices <= 1 {
            return Err(
                CommonError::validation_with_value("slices", "must be greater than 1", slices)
                    .into(),
            );
        }
        let window_ms = range_ms / slices as u64;
        if window_ms == 0 {
            return Err(WindowError::SliceTooNarrow { range_ms, slices });
        }

        let clock = Arc::new(clock);
        let now = clock.now_millis();
        let slots = (0..slices - 1).map(|_| AtomicI64::new(0)).collect();

        Ok(Self {
            window_ms,
            slots,
            writer: StripedAdder::new(),
            generation: AtomicU64::new(0),
            expired_generation: AtomicU64::new(0),
            index: AtomicUsize::new(0),
            old: AtomicU64::new(now),
            clock,
        })
    }

    /// Width of one sub-window in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Total number of slices, live one included.
    pub fn slices(&self) -> usize {
        self.slots.len() + 1
    }

    /// Increment by one.
    pub fn incr(&self) {
        self.add(1);
    }

    /// Add `x`, which may be negative.
    pub fn add(&self, x: i64) {
        self.expire_if_due();
        self.writer.add(x);
    }

    /// Sum over the window.
    pub fn sum(&self) -> i64 {
        self.expire_if_due();
        self.slots
            .iter()
            .map(|slot| slot.load(Ordering::Acquire))
            .fold(self.writer.sum(), i64::wrapping_add)
    }

    /// Zero every slice and restart the window at the current time.
    ///
    /// Not meant to race with writers.
    pub fn reset(&self) {
        for slot in self.slots.iter() {
            slot.store(0, Ordering::Release);
        }
        self.writer.reset();
        self.old.store(self.clock.now_millis(), Ordering::Release);
    }

    fn elapsed(&self, now: u64) -> u64 {
        now.saturating_sub(self.old.load(Ordering::Acquire))
    }

    #[inline]
    fn expire_if_due(&self) {
        if self.elapsed(self.clock.now_millis()) >= self.window_ms {
            self.expire();
        }
    }

    fn expire(&self) {
        let current = self.generation.load(Ordering::Acquire);
        if self
            .expired_generation
            .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            // Another caller owns this rotation.
            return;
        }

        let now = self.clock.now_millis();
        let old = self.old.load(Ordering::Acquire);
        let elapsed = now.saturating_sub(old);
        // A rotation that finished between our elapsed check and the claim
        // already covered this boundary. Release the claim unused.
        if elapsed < self.window_ms {
            self.expired_generation.store(current, Ordering::Release);
            return;
        }

        let len = self.slots.len();
        let mut index = self.index.load(Ordering::Acquire);

        // Whatever accumulated since the last rotation is credited to the
        // slice that just closed.
        self.slots[index].store(self.writer.sum_then_reset(), Ordering::Release);
        index = (index + 1) % len;

        let windows = elapsed / self.window_ms;
        let skipped = (windows - 1).min(len as u64) as usize;
        if skipped > 0 {
            let tail = skipped.min(len - index);
            for slot in &self.slots[index..index + tail] {
                slot.store(0, Ordering::Release);
            }
            for slot in &self.slots[..skipped - tail] {
                slot.store(0, Ordering::Release);
            }
            index = (index + skipped) % len;
        }

        debug!(elapsed_ms = elapsed, skipped, index, "windowed adder rotated");

        self.index.store(index, Ordering::Release);
        // Stay on slice boundaries so partial windows are not dropped.
        self.old.store(old + windows * self.window_ms, Ordering::Release);
        self.generation.store(current + 1, Ordering::Release);
    }
}

impl<C: Clock> fmt::Debug for WindowedAdder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowedAdder")
            .field("window_ms", &self.window_ms)
            .field("slices", &self.slices())
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use tollgate_common::testing::FrozenClock;

    use super::*;

    fn new_adder(clock: &FrozenClock) -> WindowedAdder<FrozenClock> {
        WindowedAdder::with_clock(3_000, 3, clock.clone()).unwrap()
    }

    /// Validates `WindowedAdder::sum` behavior for the sums while time stands
    /// still scenario.
    ///
    /// Assertions:
    /// - Confirms each slice keeps its own total until it ages out.
    /// - Confirms a long idle period drains the sum to zero.
    #[test]
    fn test_sums_things_up_when_time_stands_still() {
        let clock = FrozenClock::at(0);
        let adder = new_adder(&clock);

        adder.incr();
        assert_eq!(adder.sum(), 1);

        clock.advance_secs(1);
        adder.add(2);
        assert_eq!(adder.sum(), 3);

        clock.advance_secs(1);
        adder.incr();
        assert_eq!(adder.sum(), 4);

        clock.advance_secs(2);
        assert_eq!(adder.sum(), 1);

        clock.advance_secs(100);
        assert_eq!(adder.sum(), 0);

        adder.add(100);
        clock.advance_secs(1);
        assert_eq!(adder.sum(), 100);

        adder.add(100);
        clock.advance_secs(1);
        adder.add(100);
        assert_eq!(adder.sum(), 300);

        clock.advance_secs(100);
        assert_eq!(adder.sum(), 0);
    }

    /// Validates `WindowedAdder::add` behavior for the negative sums scenario.
    ///
    /// Assertions:
    /// - Confirms negative slice totals are kept and aged out like positive
    ///   ones.
    #[test]
    fn test_maintains_negative_sums() {
        let clock = FrozenClock::at(0);
        let adder = new_adder(&clock);

        // net: 2
        adder.add(-2);
        assert_eq!(adder.sum(), -2);
        adder.add(4);
        assert_eq!(adder.sum(), 2);

        // net: -4
        clock.advance_secs(1);
        adder.add(-2);
        assert_eq!(adder.sum(), 0);
        adder.add(-2);
        assert_eq!(adder.sum(), -2);

        // net: -2
        clock.advance_secs(1);
        adder.add(-2);
        assert_eq!(adder.sum(), -4);

        clock.advance_secs(1);
        assert_eq!(adder.sum(), -6);

        clock.advance_secs(1);
        assert_eq!(adder.sum(), -2);

        clock.advance_secs(1);
        assert_eq!(adder.sum(), 0);

        clock.advance_secs(100);
        assert_eq!(adder.sum(), 0);
    }

    /// Validates `WindowedAdder::sum` behavior for the partial window scenario.
    ///
    /// Assertions:
    /// - Confirms additions within one sub-window do not trigger rotation.
    #[test]
    fn test_no_rotation_inside_sub_window() {
        let clock = FrozenClock::at(0);
        let adder = new_adder(&clock);

        adder.add(7);
        clock.advance_millis(999);
        adder.add(3);
        assert_eq!(adder.sum(), 10);
        assert_eq!(adder.generation.load(Ordering::Relaxed), 0);
    }

    /// Validates `WindowedAdder::sum` behavior for the full range expiry
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the sum is zero once the clock moves `range_ms` past the
    ///   last addition.
    #[test]
    fn test_sum_is_zero_after_full_range() {
        let clock = FrozenClock::at(0);
        let adder = WindowedAdder::with_clock(10_000, 10, clock.clone()).unwrap();

        for _ in 0..25 {
            adder.incr();
            clock.advance_millis(250);
        }
        assert!(adder.sum() > 0);

        clock.advance_millis(10_000);
        assert_eq!(adder.sum(), 0);
    }

    /// Validates `WindowedAdder::sum` behavior for the irregular reader
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms reads every two sub-windows still expire an addition within
    ///   one sub-window of `range_ms`.
    #[test]
    fn test_sparse_reads_do_not_slow_decay() {
        let clock = FrozenClock::at(0);
        let adder = WindowedAdder::with_clock(10_000, 10, clock.clone()).unwrap();
        adder.incr();

        for _ in 0..7 {
            clock.advance_millis(1_999);
            let now = clock.now_millis();
            let expected = if now < 10_000 { 1 } else { 0 };
            assert_eq!(adder.sum(), expected, "sum at {now} ms");
        }
    }

    /// Validates `WindowedAdder::add` behavior for the concurrent boundary
    /// crossing scenario.
    ///
    /// Assertions:
    /// - Confirms exactly one rotation runs when many callers cross the same
    ///   boundary together.
    /// - Confirms no addition is lost to the rotation.
    #[test]
    fn test_single_rotation_per_boundary() {
        const CALLERS: usize = 16;

        for _ in 0..50 {
            let clock = FrozenClock::at(0);
            let adder = new_adder(&clock);
            clock.advance_millis(adder.window_ms());
            let barrier = Barrier::new(CALLERS);

            thread::scope(|scope| {
                for _ in 0..CALLERS {
                    scope.spawn(|| {
                        barrier.wait();
                        adder.add(1);
                        adder.sum();
                    });
                }
            });

            assert_eq!(adder.generation.load(Ordering::Acquire), 1);
            assert_eq!(adder.sum(), CALLERS as i64);
        }
    }

    /// Validates `WindowedAdder::reset` behavior for the reset scenario.
    #[test]
    fn test_reset_clears_everything() {
        let clock = FrozenClock::at(0);
        let adder = new_adder(&clock);

        adder.add(5);
        clock.advance_secs(1);
        adder.add(5);
        assert_eq!(adder.sum(), 10);

        adder.reset();
        assert_eq!(adder.sum(), 0);
    }

    /// Validates `WindowedAdder::with_clock` behavior for the invalid
    /// arguments scenario.
    ///
    /// Assertions:
    /// - Ensures zero range, a single slice, and sub-millisecond slices are
    ///   rejected.
    #[test]
    fn test_invalid_construction() {
        let clock = FrozenClock::at(0);
        assert!(matches!(
            WindowedAdder::with_clock(0, 3, clock.clone()),
            Err(WindowError::Common(CommonError::Validation { .. }))
        ));
        assert!(matches!(
            WindowedAdder::with_clock(1_000, 1, clock.clone()),
            Err(WindowError::Common(CommonError::Validation { .. }))
        ));
        assert!(matches!(
            WindowedAdder::with_clock(5, 10, clock),
            Err(WindowError::SliceTooNarrow { range_ms: 5, slices: 10 })
        ));
    }

    /// Validates `WindowedAdder::window_ms` behavior for the slice geometry
    /// scenario.
    #[test]
    fn test_slice_geometry() {
        let adder = WindowedAdder::new(10_000, 10).unwrap();
        assert_eq!(adder.window_ms(), 1_000);
        assert_eq!(adder.slices(), 10);
    }
}
