//! Striped concurrent counter.
//!
//! Writers are spread across cache-padded cells so that high-frequency
//! `add` calls from different threads do not contend on one cache line.
//! Reads fold every cell.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

/// Upper bound on the number of cells.
const MAX_STRIPES: usize = 64;

/// Source of per-thread stripe hints, handed out round robin.
static NEXT_STRIPE: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static STRIPE_HINT: usize = NEXT_STRIPE.fetch_add(1, Ordering::Relaxed);
}

#[inline]
fn stripe_hint() -> usize {
    STRIPE_HINT.with(|hint| *hint)
}

/// Commutative signed accumulator safe for unsynchronized concurrent writers.
///
/// No update is ever lost: every `add` lands in exactly one cell, and
/// [`sum_then_reset`](Self::sum_then_reset) swaps each cell out atomically, so
/// a concurrent `add` is counted either in the returned sum or in the next one.
#[derive(Debug)]
pub struct StripedAdder {
    cells: Box<[CachePadded<AtomicI64>]>,
    mask: usize,
}

impl StripedAdder {
    /// One cell per available CPU, rounded up to a power of two.
    pub fn new() -> Self {
        let cpus = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self::with_stripes(cpus)
    }

    /// Explicit cell count, rounded up to a power of two in `1..=64`.
    pub fn with_stripes(stripes: usize) -> Self {
        let stripes = stripes.clamp(1, MAX_STRIPES).next_power_of_two();
        let cells = (0..stripes).map(|_| CachePadded::new(AtomicI64::new(0))).collect();
        Self { cells, mask: stripes - 1 }
    }

    /// Number of cells backing this adder.
    pub fn stripes(&self) -> usize {
        self.cells.len()
    }

    /// Add `x` (which may be negative) to the calling thread's cell.
    #[inline]
    pub fn add(&self, x: i64) {
        self.cells[stripe_hint() & self.mask].fetch_add(x, Ordering::AcqRel);
    }

    /// Current total across all cells.
    pub fn sum(&self) -> i64 {
        self.cells.iter().map(|cell| cell.load(Ordering::Acquire)).fold(0, i64::wrapping_add)
    }

    /// Return the total and zero every cell.
    pub fn sum_then_reset(&self) -> i64 {
        self.cells.iter().map(|cell| cell.swap(0, Ordering::AcqRel)).fold(0, i64::wrapping_add)
    }

    /// Zero every cell.
    pub fn reset(&self) {
        for cell in self.cells.iter() {
            cell.store(0, Ordering::Release);
        }
    }
}

impl Default for StripedAdder {
    fn default() -> Self {
        Self::new()
    }
}
