//! Process-wide allocator counters. Not part of the core contract (spec
//! names benchmarking/debug tooling as a non-goal), but a handful of
//! `AtomicUsize` counters are ambient instrumentation in the same spirit as
//! the teacher's `AllocatorMetrics` (`src/alloc/system/stats/metrics.rs`),
//! not a benchmarking harness.

use core::sync::atomic::{AtomicUsize, Ordering};

/// Running totals of bytes/allocations handled by one [`crate::facade::ObjectAllocator`].
#[derive(Debug, Default)]
pub struct Metrics {
    allocated_bytes: AtomicUsize,
    allocated_count: AtomicUsize,
    deallocated_bytes: AtomicUsize,
    deallocated_count: AtomicUsize,
    chunks_created: AtomicUsize,
    chunks_destroyed: AtomicUsize,
}

impl Metrics {
    /// A zero-initialized counter set, usable in a `const` static.
    pub const fn new() -> Self {
        Self {
            allocated_bytes: AtomicUsize::new(0),
            allocated_count: AtomicUsize::new(0),
            deallocated_bytes: AtomicUsize::new(0),
            deallocated_count: AtomicUsize::new(0),
            chunks_created: AtomicUsize::new(0),
            chunks_destroyed: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn on_alloc(&self, size: usize) {
        self.allocated_count.fetch_add(1, Ordering::Relaxed);
        self.allocated_bytes.fetch_add(size, Ordering::Relaxed);
    }

    #[inline]
    pub fn on_dealloc(&self, size: usize) {
        self.deallocated_count.fetch_add(1, Ordering::Relaxed);
        self.deallocated_bytes.fetch_add(size, Ordering::Relaxed);
    }

    #[inline]
    pub fn on_chunk_created(&self) {
        self.chunks_created.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn on_chunk_destroyed(&self) {
        self.chunks_destroyed.fetch_add(1, Ordering::Relaxed);
    }

    /// `allocated bytes - deallocated bytes`, used by the stress test
    /// (spec §8 S6) to check for leaks.
    pub fn live_bytes(&self) -> isize {
        self.allocated_bytes.load(Ordering::Relaxed) as isize
            - self.deallocated_bytes.load(Ordering::Relaxed) as isize
    }

    pub fn live_count(&self) -> isize {
        self.allocated_count.load(Ordering::Relaxed) as isize
            - self.deallocated_count.load(Ordering::Relaxed) as isize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_balance() {
        let m = Metrics::new();
        m.on_alloc(16);
        m.on_alloc(16);
        m.on_dealloc(16);
        assert_eq!(m.live_count(), 1);
        assert_eq!(m.live_bytes(), 16);
    }
}
