//! The size-class dispatch table and process-wide singleton (spec §4.5),
//! plus the [`GlobalAlloc`]-compatible wrapper that is the idiomatic Rust
//! shape of the original `operator new`/`operator delete` override.
//!
//! The singleton protocol is grounded on the teacher's own
//! `HaloAllocator`/`MANAGERS` static (`src/alloc/system/core/mod.rs`): a
//! process-wide table of per-size-class managers, reached through a
//! reentrancy guard. On a guard miss the teacher still dispatches through
//! the same `MANAGERS.scN` manager the guarded path uses (it only skips its
//! thread-local cache fast path) — it never hands a reentrantly-triggered
//! allocation to a different allocator than the one a later, non-reentrant
//! `dealloc` will look for it in. `SegFit` mirrors that: both branches of
//! the guard call the same [`singleton`]. Unlike the teacher's hand rolled
//! acquire-load/mutex/release-store sequence, the singleton itself uses
//! `std::sync::OnceLock`, which gives the exact acquire/release pair spec
//! §4.5 describes without hand-written unsafe.

use crate::config::Config;
use crate::error::AllocError;
use crate::metrics::Metrics;
use crate::page::{PageSource, SystemPageSource};
use crate::pool::Pool;
use core::alloc::{GlobalAlloc, Layout};
use core::cell::Cell;
use core::ptr::NonNull;
use std::alloc::System;
use std::sync::{Arc, OnceLock};

/// A size-indexed dispatch table fronting one allocator instance. Requests
/// beyond `config.max_size` fall through to the system allocator.
pub struct ObjectAllocator<PS: PageSource + Clone = SystemPageSource> {
    config: Config,
    pools: Vec<Pool<PS>>,
    metrics: Arc<Metrics>,
}

impl<PS: PageSource + Clone> ObjectAllocator<PS> {
    pub fn with_page_source(config: Config, page_source: PS) -> Self {
        let metrics = Arc::new(Metrics::new());
        let pools = (0..config.pool_count())
            .map(|i| {
                Pool::new(
                    config.block_size_for_index(i),
                    page_source.clone(),
                    config.max_empty_chunks,
                    Arc::clone(&metrics),
                )
            })
            .collect();
        Self { config, pools, metrics }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Serves `size` bytes: from a pool for `size <= config.max_size`, from
    /// the system allocator otherwise (spec §6).
    pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
        debug_assert!(size > 0, "segfit: allocate: size must be nonzero");
        let p = match self.config.size_class_index(size) {
            Some(idx) => self.pools[idx].malloc()?,
            None => Self::system_allocate(size)?,
        };
        self.metrics.on_alloc(size);
        Ok(p)
    }

    /// Returns `p`, previously returned by `allocate(size)` with the same
    /// `size` (sized deallocation, spec §6).
    pub fn deallocate(&self, p: NonNull<u8>, size: usize) {
        match self.config.size_class_index(size) {
            Some(idx) => {
                self.pools[idx].free(p);
            }
            None => unsafe { Self::system_deallocate(p, size) },
        }
        self.metrics.on_dealloc(size);
    }

    fn system_allocate(size: usize) -> Result<NonNull<u8>, AllocError> {
        let layout = system_layout(size);
        let raw = unsafe { System.alloc(layout) };
        NonNull::new(raw).ok_or(AllocError)
    }

    unsafe fn system_deallocate(p: NonNull<u8>, size: usize) {
        System.dealloc(p.as_ptr(), system_layout(size));
    }
}

fn system_layout(size: usize) -> Layout {
    Layout::from_size_align(size, core::mem::size_of::<usize>())
        .expect("segfit: facade: size overflows a valid Layout")
}

static SINGLETON: OnceLock<ObjectAllocator<SystemPageSource>> = OnceLock::new();

fn singleton() -> &'static ObjectAllocator<SystemPageSource> {
    SINGLETON.get_or_init(|| ObjectAllocator::with_page_source(Config::default(), SystemPageSource))
}

thread_local! {
    static IN_ALLOCATOR: Cell<bool> = const { Cell::new(false) };
}

/// Guards against an allocation made by this crate's own internals (a
/// `Vec` growing inside a pool's registry, a `HashMap` entry in a
/// thread-local slot) recursing back into [`SegFit::alloc`] when `SegFit`
/// is installed as the process's `#[global_allocator]`.
struct ReentrancyGuard;

impl ReentrancyGuard {
    fn enter() -> Option<Self> {
        let already_in = IN_ALLOCATOR.with(|f| f.replace(true));
        if already_in {
            None
        } else {
            Some(Self)
        }
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        IN_ALLOCATOR.with(|f| f.set(false));
    }
}

/// Installable as `#[global_allocator]`. Dispatches through the process
/// singleton [`ObjectAllocator`], guarded against this allocator's own
/// internals (a `Vec`/`HashMap` growing inside [`crate::pool::Pool`] or
/// [`crate::range_map::RangeMap`]) recursing back in.
///
/// ```ignore
/// #[global_allocator]
/// static GLOBAL: segfit::SegFit = segfit::SegFit;
/// ```
pub struct SegFit;

unsafe impl GlobalAlloc for SegFit {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let size = layout.size().max(layout.align());
        // A guard miss still dispatches through the same singleton as the
        // non-reentrant path (the only thing there is to skip on re-entry
        // is the guard bookkeeping itself) — a block handed out here must
        // be freeable by a later non-reentrant `dealloc`.
        let _guard = ReentrancyGuard::enter();
        singleton()
            .allocate(size)
            .map(|p| p.as_ptr())
            .unwrap_or(core::ptr::null_mut())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let size = layout.size().max(layout.align());
        let _guard = ReentrancyGuard::enter();
        if let Some(p) = NonNull::new(ptr) {
            singleton().deallocate(p, size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_allocator() -> ObjectAllocator<SystemPageSource> {
        ObjectAllocator::with_page_source(Config::default(), SystemPageSource)
    }

    #[test]
    fn small_sizes_round_trip_through_pools() {
        let alloc = new_allocator();
        let p = alloc.allocate(24).unwrap();
        alloc.deallocate(p, 24);
    }

    #[test]
    fn oversized_requests_fall_through_to_system_allocator() {
        let alloc = new_allocator();
        let cfg = Config::default();
        let size = cfg.max_size + 1;
        let p = alloc.allocate(size).unwrap();
        unsafe {
            core::ptr::write_bytes(p.as_ptr(), 0x42, size);
        }
        alloc.deallocate(p, size);
    }

    #[test]
    fn size_class_boundaries_match_dispatch_table() {
        let alloc = new_allocator();
        let cfg = Config::default();

        let p_min = alloc.allocate(cfg.min_size).unwrap();
        let p_max = alloc.allocate(cfg.max_size).unwrap();
        alloc.deallocate(p_min, cfg.min_size);
        alloc.deallocate(p_max, cfg.max_size);
    }

    /// A guard miss must still serve/free through the same singleton the
    /// guarded path uses, not a different allocator — otherwise a block
    /// allocated while reentrant is unfreeable by a later, non-reentrant
    /// `dealloc`.
    #[test]
    fn guard_miss_round_trips_through_the_same_singleton() {
        let _outer = ReentrancyGuard::enter();
        let layout = Layout::from_size_align(24, core::mem::size_of::<usize>()).unwrap();
        let p = unsafe { SegFit.alloc(layout) };
        assert!(!p.is_null());
        drop(_outer);
        // Non-reentrant free must find the block the reentrant alloc handed
        // out, through the very same singleton.
        unsafe { SegFit.dealloc(p, layout) };
    }
}
