//! The pool: the thread-affinity dispatcher for one size class (spec §4.4).
//! Grounded on the teacher's `thread_cache.rs` (`thread_local! { static
//! CACHES: ... }`) for the per-thread-slot shape, generalized from a fixed
//! compile-time set of size classes to one slot per (pool, thread) pair
//! keyed by the pool's own address, since the number of pools here is a
//! runtime `Config`, not a fixed set of `thread_local!` statics.

use crate::arena::Arena;
use crate::error::AllocError;
use crate::metrics::Metrics;
use crate::page::PageSource;
use crate::sync::ArenaList;
use core::cell::RefCell;
use core::ptr::NonNull;
use std::collections::HashMap;
use std::sync::Arc;

/// A thread's claim on one arena for one pool: the arena's address (type-
/// erased, the same `as usize` round trip the teacher's lock-free stack
/// uses for next-pointers) plus the thread-exit hook from spec §4.4: "the
/// slot's destructor runs `arena.shrink()` then `arena.release()`".
struct ThreadArenaSlot {
    addr: usize,
    teardown: Option<Box<dyn FnOnce(usize)>>,
}

impl Drop for ThreadArenaSlot {
    fn drop(&mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown(self.addr);
        }
    }
}

thread_local! {
    /// Keyed by a pool's own address (stable for the pool's lifetime, which
    /// is the whole process) rather than by size class, so one thread_local
    /// serves every [`Pool<PS>`] regardless of how many a `Config` asks for.
    static THREAD_ARENAS: RefCell<HashMap<usize, ThreadArenaSlot>> = RefCell::new(HashMap::new());
}

/// All arenas ever created for one size class, plus thread->arena
/// assignment (spec §3 "Pool").
pub struct Pool<PS: PageSource + Clone + 'static = crate::page::SystemPageSource> {
    block_size: usize,
    max_empty_chunks: usize,
    page_source: PS,
    metrics: Arc<Metrics>,
    registry: ArenaList<Arena<PS>>,
}

impl<PS: PageSource + Clone + 'static> Pool<PS> {
    pub fn new(block_size: usize, page_source: PS, max_empty_chunks: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            block_size,
            max_empty_chunks,
            page_source,
            metrics,
            registry: ArenaList::new(),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of arenas ever created for this pool, live or released.
    pub fn registry_len(&self) -> usize {
        self.registry.iter().count()
    }

    #[inline]
    fn identity(&self) -> usize {
        self as *const Self as usize
    }

    /// Serves one block from the calling thread's arena, reserving one first
    /// if the thread has none yet.
    pub fn malloc(&self) -> Result<NonNull<u8>, AllocError> {
        self.thread_arena().malloc()
    }

    /// Returns `p` to its owning arena: first the calling thread's own, then
    /// (on miss) every sibling arena in the registry, since the block may
    /// have been allocated by another thread (spec §4.4, scenario S2).
    pub fn free(&self, p: NonNull<u8>) -> bool {
        if let Some(arena) = self.current_thread_arena() {
            if arena.free(p) {
                return true;
            }
        }
        self.registry.iter().any(|arena| arena.free(p))
    }

    fn current_thread_arena(&self) -> Option<&Arena<PS>> {
        let key = self.identity();
        let addr = THREAD_ARENAS.with(|map| map.borrow().get(&key).map(|slot| slot.addr))?;
        Some(unsafe { &*(addr as *const Arena<PS>) })
    }

    fn thread_arena(&self) -> &Arena<PS> {
        if let Some(arena) = self.current_thread_arena() {
            return arena;
        }

        // Try to reuse a released sibling arena before growing the registry
        // (spec §8 scenario S3: thread exit reclaims arena for a new owner).
        for arena in self.registry.iter() {
            if arena.reserve() {
                #[cfg(feature = "tracing")]
                tracing::trace!(block_size = self.block_size, "segfit: pool: reserved released sibling arena");
                self.install_thread_slot(arena);
                return arena;
            }
        }

        let arena: &'static Arena<PS> = Box::leak(Box::new(Arena::new(
            self.block_size,
            self.page_source.clone(),
            self.max_empty_chunks,
            Arc::clone(&self.metrics),
        )));
        let reserved = arena.reserve();
        debug_assert!(reserved, "segfit: pool: freshly created arena must reserve cleanly");
        self.registry.push_front(arena as *const Arena<PS> as *mut Arena<PS>);
        self.install_thread_slot(arena);
        #[cfg(feature = "tracing")]
        tracing::trace!(block_size = self.block_size, "segfit: pool: registered new arena");
        arena
    }

    fn install_thread_slot(&self, arena: &'static Arena<PS>) {
        let key = self.identity();
        let addr = arena as *const Arena<PS> as usize;
        THREAD_ARENAS.with(|map| {
            map.borrow_mut().insert(
                key,
                ThreadArenaSlot {
                    addr,
                    teardown: Some(Box::new(|addr: usize| {
                        let arena = unsafe { &*(addr as *const Arena<PS>) };
                        arena.shrink();
                        arena.release();
                    })),
                },
            );
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CHUNK_BLOCKS;
    use crate::page::SystemPageSource;
    use std::thread;

    fn new_pool(block_size: usize) -> Pool<SystemPageSource> {
        Pool::new(block_size, SystemPageSource, 2, Arc::new(Metrics::new()))
    }

    #[test]
    fn single_thread_round_trip() {
        let pool = new_pool(16);
        let p = pool.malloc().unwrap();
        assert!(pool.free(p));
    }

    #[test]
    fn cross_thread_free_finds_owning_arena() {
        let pool = Arc::new(new_pool(24));
        let p = pool.malloc().unwrap();
        let addr = p.as_ptr() as usize;
        let pool2 = Arc::clone(&pool);
        let handle = thread::spawn(move || {
            let ptr = NonNull::new(addr as *mut u8).unwrap();
            pool2.free(ptr)
        });
        assert!(handle.join().unwrap());
    }

    #[test]
    fn thread_exit_reclaims_arena_for_new_owner() {
        let pool = Arc::new(new_pool(16));
        let pool2 = Arc::clone(&pool);
        thread::spawn(move || {
            let _p = pool2.malloc().unwrap();
            // Exits without freeing; the slot's Drop shrinks+releases.
        })
        .join()
        .unwrap();

        // A fresh allocation from this thread should find a registry entry
        // to reserve instead of constructing a brand-new arena.
        let _p = pool.malloc().unwrap();
        assert_eq!(pool.registry_len(), 1);
    }

    #[test]
    fn full_chunk_spills_into_new_chunk() {
        let pool = new_pool(16);
        let mut ptrs = Vec::new();
        for _ in 0..(CHUNK_BLOCKS + 1) {
            ptrs.push(pool.malloc().unwrap());
        }
        for p in ptrs {
            assert!(pool.free(p));
        }
    }
}
