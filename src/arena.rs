//! The arena: a pool of chunks serving one size class on behalf of at most
//! one thread at a time (spec §4.3). Grounded on the teacher's
//! `SizeClassManager` (`src/alloc/segregated/manager.rs`): an atomic
//! "current active slab" fast path, falling back to a scan, falling back to
//! allocating a fresh slab and registering it — generalized here to a
//! cursor over a [`RangeMap`] (disjoint address ranges) instead of a plain
//! linked free-list of slabs, since the arena also has to answer "which
//! chunk owns this pointer" in O(log n).

use crate::chunk::Chunk;
use crate::error::AllocError;
use crate::metrics::Metrics;
use crate::page::PageSource;
use crate::range_map::{EntryKey, Range, RangeMap};
use crate::sync::arena_list::{ListLinks, ListNode};
use crate::sync::SpinLock;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

struct Inner<PS: PageSource> {
    chunks: RangeMap<Chunk>,
    alloc_cursor: Option<EntryKey>,
    free_cursor: Option<EntryKey>,
    page_source: PS,
}

/// One size class's worth of chunks, reservable by exactly one thread.
///
/// Arenas are never individually freed (spec §3: "never destroyed until its
/// owning pool is destroyed") — a pool leaks its arenas via `Box::leak` and
/// tracks them through [`crate::sync::ArenaList`], so `Arena` itself never
/// needs a `Drop` impl; its backing pages outlive the process.
pub struct Arena<PS: PageSource = crate::page::SystemPageSource> {
    block_size: usize,
    inner: SpinLock<Inner<PS>>,
    /// `true` iff some thread currently considers this arena its own.
    reserved_flag: AtomicBool,
    /// A hint only: the authoritative count is recomputed by `shrink` under
    /// the mutex (spec §9, open question 2).
    empty_chunks_count: AtomicUsize,
    max_empty_chunks: usize,
    metrics: Arc<Metrics>,
    links: ListLinks<Arena<PS>>,
}

impl<PS: PageSource> ListNode for Arena<PS> {
    fn links(&self) -> &ListLinks<Self> {
        &self.links
    }
}

impl<PS: PageSource> Arena<PS> {
    pub fn new(block_size: usize, page_source: PS, max_empty_chunks: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            block_size,
            inner: SpinLock::new(Inner {
                chunks: RangeMap::new(),
                alloc_cursor: None,
                free_cursor: None,
                page_source,
            }),
            reserved_flag: AtomicBool::new(false),
            empty_chunks_count: AtomicUsize::new(0),
            max_empty_chunks,
            metrics,
            links: ListLinks::new(),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Atomically claims this arena for the calling thread. Wait-free.
    pub fn reserve(&self) -> bool {
        self.reserved_flag
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Releases a prior `reserve`. Wait-free.
    pub fn release(&self) {
        self.reserved_flag.store(false, Ordering::Release);
    }

    pub fn is_reserved(&self) -> bool {
        self.reserved_flag.load(Ordering::Acquire)
    }

    /// Serves one block. Tries `alloc_cursor` first, then scans every
    /// chunk, then creates a fresh one from the page source.
    pub fn malloc(&self) -> Result<NonNull<u8>, AllocError> {
        let mut inner = self.inner.lock();

        if let Some(cursor) = inner.alloc_cursor {
            if let Some(chunk) = inner.chunks.get_mut(cursor) {
                if let Some(p) = chunk.allocate() {
                    return Ok(p);
                }
            }
        }

        let scanned = inner
            .chunks
            .iter_mut_keys()
            .find_map(|(key, chunk)| chunk.allocate().map(|p| (key, p)));
        if let Some((key, p)) = scanned {
            inner.alloc_cursor = Some(key);
            return Ok(p);
        }

        let mut chunk = Chunk::new_in(self.block_size, &inner.page_source)?;
        self.metrics.on_chunk_created();
        #[cfg(feature = "tracing")]
        tracing::trace!(block_size = self.block_size, "segfit: arena: created chunk");
        let p = chunk
            .allocate()
            .expect("segfit: arena: freshly constructed chunk reports no free blocks");
        let range = Range::new(chunk.begin() as usize, chunk.end() as usize);
        let key = inner
            .chunks
            .insert(range, chunk)
            .unwrap_or_else(|_| panic!("segfit: arena: fresh chunk's address range overlaps an existing chunk"));
        inner.alloc_cursor = Some(key);
        inner.free_cursor = Some(key);
        Ok(p)
    }

    /// Returns `p` to its owning chunk. `false` if `p` does not belong to
    /// any chunk of this arena.
    pub fn free(&self, p: NonNull<u8>) -> bool {
        let mut inner = self.inner.lock();

        if let Some(cursor) = inner.free_cursor {
            if let Some(chunk) = inner.chunks.get_mut(cursor) {
                if chunk.release(p) {
                    if chunk.is_empty() {
                        self.empty_chunks_count.fetch_add(1, Ordering::Relaxed);
                    }
                    drop(inner);
                    self.maybe_shrink();
                    return true;
                }
            }
        }

        let addr = p.as_ptr() as usize;
        let Some(key) = inner.chunks.find_key(addr) else {
            return false;
        };
        let chunk = inner.chunks.get_mut(key).expect("segfit: arena: find_key returned a stale key");
        if !chunk.release(p) {
            return false;
        }
        let became_empty = chunk.is_empty();
        inner.free_cursor = Some(key);
        if became_empty {
            self.empty_chunks_count.fetch_add(1, Ordering::Relaxed);
        }
        drop(inner);
        self.maybe_shrink();
        true
    }

    fn maybe_shrink(&self) {
        if self.empty_chunks_count.load(Ordering::Relaxed) > self.max_empty_chunks {
            #[cfg(feature = "tracing")]
            tracing::trace!(block_size = self.block_size, "segfit: arena: shrink threshold crossed");
            self.shrink();
        }
    }

    /// Returns surplus empty chunks' pages to the page source, keeping at
    /// most `max_empty_chunks` cached against near-future growth.
    pub fn shrink(&self) {
        let mut inner = self.inner.lock();
        let mut empty_keys: Vec<EntryKey> = inner
            .chunks
            .iter_mut_keys()
            .filter(|(_, c)| c.is_empty())
            .map(|(k, _)| k)
            .collect();

        if empty_keys.len() <= self.max_empty_chunks {
            self.empty_chunks_count.store(empty_keys.len(), Ordering::Relaxed);
            return;
        }

        let surplus = empty_keys.split_off(self.max_empty_chunks);
        for key in surplus {
            let chunk = inner.chunks.erase(key);
            if inner.alloc_cursor == Some(key) {
                inner.alloc_cursor = None;
            }
            if inner.free_cursor == Some(key) {
                inner.free_cursor = None;
            }
            // SAFETY: `chunk` was allocated from `inner.page_source` and is
            // no longer reachable through `inner.chunks`.
            unsafe { chunk.destroy(&inner.page_source) };
            self.metrics.on_chunk_destroyed();
            #[cfg(feature = "tracing")]
            tracing::trace!(block_size = self.block_size, "segfit: arena: destroyed empty chunk");
        }
        self.empty_chunks_count.store(self.max_empty_chunks, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CHUNK_BLOCKS;
    use crate::page::SystemPageSource;

    fn new_arena(block_size: usize) -> Arena<SystemPageSource> {
        Arena::new(block_size, SystemPageSource, 2, Arc::new(Metrics::new()))
    }

    #[test]
    fn fill_chunk_then_spill_into_second() {
        let arena = new_arena(16);
        let mut ptrs = Vec::new();
        for _ in 0..CHUNK_BLOCKS {
            ptrs.push(arena.malloc().unwrap());
        }
        // 256th allocation forces a second chunk (spec §8 boundary case).
        let extra = arena.malloc().unwrap();
        assert!(!ptrs.contains(&extra));

        for p in ptrs {
            assert!(arena.free(p));
        }
        assert!(arena.free(extra));
    }

    #[test]
    fn free_of_foreign_pointer_fails() {
        let arena = new_arena(16);
        let mut buf = [0u8; 16];
        let bogus = NonNull::new(buf.as_mut_ptr()).unwrap();
        assert!(!arena.free(bogus));
    }

    #[test]
    fn reserve_is_exclusive() {
        let arena = new_arena(16);
        assert!(arena.reserve());
        assert!(!arena.reserve());
        arena.release();
        assert!(arena.reserve());
    }

    #[test]
    fn shrink_caps_empty_chunks() {
        let arena = new_arena(16);
        // Create 5 chunks, fully drain each, forcing 5 empty chunks, then
        // verify a manual shrink caps the count (spec §8 scenario S5).
        let mut all = Vec::new();
        for _ in 0..5 {
            let mut batch = Vec::new();
            for _ in 0..CHUNK_BLOCKS {
                batch.push(arena.malloc().unwrap());
            }
            all.push(batch);
        }
        for batch in all {
            for p in batch {
                arena.free(p);
            }
        }
        arena.shrink();
        assert!(arena.empty_chunks_count.load(Ordering::Relaxed) <= 2);
    }
}
