//! The chunk: a contiguous slab of exactly [`CHUNK_BLOCKS`](crate::config::CHUNK_BLOCKS)
//! equally-sized blocks with an intrusive free list (spec §3, §4.1).
//!
//! Grounded on the original `smallobject::detail::chunk` (see
//! `examples/original_source/.../chunk.cpp`): the free-list encoding (block
//! `i`'s first byte holds `i+1`, `0..MAX_BLOCKS`) is carried over exactly so
//! that the allocator's observable behavior (first-fit-by-construction-order
//! reuse) matches the source.

use crate::config::CHUNK_BLOCKS;
use crate::error::AllocError;
use crate::page::{align_up, PageSource};
use core::ptr::NonNull;

/// Sentinel free-list index meaning "no successor" (end of list / block in
/// use). `CHUNK_BLOCKS` fits in a `u8` exactly because `CHUNK_BLOCKS == 255`.
pub const END_OF_LIST: u8 = 255;

/// A slab of `CHUNK_BLOCKS` blocks of `block_size` bytes, with a singly
/// linked free list threaded through the free blocks themselves. Block
/// overhead is zero: the link lives in the first byte of each free block.
///
/// Not `Send`/`Sync` on its own — an arena's mutex is the only thing that
/// may ever serialize concurrent access, per spec §4.1 ("allocate and
/// release are not individually thread-safe").
pub struct Chunk {
    begin: NonNull<u8>,
    end: NonNull<u8>,
    block_size: usize,
    /// Head-of-free-list index, `END_OF_LIST` when empty of free blocks.
    position: u8,
    /// Count of free blocks, `0..=CHUNK_BLOCKS` (`CHUNK_BLOCKS == 255` fits
    /// exactly in a `u8`, matching spec §3's "8-bit count of free blocks").
    free_count: u8,
}

// Safety: `Chunk` owns its backing memory exclusively; the arena's mutex is
// the sole point of mutation, so it is safe to move/share the handle itself
// across threads as long as callers uphold that discipline.
unsafe impl Send for Chunk {}

impl Chunk {
    /// Allocates a fresh chunk of `CHUNK_BLOCKS * block_size` bytes from
    /// `source` and initializes its free list.
    ///
    /// `block_size` must be in `[2 * size_of::<usize>(), 16 * size_of::<usize>()]`
    /// per spec §3, and at least `size_of::<u8>()` to hold the free-list
    /// link (trivially satisfied at word-sized classes).
    pub fn new_in<PS: PageSource>(block_size: usize, source: &PS) -> Result<Self, AllocError> {
        debug_assert!(block_size >= core::mem::size_of::<u8>());
        let region_size = CHUNK_BLOCKS * block_size;
        let page_size = align_up(region_size, crate::syscall::PAGE_SIZE);
        let begin = source.page_alloc(page_size)?;

        // SAFETY: `begin` is freshly allocated, `region_size` bytes are
        // exclusively ours, and every write stays within that region.
        unsafe {
            let mut p = begin.as_ptr();
            for i in 1u16..(CHUNK_BLOCKS as u16) {
                p.write(i as u8);
                p = p.add(block_size);
            }
            // Last block's link is left as whatever the page source handed
            // back (zeroed pages from mmap/VirtualAlloc); it is never read
            // because `position` never points past the last allocation
            // while the chunk still has free blocks beyond it, and once the
            // last block is allocated `free_count` reaches 0.
        }

        let end = unsafe { NonNull::new_unchecked(begin.as_ptr().add(region_size)) };

        Ok(Self {
            begin,
            end,
            block_size,
            position: 0,
            free_count: CHUNK_BLOCKS as u8,
        })
    }

    /// Releases the chunk's backing pages back to `source`. Must only be
    /// called once, and only while the chunk is not referenced elsewhere
    /// (callers remove it from the arena's range index first).
    ///
    /// # Safety
    /// `source` must be the same page source this chunk was created from.
    pub unsafe fn destroy<PS: PageSource>(self, source: &PS) {
        let region_size = CHUNK_BLOCKS * self.block_size;
        let page_size = align_up(region_size, crate::syscall::PAGE_SIZE);
        source.page_free(self.begin, page_size);
    }

    #[inline]
    pub fn begin(&self) -> *const u8 {
        self.begin.as_ptr()
    }

    #[inline]
    pub fn end(&self) -> *const u8 {
        self.end.as_ptr()
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    pub fn free_count(&self) -> usize {
        self.free_count as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.free_count as usize == CHUNK_BLOCKS
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.free_count == 0
    }

    /// Does `p` fall in this chunk's `[begin, end)` range?
    #[inline]
    pub fn contains(&self, p: *const u8) -> bool {
        p >= self.begin.as_ptr() && p < self.end.as_ptr()
    }

    /// Takes one block off the head of the free list. `None` if the chunk is
    /// full.
    pub fn allocate(&mut self) -> Option<NonNull<u8>> {
        if self.free_count == 0 {
            return None;
        }
        // SAFETY: position < CHUNK_BLOCKS because free_count > 0 implies the
        // free list is non-empty, and the invariant maintained by `release`
        // keeps `position` pointing at a valid in-range block whenever
        // free_count > 0.
        unsafe {
            let p = self.begin.as_ptr().add(self.position as usize * self.block_size);
            let next = p.read();
            self.position = next;
            self.free_count -= 1;
            Some(NonNull::new_unchecked(p))
        }
    }

    /// Returns `p` to the free list. `false` (no state change) if `p` is
    /// not in `[begin, end)` or is not block-aligned.
    pub fn release(&mut self, p: NonNull<u8>) -> bool {
        let addr = p.as_ptr();
        if !self.contains(addr) {
            return false;
        }
        let offset = unsafe { addr.offset_from(self.begin.as_ptr()) } as usize;
        if offset % self.block_size != 0 {
            return false;
        }
        let index = (offset / self.block_size) as u8;

        #[cfg(feature = "debug_checks")]
        {
            // A cheap double-free guard: walk the current free list and
            // check `index` isn't already on it. O(free_count), only paid
            // under the `debug_checks` feature.
            let mut cur = self.position;
            while cur != END_OF_LIST {
                assert_ne!(cur, index, "segfit: double free detected");
                cur = unsafe { self.begin.as_ptr().add(cur as usize * self.block_size).read() };
            }
        }

        unsafe {
            addr.write(self.position);
        }
        self.position = index;
        self.free_count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::SystemPageSource;

    #[test]
    fn fill_chunk_then_drain() {
        let src = SystemPageSource;
        let mut chunk = Chunk::new_in(16, &src).unwrap();
        assert!(chunk.is_empty());

        let mut ptrs = Vec::new();
        for _ in 0..CHUNK_BLOCKS {
            ptrs.push(chunk.allocate().unwrap());
        }
        assert!(chunk.is_full());
        assert!(chunk.allocate().is_none());

        // All pointers unique.
        let mut addrs: Vec<_> = ptrs.iter().map(|p| p.as_ptr() as usize).collect();
        addrs.sort_unstable();
        addrs.dedup();
        assert_eq!(addrs.len(), CHUNK_BLOCKS);

        for p in ptrs.into_iter().rev() {
            assert!(chunk.release(p));
        }
        assert!(chunk.is_empty());

        unsafe { chunk.destroy(&src) };
    }

    #[test]
    fn release_rejects_out_of_range() {
        let src = SystemPageSource;
        let mut chunk = Chunk::new_in(16, &src).unwrap();
        let bogus = unsafe { NonNull::new_unchecked(chunk.end.as_ptr()) };
        assert!(!chunk.release(bogus));
        assert_eq!(chunk.free_count(), CHUNK_BLOCKS);
        unsafe { chunk.destroy(&src) };
    }

    #[test]
    fn lifo_reuse_same_address() {
        let src = SystemPageSource;
        let mut chunk = Chunk::new_in(32, &src).unwrap();
        let p1 = chunk.allocate().unwrap();
        let _p2 = chunk.allocate().unwrap();
        chunk.release(p1);
        let p3 = chunk.allocate().unwrap();
        assert_eq!(p1, p3);
        unsafe { chunk.destroy(&src) };
    }
}
