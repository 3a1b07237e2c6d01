//! Property tests for the structures spec §8 singles out for invariant
//! checking: the chunk free list (property 1), the range map's
//! disjointness/ordering (property 2), and the byte-pattern round-trip law
//! (§8 "Round-trip laws"). Grounded on the teacher's
//! `tests/bplus_tree_proptest.rs` shape: a reference model in `std`
//! collections, checked against the real structure after a random op
//! sequence.

use proptest::prelude::*;
use segfit::chunk::Chunk;
use segfit::page::SystemPageSource;
use segfit::range_map::{Range, RangeMap};
use segfit::{Config, ObjectAllocator, SystemPageSource};
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
enum ChunkOp {
    Allocate,
    Release(usize),
}

fn chunk_op_strategy() -> impl Strategy<Value = ChunkOp> {
    prop_oneof![
        3 => Just(ChunkOp::Allocate),
        2 => (0usize..300).prop_map(ChunkOp::Release),
    ]
}

proptest! {
    /// Every pointer `allocate` hands back is unique among currently-live
    /// blocks, and a `release` of a block not currently live is a no-op
    /// rejected by the bounds check (never double-frees the free list).
    #[test]
    fn chunk_never_double_serves_a_live_block(ops in proptest::collection::vec(chunk_op_strategy(), 1..400)) {
        let src = SystemPageSource;
        let mut chunk = Chunk::new_in(16, &src).unwrap();
        let mut live: Vec<usize> = Vec::new();
        let mut live_set: BTreeSet<usize> = BTreeSet::new();

        for op in ops {
            match op {
                ChunkOp::Allocate => {
                    if let Some(p) = chunk.allocate() {
                        let addr = p.as_ptr() as usize;
                        prop_assert!(live_set.insert(addr), "allocate returned a pointer already live");
                        live.push(addr);
                    }
                }
                ChunkOp::Release(idx) => {
                    if live.is_empty() {
                        continue;
                    }
                    let addr = live.swap_remove(idx % live.len());
                    live_set.remove(&addr);
                    let p = std::ptr::NonNull::new(addr as *mut u8).unwrap();
                    prop_assert!(chunk.release(p));
                }
            }
        }

        prop_assert_eq!(chunk.free_count(), 255 - live.len());
        unsafe { chunk.destroy(&src) };
    }
}

proptest! {
    /// A `RangeMap` built from disjoint, non-overlapping ranges answers
    /// `find` identically to a linear scan over the same ranges, regardless
    /// of insertion order or interleaved erasure.
    #[test]
    fn range_map_find_matches_linear_scan(
        widths in proptest::collection::vec(1usize..50, 1..60),
        erase_every in 1usize..5,
    ) {
        let mut map = RangeMap::new();
        let mut reference: Vec<(Range, usize)> = Vec::new();
        let mut next_min = 0usize;
        let mut keys = Vec::new();

        for (i, width) in widths.iter().enumerate() {
            let range = Range::new(next_min, next_min + width);
            next_min = range.max;
            let key = map.insert(range, i).unwrap();
            reference.push((range, i));
            keys.push(key);

            if i % erase_every == erase_every - 1 {
                let (range, value) = reference.remove(0);
                let removed_key = keys.remove(0);
                prop_assert_eq!(map.erase(removed_key), value);
                let _ = range;
            }
        }

        for probe in (0..next_min).step_by(7) {
            let expected = reference.iter().find(|(r, _)| r.min <= probe && probe < r.max).map(|(_, v)| *v);
            prop_assert_eq!(map.find(probe).copied(), expected);
        }
    }
}

proptest! {
    /// The round-trip law (spec §8): for any `n` in `[1, MAX_SIZE]` and any
    /// byte pattern `B` of length `n`, `allocate(n)` then writing `B` then
    /// reading back `n` bytes yields exactly `B`.
    #[test]
    fn allocate_write_read_round_trips_any_byte_pattern(
        pattern in proptest::collection::vec(any::<u8>(), 1..=(16 * core::mem::size_of::<usize>())),
    ) {
        let alloc = ObjectAllocator::with_page_source(Config::default(), SystemPageSource);
        let n = pattern.len();

        let p = alloc.allocate(n).unwrap();
        unsafe {
            core::ptr::copy_nonoverlapping(pattern.as_ptr(), p.as_ptr(), n);
        }
        let read_back = unsafe { core::slice::from_raw_parts(p.as_ptr(), n) }.to_vec();
        alloc.deallocate(p, n);

        prop_assert_eq!(read_back, pattern);
    }
}
