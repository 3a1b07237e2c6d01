//! Small concurrency primitives used throughout the allocator core (spec
//! §4.6): an adaptive spin lock and a reader/writer barrier, plus the
//! intrusive lock-free arena registry (§4.7).
//!
//! Grounded on the teacher's own atomic wrapper style
//! (`src/concurrency/atomic/bool.rs`'s `compare_exchange_cas`/
//! `test_and_set`) and its lock-free stack
//! (`src/concurrency/worklist/treiber_stack.rs`).

pub mod arena_list;
pub mod rw_barrier;
pub mod spinlock;

pub use arena_list::ArenaList;
pub use rw_barrier::RwBarrier;
pub use spinlock::SpinLock;
